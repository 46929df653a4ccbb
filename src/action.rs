// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Change notifications.
//!
//! Observers registered with [`Store::add_observer`] are told about the changesets of
//! every transaction, in three phases:
//!
//! - [`Phase::Will`]: the transaction is about to commit. The observer receives the
//!   store with the transaction current, so it can inspect the pending changeset, make
//!   further changes, or [`cancel`](ChangeEvent::cancel) the commit.
//! - [`Phase::Did`]: the changeset was committed.
//! - [`Phase::Rejected`]: the changeset was rejected, for the reason carried by the
//!   [`Rejection`].
//!
//! Only changesets with changes (of their own or nested) are notified.
use crate::{Changeset, InstanceId, Store, transaction::TransactionId};
use std::{cell::RefCell, fmt, rc::Rc};

/// When an observer is notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Will,
    Did,
    Rejected,
}

/// A notification about one changeset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    phase: Phase,
    transaction: TransactionId,
    source: InstanceId,
    cancel_reason: Option<String>,
}

impl ChangeEvent {
    pub(crate) fn new(phase: Phase, transaction: TransactionId, source: InstanceId) -> Self {
        Self {
            phase,
            transaction,
            source,
            cancel_reason: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    /// The target of the changeset the event is about.
    pub fn source(&self) -> InstanceId {
        self.source
    }

    /// Only will events can be cancelled.
    pub fn is_cancelable(&self) -> bool {
        self.phase == Phase::Will
    }

    /// Cancels the commit. The first reason given is kept.
    ///
    /// Returns whether the event was cancelled by this call.
    pub fn cancel(&mut self, reason: impl Into<String>) -> bool {
        if !self.is_cancelable() || self.cancel_reason.is_some() {
            return false;
        }
        self.cancel_reason = Some(reason.into());
        true
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel_reason.is_some()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }
}

/// Why a transaction was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// An observer cancelled the will event of a changeset.
    Canceled(String),
    /// Another transaction committed an instance this one changed.
    Stale,
    /// Observers kept making changes for more will rounds than allowed.
    WillLoopLimit(usize),
    /// The root scope was exited without accepting.
    ScopeExited,
    /// [`TransactionScope::reject`](crate::TransactionScope::reject) was called.
    Requested(String),
    /// A mutation of an implicit transaction failed.
    Failed(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Canceled(reason) => write!(f, "canceled: {reason}"),
            RejectReason::Stale => f.write_str("stale"),
            RejectReason::WillLoopLimit(rounds) => {
                write!(f, "changes kept coming after {rounds} will rounds")
            }
            RejectReason::ScopeExited => f.write_str("root scope exited"),
            RejectReason::Requested(reason) => write!(f, "rejected: {reason}"),
            RejectReason::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

/// The outcome of a rejected transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub transaction: TransactionId,
    pub reason: RejectReason,
    /// The target of the changeset that caused the rejection, if one did.
    pub changeset: Option<InstanceId>,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transaction {} was rejected ({})", self.transaction, self.reason)?;
        if let Some(changeset) = self.changeset {
            write!(f, " at {changeset}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Rejection {}

/// Identifies a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Listens to the changesets of a store's transactions.
///
/// All methods do nothing by default.
pub trait ChangeObserver {
    /// Called for every changeset with changes, before the transaction commits.
    ///
    /// The transaction is current in `store`. Changes made through `store` join it.
    fn will_change(&mut self, event: &mut ChangeEvent, store: &mut Store) {
        let _ = (event, store);
    }

    fn did_change(&mut self, event: &ChangeEvent, changeset: &Changeset, store: &Store) {
        let _ = (event, changeset, store);
    }

    fn rejected_change(&mut self, event: &ChangeEvent, changeset: &Changeset, rejection: &Rejection) {
        let _ = (event, changeset, rejection);
    }
}

/// One notification seen by a [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub phase: Phase,
    pub target: InstanceId,
    pub transaction_version: u64,
    pub local_changes: usize,
}

/// The notifications seen by a [`RecordingObserver`], shared with its creator.
pub type NotificationLog = Rc<RefCell<Vec<Notification>>>;

/// An observer that writes down every notification, and optionally cancels the commit
/// of one target.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    log: NotificationLog,
    cancel: Option<(InstanceId, String)>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every will event of `target`.
    pub fn canceling(mut self, target: InstanceId, reason: impl Into<String>) -> Self {
        self.cancel = Some((target, reason.into()));
        self
    }

    pub fn log(&self) -> NotificationLog {
        Rc::clone(&self.log)
    }

    fn record(&self, phase: Phase, changeset: &Changeset) {
        self.log.borrow_mut().push(Notification {
            phase,
            target: changeset.target(),
            transaction_version: changeset.transaction_version(),
            local_changes: changeset.changes().len(),
        });
    }
}

impl ChangeObserver for RecordingObserver {
    fn will_change(&mut self, event: &mut ChangeEvent, store: &mut Store) {
        if let Some(changeset) = store.changeset(event.source()) {
            self.record(Phase::Will, changeset);
        }
        if let Some((target, reason)) = &self.cancel {
            if *target == event.source() {
                event.cancel(reason.clone());
            }
        }
    }

    fn did_change(&mut self, _event: &ChangeEvent, changeset: &Changeset, _store: &Store) {
        self.record(Phase::Did, changeset);
    }

    fn rejected_change(
        &mut self,
        _event: &ChangeEvent,
        changeset: &Changeset,
        _rejection: &Rejection,
    ) {
        self.record(Phase::Rejected, changeset);
    }
}
