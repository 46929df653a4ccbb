// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Resolution of transactions.
use super::{InstanceKind, Store};
use crate::{
    InstanceId,
    action::{ChangeEvent, Phase, RejectReason, Rejection},
    changes::{ChangeTarget, Changeset},
    error::Error,
    transaction::{Transaction, TransactionError, TransactionId, TransactionState},
};
use tracing::{debug, trace, warn};

impl Store {
    pub(crate) fn ledger(&self, transaction: TransactionId) -> Result<&Transaction, Error> {
        self.tx
            .get(transaction)
            .ok_or_else(|| TransactionError::Resolved(transaction).into())
    }

    pub(crate) fn ledger_mut(
        &mut self,
        transaction: TransactionId,
    ) -> Result<&mut Transaction, Error> {
        self.tx
            .get_mut(transaction)
            .ok_or_else(|| TransactionError::Resolved(transaction).into())
    }

    /// Runs will rounds until no changeset was touched since it was last notified.
    ///
    /// The transaction is made current while observers run, and left `Preparing`.
    pub(crate) fn run_will_phase(&mut self, transaction: TransactionId) -> Result<(), Error> {
        self.ledger_mut(transaction)?
            .set_state(TransactionState::Preparing);
        let frame = self.tx.push(Some(transaction));
        let result = self.will_rounds(transaction);
        self.tx.pop(frame.id);
        result
    }

    fn will_rounds(&mut self, transaction: TransactionId) -> Result<(), Error> {
        let mut notified = 0;
        let mut rounds = 0;
        loop {
            let ledger = self.ledger(transaction)?;
            let horizon = ledger.version();
            let pending: Vec<InstanceId> = ledger
                .changesets()
                .filter(|cs| cs.transaction_version() > notified)
                .map(Changeset::target)
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            if rounds == self.config().max_will_iterations {
                warn!(%transaction, rounds, "will phase does not settle");
                return Err(self.rejected(transaction, RejectReason::WillLoopLimit(rounds), None));
            }
            rounds += 1;
            trace!(%transaction, round = rounds, changesets = pending.len(), "will round");

            for target in pending {
                let mut event = ChangeEvent::new(Phase::Will, transaction, target);
                self.notify_will(&mut event);
                // an observer may have resolved the transaction itself
                self.ledger(transaction)?;
                if let Some(reason) = event.cancel_reason() {
                    debug!(%transaction, %target, reason, "commit canceled");
                    let reason = RejectReason::Canceled(reason.to_owned());
                    return Err(self.rejected(transaction, reason, Some(target)));
                }
            }
            notified = horizon;
        }
    }

    fn notify_will(&mut self, event: &mut ChangeEvent) {
        let mut observers = std::mem::take(&mut self.observers);
        for (_, observer) in &mut observers {
            observer.will_change(event, self);
            if event.is_canceled() {
                break;
            }
        }
        // keep the ones registered while notifying
        observers.append(&mut self.observers);
        self.observers = observers;
    }

    fn notify_resolved(&mut self, ledger: &Transaction, rejection: Option<&Rejection>) {
        if self.observers.is_empty() {
            return;
        }
        let mut observers = std::mem::take(&mut self.observers);
        for cs in ledger.changesets().filter(|cs| cs.transaction_version() > 0) {
            match rejection {
                None => {
                    let event = ChangeEvent::new(Phase::Did, ledger.id(), cs.target());
                    for (_, observer) in &mut observers {
                        observer.did_change(&event, cs, self);
                    }
                }
                Some(rejection) => {
                    let event = ChangeEvent::new(Phase::Rejected, ledger.id(), cs.target());
                    for (_, observer) in &mut observers {
                        observer.rejected_change(&event, cs, rejection);
                    }
                }
            }
        }
        observers.append(&mut self.observers);
        self.observers = observers;
    }

    /// Commits an unresolved transaction.
    pub(crate) fn commit(&mut self, transaction: TransactionId) -> Result<(), Error> {
        self.run_will_phase(transaction)?;

        if let Some(stale) = self.ledger(transaction)?.find_stale(&self.instances) {
            warn!(%transaction, instance = %stale, "rejecting stale transaction");
            return Err(self.rejected(transaction, RejectReason::Stale, Some(stale)));
        }

        let mut ledger = self
            .tx
            .remove(transaction)
            .ok_or(TransactionError::Resolved(transaction))?;
        let mut applied = 0;
        for cs in ledger.changesets().filter(|cs| cs.has_local_changes()) {
            let Some(instance) = self.instances.get_mut(cs.target().index()) else {
                continue;
            };
            match &mut instance.kind {
                InstanceKind::Complex { storage, .. } => cs.apply_to(ChangeTarget::Complex(storage)),
                InstanceKind::List { storage, .. } => cs.apply_to(ChangeTarget::List(storage)),
            }
            instance.version += 1;
            applied += 1;
        }
        for (id, projected) in ledger.projected_references() {
            let Some(instance) = self.instances.get_mut(id.index()) else {
                continue;
            };
            if instance.refs != projected.list {
                instance.refs = projected.list.clone();
                instance.refs_version += 1;
            }
        }
        ledger.set_state(TransactionState::Committed);
        debug!(
            %transaction,
            changesets = applied,
            version = ledger.version(),
            "committed transaction"
        );

        self.notify_resolved(&ledger, None);
        Ok(())
    }

    /// Rejects an unresolved transaction, cancelling all of its changes.
    ///
    /// Returns `None` if the transaction was resolved already.
    pub(crate) fn reject_transaction(
        &mut self,
        transaction: TransactionId,
        reason: RejectReason,
        changeset: Option<InstanceId>,
    ) -> Option<Rejection> {
        let mut ledger = self.tx.remove(transaction)?;
        ledger.cancel_all(&self.instances);
        ledger.set_state(TransactionState::Rejected);
        let rejection = Rejection {
            transaction,
            reason,
            changeset,
        };
        if ledger.is_empty() {
            trace!(%transaction, %rejection, "dropped empty transaction");
        } else {
            debug!(%transaction, %rejection, "rejected transaction");
        }

        self.notify_resolved(&ledger, Some(&rejection));
        Some(rejection)
    }

    fn rejected(
        &mut self,
        transaction: TransactionId,
        reason: RejectReason,
        changeset: Option<InstanceId>,
    ) -> Error {
        match self.reject_transaction(transaction, reason, changeset) {
            Some(rejection) => TransactionError::Rejected(rejection).into(),
            None => TransactionError::Resolved(transaction).into(),
        }
    }
}
