// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Transactions and the scopes that make them current.
//!
//! A [`Transaction`] collects the [`Changeset`](crate::Changeset)s of every instance
//! mutated while it is current. It owns a projection of the reference lists of the
//! values its changes add and remove, and a version counter bumped by every recorded
//! change.
//!
//! # Scopes
//!
//! The [`Store`](crate::Store) keeps a stack of scopes. The current transaction is the
//! transaction of the scope on top of the stack, or none when the stack is empty or
//! the top scope is a [`CommittedScope`]. Scopes are entered through guards:
//!
//! - [`Store::enter_change`](crate::Store::enter_change) joins the current transaction,
//!   or starts a new one if there is none.
//! - [`Store::begin`](crate::Store::begin) always starts a new transaction.
//! - [`Store::enter`](crate::Store::enter) makes a given transaction current again.
//! - [`Store::enter_committed`](crate::Store::enter_committed) hides the current
//!   transaction, so reads see committed state.
//!
//! The first scope entered for a transaction is its *root*. Only the root scope can
//! [`accept`](TransactionScope::accept) the transaction; any scope can
//! [`reject`](TransactionScope::reject) it. A root scope dropped without being accepted
//! rejects its transaction, unless [`StoreConfig::rollback_on_drop`] is disabled.
//!
//! ```rust
//! use std::sync::Arc;
//! use typetx::{Store, Value, types::{ComplexType, PropertyType, SimpleKind, ValueType}};
//!
//! let mut store = Store::default();
//! store.register_type(
//!     ComplexType::builder("counter")
//!         .property(PropertyType::new("count", ValueType::Simple(SimpleKind::Number)))
//!         .build()
//!         .unwrap(),
//! ).unwrap();
//! let counter = store.create("counter").unwrap();
//!
//! let mut outer = store.enter_change();
//! outer.set(counter, "count", Value::from(1)).unwrap();
//! {
//!     // Joins the transaction of `outer`.
//!     let mut inner = outer.enter_change();
//!     assert!(!inner.is_root());
//!     inner.set(counter, "count", Value::from(2)).unwrap();
//! }
//! outer.accept().unwrap();
//! assert_eq!(store.get(counter, "count").unwrap(), Some(Value::from(2)));
//! ```
//!
//! # Commit
//!
//! Accepting runs the *will* phase: every registered
//! [`ChangeObserver`](crate::action::ChangeObserver) is told about every changeset
//! with changes. Observers may cancel the commit, or make further changes, in which case
//! the changesets touched since are notified again. Then the transaction is validated
//! against the committed state: if an instance it changed was committed by another
//! transaction since it was first touched, the transaction is rejected as stale (first
//! committer wins). Finally every changeset is applied to its instance in the order the
//! instances were first touched, the projected reference lists become durable, and
//! observers are told about the committed changesets.
//!
//! # Reject
//!
//! Rejecting cancels every recorded change in reverse order of recording and tells
//! observers about the rejected changesets. Nothing of the transaction remains visible.
//!
//! [`StoreConfig::rollback_on_drop`]: crate::StoreConfig::rollback_on_drop
use crate::action::Rejection;
use std::fmt;

mod context;
mod ledger;
mod scope;

pub(crate) use context::{ScopeFrame, TransactionContext};
pub use context::ScopeId;
pub use ledger::Transaction;
pub use scope::{CommittedScope, TransactionScope};

/// Identifies a transaction of one [`Store`](crate::Store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// The life cycle of a [`Transaction`].
///
/// `Open → Preparing → Committed`, or `Open | Preparing → Rejected`. The last two are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Mutations are accepted.
    Open,
    /// The will phase of a commit is running. Observers may still make changes.
    Preparing,
    Committed,
    Rejected,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Rejected)
    }
}

/// Error returned by transaction control operations.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionError {
    /// Only the root scope of a transaction can accept it.
    NotRootScope(TransactionId),
    /// The transaction was committed or rejected already, and is read-only.
    Resolved(TransactionId),
    /// The transaction was rejected while committing.
    Rejected(Rejection),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::NotRootScope(id) => {
                write!(f, "only the root scope can accept transaction {id}")
            }
            TransactionError::Resolved(id) => {
                write!(f, "transaction {id} is resolved and read-only")
            }
            TransactionError::Rejected(rejection) => write!(f, "{rejection}"),
        }
    }
}

impl std::error::Error for TransactionError {}
