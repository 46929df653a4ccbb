// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{ScopeFrame, ScopeId, Transaction, TransactionError, TransactionId, TransactionState};
use crate::{
    Store,
    action::{RejectReason, Rejection},
    error::Error,
};
use std::ops::{Deref, DerefMut};
use tracing::debug;

/// A guard keeping a transaction current.
///
/// The guard dereferences to the [`Store`], so mutations and reads can be made through
/// it. Dropping the guard exits the scope. Dropping a root scope that was neither
/// accepted nor rejected rejects its transaction (see
/// [`StoreConfig::rollback_on_drop`](crate::StoreConfig::rollback_on_drop)).
#[must_use = "the transaction is rejected when its root scope is dropped"]
pub struct TransactionScope<'s> {
    store: &'s mut Store,
    frame: ScopeFrame,
    transaction: TransactionId,
}

impl<'s> TransactionScope<'s> {
    fn new(store: &'s mut Store, transaction: TransactionId) -> Self {
        let frame = store.tx.push(Some(transaction));
        Self {
            store,
            frame,
            transaction,
        }
    }

    pub fn id(&self) -> ScopeId {
        self.frame.id
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction
    }

    /// The transaction of this scope, unless it was resolved already.
    pub fn transaction(&self) -> Option<&Transaction> {
        self.store.tx.get(self.transaction)
    }

    /// Whether this is the first scope entered for its transaction.
    pub fn is_root(&self) -> bool {
        self.frame.is_root
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Fails with [`TransactionError::NotRootScope`] when called on a nested scope (the
    /// scope is exited, and the transaction stays open), with
    /// [`TransactionError::Resolved`] if the transaction was resolved already, and with
    /// [`TransactionError::Rejected`] if the commit was cancelled or found stale.
    pub fn accept(self) -> Result<(), Error> {
        if !self.frame.is_root {
            return Err(TransactionError::NotRootScope(self.transaction).into());
        }
        // the transaction is gone once this returns, so dropping the guard only exits
        self.store.commit(self.transaction)
    }

    /// Runs the will phase of the commit without committing.
    ///
    /// If an observer cancels, the transaction is rejected and the rejection returned as
    /// an error. Otherwise the transaction stays open and can be changed further.
    pub fn accept_will(&mut self) -> Result<(), Error> {
        if !self.frame.is_root {
            return Err(TransactionError::NotRootScope(self.transaction).into());
        }
        self.store.run_will_phase(self.transaction)?;
        self.store
            .ledger_mut(self.transaction)?
            .set_state(TransactionState::Open);
        Ok(())
    }

    /// Rejects the transaction from any of its scopes.
    ///
    /// Returns `None` if the transaction was resolved already.
    pub fn reject(self, reason: impl Into<String>) -> Option<Rejection> {
        self.store.reject_transaction(
            self.transaction,
            RejectReason::Requested(reason.into()),
            None,
        )
    }
}

impl Deref for TransactionScope<'_> {
    type Target = Store;

    fn deref(&self) -> &Store {
        self.store
    }
}

impl DerefMut for TransactionScope<'_> {
    fn deref_mut(&mut self) -> &mut Store {
        self.store
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        let Some(frame) = self.store.tx.pop(self.frame.id) else {
            // exited through `Store::exit_current`
            return;
        };
        if !frame.is_root || self.store.tx.get(self.transaction).is_none() {
            return;
        }
        if self.store.config().rollback_on_drop {
            self.store
                .reject_transaction(self.transaction, RejectReason::ScopeExited, None);
        } else {
            debug!(transaction = %self.transaction, "root scope exited, transaction stays open");
        }
    }
}

/// A guard hiding the current transaction, so reads see committed state.
///
/// Mutations made through it run in implicit transactions of their own.
#[must_use]
pub struct CommittedScope<'s> {
    store: &'s mut Store,
    frame: ScopeFrame,
}

impl CommittedScope<'_> {
    pub fn id(&self) -> ScopeId {
        self.frame.id
    }
}

impl Deref for CommittedScope<'_> {
    type Target = Store;

    fn deref(&self) -> &Store {
        self.store
    }
}

impl DerefMut for CommittedScope<'_> {
    fn deref_mut(&mut self) -> &mut Store {
        self.store
    }
}

impl Drop for CommittedScope<'_> {
    fn drop(&mut self) {
        self.store.tx.pop(self.frame.id);
    }
}

impl Store {
    /// Enters a scope of the current transaction, or of a new one if there is none.
    pub fn enter_change(&mut self) -> TransactionScope<'_> {
        let transaction = match self.tx.current() {
            Some(current) => current,
            None => self.tx.create(),
        };
        TransactionScope::new(self, transaction)
    }

    /// Starts a new transaction and enters its root scope.
    pub fn begin(&mut self) -> TransactionScope<'_> {
        let transaction = self.tx.create();
        debug!(%transaction, "began transaction");
        TransactionScope::new(self, transaction)
    }

    /// Creates a transaction without entering it.
    pub fn new_transaction(&mut self) -> TransactionId {
        self.tx.create()
    }

    /// Enters a scope of an unresolved transaction.
    ///
    /// The scope is the root of the transaction if no other scope of it is live.
    pub fn enter(&mut self, transaction: TransactionId) -> Result<TransactionScope<'_>, Error> {
        if self.tx.get(transaction).is_none() {
            return Err(TransactionError::Resolved(transaction).into());
        }
        Ok(TransactionScope::new(self, transaction))
    }

    /// Enters a scope in which no transaction is current.
    pub fn enter_committed(&mut self) -> CommittedScope<'_> {
        let frame = self.tx.push(None);
        CommittedScope { store: self, frame }
    }

    /// Exits every top scope of the current transaction, up to and including its root.
    ///
    /// If the root scope is exited this way the transaction is rejected. Returns the
    /// number of exited scopes. Guards of exited scopes do nothing when dropped.
    pub fn exit_current(&mut self) -> usize {
        let Some(transaction) = self.tx.current() else {
            return 0;
        };
        let mut exited = 0;
        while let Some(frame) = self.tx.top() {
            if frame.transaction != Some(transaction) {
                break;
            }
            self.tx.pop(frame.id);
            exited += 1;
            if frame.is_root {
                self.reject_transaction(transaction, RejectReason::ScopeExited, None);
                break;
            }
        }
        debug!(%transaction, exited, "exited current transaction");
        exited
    }
}

#[cfg(test)]
mod tests {
    use crate::{Store, transaction::TransactionState};

    #[test]
    fn enter_change_joins_current() {
        let mut store = Store::default();
        let mut outer = store.enter_change();
        let id = outer.transaction_id();
        assert!(outer.is_root());
        {
            let inner = outer.enter_change();
            assert_eq!(inner.transaction_id(), id);
            assert!(!inner.is_root());
        }
        {
            let other = outer.begin();
            assert_ne!(other.transaction_id(), id);
            assert!(other.is_root());
            assert_eq!(other.current_transaction(), Some(other.transaction_id()));
        }
        assert_eq!(outer.current_transaction(), Some(id));
        assert_eq!(outer.transaction().unwrap().state(), TransactionState::Open);
        drop(outer);
        assert_eq!(store.current_transaction(), None);
        assert!(store.transaction(id).is_none());
    }

    #[test]
    fn nested_scope_cannot_accept() {
        let mut store = Store::default();
        let mut outer = store.begin();
        let id = outer.transaction_id();
        let inner = outer.enter_change();
        assert!(inner.accept().is_err());
        // still open
        assert!(outer.transaction().is_some());
        assert_eq!(outer.current_transaction(), Some(id));
        outer.accept().unwrap();
    }

    #[test]
    fn exit_current_unwinds_to_root() {
        let mut store = Store::default();
        let below = store.new_transaction();
        let mut base = store.enter(below).unwrap();
        let mut root = base.begin();
        let id = root.transaction_id();
        let mut nested = root.enter_change();
        let mut innermost = nested.enter_change();
        assert_eq!(innermost.exit_current(), 3);
        assert_eq!(innermost.current_transaction(), Some(below));
        assert!(Store::transaction(&innermost, id).is_none());
        // nothing left of it
        assert_eq!(innermost.exit_current(), 1);
        assert_eq!(innermost.current_transaction(), None);
    }

    #[test]
    fn committed_scope_hides_transaction() {
        let mut store = Store::default();
        let mut scope = store.begin();
        {
            let committed = scope.enter_committed();
            assert_eq!(committed.current_transaction(), None);
        }
        assert!(scope.current_transaction().is_some());
    }
}
