// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{Transaction, TransactionId};
use crate::HashMap;
use tracing::{trace, warn};

/// Identifies one entered scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScopeFrame {
    pub(crate) id: ScopeId,
    /// `None` for committed-read scopes.
    pub(crate) transaction: Option<TransactionId>,
    /// Whether this is the first scope entered for `transaction`.
    pub(crate) is_root: bool,
}

/// The scope stack and the unresolved transactions of a store.
#[derive(Debug, Default)]
pub(crate) struct TransactionContext {
    frames: Vec<ScopeFrame>,
    transactions: HashMap<TransactionId, Transaction>,
    next_scope: u64,
    next_transaction: u64,
}

impl TransactionContext {
    /// The transaction of the top scope.
    pub(crate) fn current(&self) -> Option<TransactionId> {
        self.frames.last().and_then(|frame| frame.transaction)
    }

    pub(crate) fn top(&self) -> Option<ScopeFrame> {
        self.frames.last().copied()
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn create(&mut self) -> TransactionId {
        self.next_transaction += 1;
        let id = TransactionId::new(self.next_transaction);
        self.transactions.insert(id, Transaction::new(id));
        id
    }

    pub(crate) fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TransactionId) -> Option<&mut Transaction> {
        self.transactions.get_mut(&id)
    }

    /// Forgets a transaction. Its scopes stay on the stack until they are exited.
    pub(crate) fn remove(&mut self, id: TransactionId) -> Option<Transaction> {
        self.transactions.remove(&id)
    }

    pub(crate) fn push(&mut self, transaction: Option<TransactionId>) -> ScopeFrame {
        self.next_scope += 1;
        let is_root = transaction.is_some()
            && !self
                .frames
                .iter()
                .any(|frame| frame.transaction == transaction);
        let frame = ScopeFrame {
            id: ScopeId(self.next_scope),
            transaction,
            is_root,
        };
        trace!(scope = frame.id.0, ?transaction, is_root, "entered scope");
        self.frames.push(frame);
        frame
    }

    /// Exits a scope, wherever it is on the stack.
    ///
    /// Returns `None` if the scope was exited already.
    pub(crate) fn pop(&mut self, scope: ScopeId) -> Option<ScopeFrame> {
        let at = self.frames.iter().rposition(|frame| frame.id == scope)?;
        if at + 1 != self.frames.len() {
            warn!(
                scope = scope.0,
                depth = self.frames.len(),
                "scope exited while not on top of the stack"
            );
        }
        let frame = self.frames.remove(at);
        trace!(scope = scope.0, transaction = ?frame.transaction, "exited scope");
        Some(frame)
    }
}
