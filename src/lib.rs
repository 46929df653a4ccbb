// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # typetx: Transactional Instance Graphs
//!
//! This crate provides a typed object model whose instances are mutated through
//! **changesets** grouped into **transactions**. It is the core of a data-bound
//! visualization model: structured values (complex instances with named properties,
//! lists of elements) are edited by application code, observed by listeners which may
//! veto the edit, and either committed atomically or rejected without a trace.
//!
//! ## Core Concepts
//!
//! - [`Store`]: the arena owning every instance. Instances are addressed by an
//!   [`InstanceId`] handle, so graphs may share values and even form cycles without any
//!   strong-ownership problems.
//! - [`ComplexType`](types::ComplexType) and [`PropertyType`](types::PropertyType): the
//!   metadata describing what a complex instance holds. A property can be a
//!   *boundary*, meaning the values it holds are not reference tracked through it.
//! - [`PrimitiveChange`]: the smallest replayable edit: `Add`, `Remove`, `Move`,
//!   `Clear`, `Sort` on lists and `Set` on complex properties.
//! - [`Changeset`]: the ordered log of primitive changes pending against one instance.
//! - [`Transaction`]: the unit of atomic commit or reject spanning many changesets.
//! - [`ReferenceList`]: per-value registry of the `(container, property)` pairs that
//!   refer to it.
//!
//! ## Ambient Transactions
//!
//! The store keeps a stack of transaction scopes. The *current* transaction is the one
//! belonging to the scope on top of the stack. Every mutation joins the current
//! transaction; when there is none, an implicit transaction is created, committed and
//! dropped before the mutation returns.
//!
//! Scopes are guards that borrow the store mutably, so they nest strictly. A guard
//! dereferences to the [`Store`], which means everything can be done through it,
//! including entering further scopes.
//!
//! ```rust
//! use std::sync::Arc;
//! use typetx::{Store, Value, types::{ComplexType, PropertyType, SimpleKind, ValueType}};
//!
//! let person = ComplexType::builder("person")
//!     .property(PropertyType::new("name", ValueType::Simple(SimpleKind::String)))
//!     .property(PropertyType::new("tags", ValueType::list(ValueType::Simple(SimpleKind::String))))
//!     .build()
//!     .unwrap();
//!
//! let mut store = Store::default();
//! store.register_type(Arc::clone(&person)).unwrap();
//! let alice = store.create("person").unwrap();
//! let tags = store.list_of(alice, "tags").unwrap();
//!
//! // 1. CHANGE INSIDE A TRANSACTION
//! let mut scope = store.enter_change();
//! scope.set(alice, "name", Value::from("Alice")).unwrap();
//! scope.list_add(tags, Value::from("admin")).unwrap();
//!
//! // Reads inside the transaction see the pending changes.
//! assert_eq!(scope.get(alice, "name").unwrap(), Some(Value::from("Alice")));
//!
//! // 2. COMMIT
//! scope.accept().unwrap();
//!
//! assert_eq!(store.get(alice, "name").unwrap(), Some(Value::from("Alice")));
//! assert_eq!(store.list_len(tags).unwrap(), 1);
//!
//! // 3. ROLLBACK
//! // A root scope dropped without `accept` rejects its transaction.
//! {
//!     let mut scope = store.enter_change();
//!     scope.set(alice, "name", Value::from("Bob")).unwrap();
//! }
//! assert_eq!(store.get(alice, "name").unwrap(), Some(Value::from("Alice")));
//! ```
//!
//! ## Reference Tracking
//!
//! Each instance carries a [`ReferenceList`]. Adding a complex value to a list, or
//! assigning it to a property, registers the container in the value's reference list;
//! removing it unregisters it. While a transaction is open these adjustments are made
//! on a projection owned by the transaction, so a rejected transaction leaves every
//! reference list exactly as it found it.
//!
//! Reference lists also drive change propagation: when an instance is first changed in
//! a transaction, changesets are created for all of its (non-boundary) containers and
//! the new changeset is linked under them. Observers of a container are therefore
//! notified of changes made deep inside it.
//!
//! ## Observation and Validation
//!
//! [`ChangeObserver`](action::ChangeObserver)s registered on the store are told about
//! every changeset that is about to be committed (and may cancel the commit, or make
//! further changes), every committed changeset and every rejected one.
//!
//! ## Specifications
//!
//! The [`specification`] module manages the ambient
//! [`SpecificationContext`](specification::SpecificationContext) which assigns ids to
//! instances during a serialization pass, so shared and cyclic references are written
//! once and referred to afterwards. With the `json` feature the store can write and
//! read instance graphs as `serde_json::Value`s.
//!
//! ## Features
//!
//! - `json`: Enables [`Store::to_spec`] and [`Store::from_spec`]. This feature is
//!   enabled by default.
//! - `serde`: Provides `serde` support for values, reference lists and [`StoreConfig`].
//! - `arbitrary`: Implements `quickcheck::Arbitrary` for values, useful for
//!   property-based testing.
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

use ahash::RandomState;
use std::{
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

// Use a constant seed for hashing to make performance benchmarks have less variance.
pub(crate) const DETERMINISTIC_HASHER: RandomState = RandomState::with_seeds(48, 1516, 23, 42);

pub mod action;
pub mod changes;
pub use changes::{ChangeType, Changeset, PrimitiveChange};
pub mod error;
pub use error::Error;
/// Macros usable for tests and initialization
pub mod macros;
pub mod references;
pub use references::{Reference, ReferenceList};
pub mod specification;
pub mod store;
pub use store::{InstanceId, Store, StoreConfig};
pub mod transaction;
pub use transaction::{Transaction, TransactionId, TransactionScope};
pub mod types;
pub mod value;
pub use value::{Key, Simple, SimpleValue, Value};

static ENABLE_DETERMINISM: AtomicBool = AtomicBool::new(false);

/// Makes all hash maps of the crate use a fixed seed.
///
/// This should only be enabled for testing, as it increases the odds of DoS
/// scenarios.
#[doc(hidden)]
pub fn enable_determinism() {
    ENABLE_DETERMINISM.store(true, Ordering::Release);
}

/// Checks if determinism is enabled.
///
/// Should be used internally and for testing.
#[doc(hidden)]
pub fn determinism_enabled() -> bool {
    ENABLE_DETERMINISM.load(Ordering::Acquire)
}

/// Create a random state for a hashmap.
/// If `enable_determinism` has been used, this will return a deterministic
/// decidedly non-random RandomState, useful in tests.
#[inline]
fn make_random_state() -> RandomState {
    if determinism_enabled() {
        DETERMINISTIC_HASHER
    } else {
        RandomState::new()
    }
}

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, TypetxRandomState>;

pub(crate) fn create_map<K, V>() -> HashMap<K, V> {
    std::collections::HashMap::with_hasher(TypetxRandomState::default())
}

/// This is a small wrapper around the standard RandomState.
/// This allows us to easily switch to a non-random RandomState for use in tests.
#[derive(Clone)]
pub struct TypetxRandomState {
    inner: RandomState,
}

// Falls back on regular ahash::RandomState except when 'enable_determinism' has been
// called, in which case a static only-for-test RandomState is used.
impl Default for TypetxRandomState {
    #[inline]
    fn default() -> Self {
        Self {
            inner: make_random_state(),
        }
    }
}

impl BuildHasher for TypetxRandomState {
    type Hasher = <RandomState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        self.inner.build_hasher()
    }
}
