// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Raw storage of instances.
//!
//! These are the slots [`PrimitiveChange::apply`](crate::PrimitiveChange::apply) mutates.
//! Nothing else writes to them once an instance is created.
use crate::{HashMap, Key, Value, create_map};
use std::fmt;

/// Position-indexed elements of a list, plus a lookup by key.
#[derive(Clone)]
pub struct ListStorage {
    elems: Vec<Value>,
    keys: HashMap<Key, Value>,
}

impl Default for ListStorage {
    fn default() -> Self {
        Self {
            elems: Vec::new(),
            keys: create_map(),
        }
    }
}

impl ListStorage {
    pub fn elements(&self) -> &[Value] {
        &self.elems
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.keys.get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.keys.contains_key(key)
    }

    /// Returns the index of the element with the given key.
    pub fn position(&self, key: &Key) -> Option<usize> {
        if !self.contains_key(key) {
            return None;
        }
        self.elems.iter().position(|element| element.key() == *key)
    }

    pub(crate) fn insert(&mut self, index: usize, element: Value) {
        let previous = self.keys.insert(element.key(), element.clone());
        debug_assert!(previous.is_none(), "duplicate key {}", element.key());
        self.elems.insert(index, element);
    }

    pub(crate) fn remove_run(&mut self, index: usize, elements: &[Value]) {
        for (removed, expected) in self.elems.drain(index..index + elements.len()).zip(elements) {
            debug_assert_eq!(&removed, expected);
            self.keys.remove(&removed.key());
        }
    }

    pub(crate) fn relocate(&mut self, index_old: usize, index_new: usize) {
        let element = self.elems.remove(index_old);
        self.elems.insert(index_new, element);
    }

    pub(crate) fn clear(&mut self) {
        self.elems.clear();
        self.keys.clear();
    }

    pub(crate) fn reorder(&mut self, order: &[Value]) {
        assert_eq!(order.len(), self.elems.len(), "sort order length mismatch");
        debug_assert!(order.iter().all(|e| self.keys.contains_key(&e.key())));
        self.elems.clear();
        self.elems.extend_from_slice(order);
    }
}

impl PartialEq for ListStorage {
    fn eq(&self, other: &Self) -> bool {
        self.elems == other.elems && self.keys == other.keys
    }
}

impl fmt::Debug for ListStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.elems).finish()
    }
}

/// One value slot per property of a complex type.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexStorage {
    values: Vec<Option<Value>>,
}

impl ComplexStorage {
    pub(crate) fn with_slots(slots: usize) -> Self {
        Self {
            values: vec![None; slots],
        }
    }

    pub fn get(&self, property: usize) -> Option<&Value> {
        self.values[property].as_ref()
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub(crate) fn assign(&mut self, property: usize, value: Option<Value>) {
        self.values[property] = value;
    }
}
