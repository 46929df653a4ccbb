// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Bookkeeping of who refers to a value.
//!
//! Every instance owns a [`ReferenceList`] holding one [`Reference`] per live
//! `(container, property)` edge pointing at it. Boundary properties never create
//! entries. An instance whose list is empty is not held by anything.
//!
//! The list is only changed through [`PrimitiveChange::prepare`] and
//! [`PrimitiveChange::cancel`](crate::PrimitiveChange::cancel), via a
//! [`ReferenceTracker`].
//!
//! [`PrimitiveChange::prepare`]: crate::PrimitiveChange::prepare
use crate::{HashMap, InstanceId};
use smallvec::SmallVec;
use std::fmt;

/// One edge pointing at a value.
///
/// `property` is the index of the holding property when the container is a complex
/// instance, and `None` when the container is a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Reference {
    pub container: InstanceId,
    pub property: Option<usize>,
}

impl Reference {
    pub fn new(container: InstanceId, property: Option<usize>) -> Self {
        Self {
            container,
            property,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.property {
            Some(property) => write!(f, "{}.{property}", self.container),
            None => write!(f, "{}[]", self.container),
        }
    }
}

/// The referrers of one value.
///
/// Entries are kept sorted by `(container, property)`, so two lists holding the same
/// edges are equal regardless of the order in which the edges were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct ReferenceList {
    entries: SmallVec<[Reference; 2]>,
}

impl ReferenceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `(container, property)`.
    ///
    /// Returns `true` if the pair was not present yet, `false` if this was a no-op.
    pub fn add(&mut self, container: InstanceId, property: Option<usize>) -> bool {
        let reference = Reference::new(container, property);
        match self.entries.binary_search(&reference) {
            Ok(_) => false,
            Err(at) => {
                self.entries.insert(at, reference);
                true
            }
        }
    }

    /// Unregisters `(container, property)`.
    ///
    /// A `None` property only matches entries with a `None` property. Returns `true` if
    /// the pair was found and removed.
    pub fn remove(&mut self, container: InstanceId, property: Option<usize>) -> bool {
        match self
            .entries
            .binary_search(&Reference::new(container, property))
        {
            Ok(at) => {
                self.entries.remove(at);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, container: InstanceId, property: Option<usize>) -> bool {
        self.entries
            .binary_search(&Reference::new(container, property))
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Reference> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a ReferenceList {
    type Item = &'a Reference;
    type IntoIter = std::slice::Iter<'a, Reference>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Adjusts reference lists on behalf of primitive changes.
///
/// Implemented by the ambient reference projection of a transaction, and by a plain map
/// of lists for standalone use.
pub trait ReferenceTracker {
    /// Registers `reference` in the list of `target`. See [`ReferenceList::add`].
    fn add_reference(&mut self, target: InstanceId, reference: Reference) -> bool;

    /// Unregisters `reference` from the list of `target`. See [`ReferenceList::remove`].
    fn remove_reference(&mut self, target: InstanceId, reference: Reference) -> bool;
}

impl ReferenceTracker for HashMap<InstanceId, ReferenceList> {
    fn add_reference(&mut self, target: InstanceId, reference: Reference) -> bool {
        self.entry(target)
            .or_default()
            .add(reference.container, reference.property)
    }

    fn remove_reference(&mut self, target: InstanceId, reference: Reference) -> bool {
        self.get_mut(&target)
            .is_some_and(|list| list.remove(reference.container, reference.property))
    }
}
