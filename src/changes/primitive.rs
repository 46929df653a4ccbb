// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{
    InstanceId, Value,
    references::{Reference, ReferenceTracker},
    store::{ComplexStorage, ListStorage},
};
use std::fmt;

/// The discriminant of a [`PrimitiveChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Add,
    Remove,
    Move,
    Clear,
    Sort,
    Set,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Remove => "remove",
            ChangeType::Move => "move",
            ChangeType::Clear => "clear",
            ChangeType::Sort => "sort",
            ChangeType::Set => "set",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The container a change is made to, as seen by the reference lists of the values the
/// change adds or removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Referrer {
    pub container: InstanceId,
    /// The property holding the value, `None` for list containers.
    pub property: Option<usize>,
    /// Boundary containers do not register themselves in reference lists.
    pub is_boundary: bool,
}

impl Referrer {
    pub fn list(container: InstanceId, is_boundary: bool) -> Self {
        Self {
            container,
            property: None,
            is_boundary,
        }
    }

    pub fn property(container: InstanceId, property: usize, is_boundary: bool) -> Self {
        Self {
            container,
            property: Some(property),
            is_boundary,
        }
    }

    pub fn reference(&self) -> Reference {
        Reference::new(self.container, self.property)
    }
}

/// The storage a change is applied to.
pub enum ChangeTarget<'a> {
    List(&'a mut ListStorage),
    Complex(&'a mut ComplexStorage),
}

/// The smallest replayable edit.
///
/// List changes carry the elements they add or remove so that reference bookkeeping can
/// be done (and undone) without looking at the list. Indexes are positions in the list
/// as it is right before the change.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveChange {
    /// Inserts `element` at `index`.
    Add { element: Value, index: usize },
    /// Removes the contiguous run `elements` starting at `index`.
    Remove { elements: Vec<Value>, index: usize },
    /// Relocates `element` from `index_old` to `index_new`.
    Move {
        element: Value,
        index_old: usize,
        index_new: usize,
    },
    /// Removes all `elements`.
    Clear { elements: Vec<Value> },
    /// Reorders the list so its elements are exactly `order`.
    Sort { order: Vec<Value> },
    /// Replaces the value of `property`, which was `old` when the transaction touched it.
    Set {
        property: usize,
        value: Option<Value>,
        old: Option<Value>,
    },
}

impl PrimitiveChange {
    pub fn change_type(&self) -> ChangeType {
        match self {
            PrimitiveChange::Add { .. } => ChangeType::Add,
            PrimitiveChange::Remove { .. } => ChangeType::Remove,
            PrimitiveChange::Move { .. } => ChangeType::Move,
            PrimitiveChange::Clear { .. } => ChangeType::Clear,
            PrimitiveChange::Sort { .. } => ChangeType::Sort,
            PrimitiveChange::Set { .. } => ChangeType::Set,
        }
    }

    /// Instances this change starts holding.
    pub fn added_instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        let added: &[Value] = match self {
            PrimitiveChange::Add { element, .. } => std::slice::from_ref(element),
            PrimitiveChange::Set { value: Some(v), .. } => std::slice::from_ref(v),
            _ => &[],
        };
        added.iter().filter_map(Value::instance)
    }

    /// Instances this change stops holding.
    pub fn removed_instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        let removed: &[Value] = match self {
            PrimitiveChange::Remove { elements, .. } | PrimitiveChange::Clear { elements } => {
                elements
            }
            PrimitiveChange::Set { old: Some(v), .. } => std::slice::from_ref(v),
            _ => &[],
        };
        removed.iter().filter_map(Value::instance)
    }

    /// Registers the change in the reference lists of the values it adds and removes.
    ///
    /// Called once, when the change is recorded into its changeset. A removed value may
    /// lack the reference already, when another transaction committed its removal after
    /// the container was read. Such a transaction is stale and fails to commit.
    pub fn prepare(&self, referrer: &Referrer, tracker: &mut impl ReferenceTracker) {
        if referrer.is_boundary {
            return;
        }
        let reference = referrer.reference();
        for removed in self.removed_instances() {
            tracker.remove_reference(removed, reference);
        }
        for added in self.added_instances() {
            tracker.add_reference(added, reference);
        }
    }

    /// Undoes [`PrimitiveChange::prepare`].
    pub fn cancel(&self, referrer: &Referrer, tracker: &mut impl ReferenceTracker) {
        if referrer.is_boundary {
            return;
        }
        let reference = referrer.reference();
        for added in self.added_instances() {
            tracker.remove_reference(added, reference);
        }
        for removed in self.removed_instances() {
            tracker.add_reference(removed, reference);
        }
    }

    /// Mutates `target` directly.
    ///
    /// # Panics
    ///
    /// Panics if the change does not fit `target`: a list change applied to a complex
    /// storage or vice versa, or positions that are out of bounds.
    pub fn apply(&self, target: ChangeTarget<'_>) {
        match (self, target) {
            (PrimitiveChange::Add { element, index }, ChangeTarget::List(list)) => {
                list.insert(*index, element.clone());
            }
            (PrimitiveChange::Remove { elements, index }, ChangeTarget::List(list)) => {
                list.remove_run(*index, elements);
            }
            (
                PrimitiveChange::Move {
                    index_old,
                    index_new,
                    ..
                },
                ChangeTarget::List(list),
            ) => {
                list.relocate(*index_old, *index_new);
            }
            (PrimitiveChange::Clear { .. }, ChangeTarget::List(list)) => list.clear(),
            (PrimitiveChange::Sort { order }, ChangeTarget::List(list)) => list.reorder(order),
            (PrimitiveChange::Set { property, value, .. }, ChangeTarget::Complex(complex)) => {
                complex.assign(*property, value.clone());
            }
            (change, _) => panic!(
                "{} change applied to the wrong kind of storage",
                change.change_type()
            ),
        }
    }
}

impl fmt::Display for PrimitiveChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveChange::Add { element, index } => write!(f, "add {element} at {index}"),
            PrimitiveChange::Remove { elements, index } => {
                write!(f, "remove {} at {index}", elements.len())
            }
            PrimitiveChange::Move {
                element,
                index_old,
                index_new,
            } => write!(f, "move {element} from {index_old} to {index_new}"),
            PrimitiveChange::Clear { elements } => write!(f, "clear {}", elements.len()),
            PrimitiveChange::Sort { order } => write!(f, "sort {}", order.len()),
            PrimitiveChange::Set {
                property, value, ..
            } => match value {
                Some(value) => write!(f, "set {property} to {value}"),
                None => write!(f, "unset {property}"),
            },
        }
    }
}
