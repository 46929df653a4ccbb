// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{ChangeTarget, PrimitiveChange};
use crate::{
    InstanceId, Value,
    store::{ComplexStorage, ListStorage},
    types::ComplexType,
};
use smallvec::SmallVec;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// A [`PrimitiveChange`] together with the transaction version it was recorded at.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedChange {
    version: u64,
    change: PrimitiveChange,
}

impl RecordedChange {
    pub(crate) fn new(version: u64, change: PrimitiveChange) -> Self {
        Self { version, change }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn change(&self) -> &PrimitiveChange {
        &self.change
    }
}

/// Links a changeset to the changeset of a value it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildLink {
    /// The holding property, `None` when the container is a list.
    pub property: Option<usize>,
    pub target: InstanceId,
}

/// What changed about one property of a complex instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyChange<'a> {
    /// The property was assigned a new value.
    Set(&'a PrimitiveChange),
    /// The value held by the property has a changeset of its own.
    Nested(InstanceId),
}

#[derive(Debug, Clone)]
struct Header {
    target: InstanceId,
    // committed version of the target when the changeset was created
    base_version: u64,
    version: u64,
    version_local: u64,
    read_only: bool,
    parents: SmallVec<[InstanceId; 2]>,
    children: SmallVec<[ChildLink; 2]>,
    // linked children whose changesets recorded a change
    changed_children: SmallVec<[InstanceId; 2]>,
}

impl Header {
    fn new(target: InstanceId, base_version: u64) -> Self {
        Self {
            target,
            base_version,
            version: 0,
            version_local: 0,
            read_only: false,
            parents: SmallVec::new(),
            children: SmallVec::new(),
            changed_children: SmallVec::new(),
        }
    }
}

/// The changes made to a complex instance within one transaction.
#[derive(Clone)]
pub struct ComplexChangeset {
    header: Header,
    ty: Arc<ComplexType>,
    committed: ComplexStorage,
    changes: BTreeMap<usize, RecordedChange>,
}

impl ComplexChangeset {
    pub(crate) fn new(
        target: InstanceId,
        base_version: u64,
        ty: Arc<ComplexType>,
        committed: ComplexStorage,
    ) -> Self {
        Self {
            header: Header::new(target, base_version),
            ty,
            committed,
            changes: BTreeMap::new(),
        }
    }

    pub fn complex_type(&self) -> &Arc<ComplexType> {
        &self.ty
    }

    /// Names of the properties with a `Set` change, in declaration order.
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.changes
            .keys()
            .map(|&index| self.ty.property_at(index).name())
    }

    pub fn has_change(&self, name: &str) -> bool {
        self.get_change(name).is_some()
    }

    pub fn get_change(&self, name: &str) -> Option<PropertyChange<'_>> {
        let index = self.ty.property(name)?.index();
        if let Some(recorded) = self.changes.get(&index) {
            return Some(PropertyChange::Set(&recorded.change));
        }
        self.header
            .children
            .iter()
            .find(|link| {
                link.property == Some(index) && self.header.changed_children.contains(&link.target)
            })
            .map(|link| PropertyChange::Nested(link.target))
    }

    /// The committed value of a property.
    pub fn get_old(&self, name: &str) -> Option<&Value> {
        let index = self.ty.property(name)?.index();
        self.committed.get(index)
    }

    /// The value a property will have once the transaction commits.
    pub fn get_new(&self, name: &str) -> Option<&Value> {
        self.get_new_at(self.ty.property(name)?.index())
    }

    pub(crate) fn get_new_at(&self, index: usize) -> Option<&Value> {
        match self.changes.get(&index) {
            Some(RecordedChange {
                change: PrimitiveChange::Set { value, .. },
                ..
            }) => value.as_ref(),
            _ => self.committed.get(index),
        }
    }

    pub(crate) fn committed_at(&self, index: usize) -> Option<&Value> {
        self.committed.get(index)
    }

    pub(crate) fn replace_change(
        &mut self,
        index: usize,
        recorded: Option<RecordedChange>,
    ) -> Option<RecordedChange> {
        match recorded {
            Some(recorded) => self.changes.insert(index, recorded),
            None => self.changes.remove(&index),
        }
    }
}

impl fmt::Debug for ComplexChangeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplexChangeset")
            .field("target", &self.header.target)
            .field("type", &self.ty.id())
            .field("changes", &self.changes)
            .field("children", &self.header.children)
            .finish()
    }
}

/// The changes made to a list within one transaction.
#[derive(Clone)]
pub struct ListChangeset {
    header: Header,
    is_boundary: bool,
    original: ListStorage,
    projected: ListStorage,
    changes: Vec<RecordedChange>,
}

impl ListChangeset {
    pub(crate) fn new(
        target: InstanceId,
        base_version: u64,
        is_boundary: bool,
        committed: ListStorage,
    ) -> Self {
        Self {
            header: Header::new(target, base_version),
            is_boundary,
            projected: committed.clone(),
            original: committed,
            changes: Vec::new(),
        }
    }

    /// The list as it will be once the transaction commits.
    pub fn projected(&self) -> &ListStorage {
        &self.projected
    }

    /// The list as it was when the transaction first touched it.
    pub fn original(&self) -> &ListStorage {
        &self.original
    }

    pub fn is_boundary(&self) -> bool {
        self.is_boundary
    }

    pub(crate) fn push(&mut self, recorded: RecordedChange) {
        recorded
            .change
            .apply(ChangeTarget::List(&mut self.projected));
        self.changes.push(recorded);
    }

    pub(crate) fn take_changes(&mut self) -> Vec<RecordedChange> {
        self.projected = self.original.clone();
        std::mem::take(&mut self.changes)
    }
}

impl fmt::Debug for ListChangeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListChangeset")
            .field("target", &self.header.target)
            .field("changes", &self.changes)
            .field("children", &self.header.children)
            .finish()
    }
}

/// The ordered log of changes pending against one instance.
#[derive(Debug, Clone)]
pub enum Changeset {
    Complex(ComplexChangeset),
    List(ListChangeset),
}

impl Changeset {
    fn header(&self) -> &Header {
        match self {
            Changeset::Complex(cs) => &cs.header,
            Changeset::List(cs) => &cs.header,
        }
    }

    fn header_mut(&mut self) -> &mut Header {
        match self {
            Changeset::Complex(cs) => &mut cs.header,
            Changeset::List(cs) => &mut cs.header,
        }
    }

    /// The instance under mutation.
    pub fn target(&self) -> InstanceId {
        self.header().target
    }

    /// Same as [`Changeset::target`].
    pub fn owner(&self) -> InstanceId {
        self.target()
    }

    /// The latest transaction version at which this changeset or one of its nested
    /// changesets was touched.
    pub fn transaction_version(&self) -> u64 {
        self.header().version
    }

    /// The latest transaction version at which a change was recorded in this changeset.
    pub fn transaction_version_local(&self) -> u64 {
        self.header().version_local
    }

    pub(crate) fn base_version(&self) -> u64 {
        self.header().base_version
    }

    /// A changeset becomes read-only when its transaction is resolved.
    pub fn is_read_only(&self) -> bool {
        self.header().read_only
    }

    /// Whether changes were recorded in this changeset itself.
    ///
    /// Nested changes are reported by
    /// [`Transaction::has_changes`](crate::Transaction::has_changes).
    pub fn has_local_changes(&self) -> bool {
        match self {
            Changeset::Complex(cs) => !cs.changes.is_empty(),
            Changeset::List(cs) => !cs.changes.is_empty(),
        }
    }

    /// Recorded changes in recording order.
    pub fn changes(&self) -> Vec<&RecordedChange> {
        match self {
            Changeset::Complex(cs) => {
                let mut changes: Vec<_> = cs.changes.values().collect();
                changes.sort_by_key(|recorded| recorded.version);
                changes
            }
            Changeset::List(cs) => cs.changes.iter().collect(),
        }
    }

    pub fn children(&self) -> &[ChildLink] {
        &self.header().children
    }

    pub fn parents(&self) -> &[InstanceId] {
        &self.header().parents
    }

    pub fn as_complex(&self) -> Option<&ComplexChangeset> {
        match self {
            Changeset::Complex(cs) => Some(cs),
            Changeset::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListChangeset> {
        match self {
            Changeset::List(cs) => Some(cs),
            Changeset::Complex(_) => None,
        }
    }

    pub(crate) fn as_complex_mut(&mut self) -> Option<&mut ComplexChangeset> {
        match self {
            Changeset::Complex(cs) => Some(cs),
            Changeset::List(_) => None,
        }
    }

    pub(crate) fn as_list_mut(&mut self) -> Option<&mut ListChangeset> {
        match self {
            Changeset::List(cs) => Some(cs),
            Changeset::Complex(_) => None,
        }
    }

    /// Records a change made at `version`.
    pub(crate) fn touch(&mut self, version: u64) {
        let header = self.header_mut();
        header.version_local = version;
        header.version = header.version.max(version);
    }

    /// Raises the nested version, returning whether it grew.
    fn touch_nested(&mut self, version: u64) -> bool {
        let header = self.header_mut();
        if header.version < version {
            header.version = version;
            true
        } else {
            false
        }
    }

    /// Marks the changeset of `child` as changed and raises the nested version,
    /// returning whether it grew.
    pub(crate) fn touch_child(&mut self, child: InstanceId, version: u64) -> bool {
        let changed = &mut self.header_mut().changed_children;
        if !changed.contains(&child) {
            changed.push(child);
        }
        self.touch_nested(version)
    }

    pub(crate) fn set_read_only(&mut self) {
        self.header_mut().read_only = true;
    }

    pub(crate) fn link_child(&mut self, link: ChildLink) -> bool {
        let children = &mut self.header_mut().children;
        if children.contains(&link) {
            return false;
        }
        children.push(link);
        true
    }

    pub(crate) fn unlink_child(&mut self, link: ChildLink) {
        self.header_mut().children.retain(|l| *l != link);
    }

    pub(crate) fn link_parent(&mut self, parent: InstanceId) {
        let parents = &mut self.header_mut().parents;
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    /// Forgets that `child` changed, once it is no longer linked at all.
    pub(crate) fn forget_child(&mut self, child: InstanceId) {
        self.header_mut().changed_children.retain(|c| *c != child);
    }

    pub(crate) fn unlink_parent(&mut self, parent: InstanceId) {
        self.header_mut().parents.retain(|p| *p != parent);
    }

    /// Removes every change, returning them in recording order.
    pub(crate) fn take_changes(&mut self) -> Vec<RecordedChange> {
        match self {
            Changeset::Complex(cs) => {
                let mut changes: Vec<_> = std::mem::take(&mut cs.changes).into_values().collect();
                changes.sort_by_key(|recorded| recorded.version);
                changes
            }
            Changeset::List(cs) => cs.take_changes(),
        }
    }

    /// Applies every change to `target`, in recording order.
    pub(crate) fn apply_to(&self, target: ChangeTarget<'_>) {
        match (self, target) {
            (Changeset::List(cs), ChangeTarget::List(list)) => {
                for recorded in &cs.changes {
                    recorded.change.apply(ChangeTarget::List(&mut *list));
                }
                debug_assert_eq!(*list, cs.projected);
            }
            (Changeset::Complex(cs), ChangeTarget::Complex(complex)) => {
                for recorded in cs.changes.values() {
                    recorded.change.apply(ChangeTarget::Complex(&mut *complex));
                }
            }
            (cs, _) => panic!("changeset of {} applied to the wrong storage", cs.target()),
        }
    }
}
