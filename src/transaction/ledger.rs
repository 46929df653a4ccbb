// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::{TransactionId, TransactionState};
use crate::{
    HashMap, InstanceId, Value,
    changes::{
        Changeset, ChildLink, ComplexChangeset, ListChangeset, PrimitiveChange, RecordedChange,
        Referrer,
    },
    create_map,
    error::Error,
    references::{Reference, ReferenceList, ReferenceTracker},
    store::{Instance, InstanceKind},
};
use std::sync::Arc;

/// The reference list of an instance as a transaction sees it.
#[derive(Debug, Clone)]
pub(crate) struct ProjectedReferences {
    pub(crate) list: ReferenceList,
    /// `refs_version` of the instance when the projection was made.
    pub(crate) base_version: u64,
}

/// Reference tracking on behalf of a transaction.
///
/// The committed list of an instance is copied into the transaction the first time one
/// of its changes touches it. Committed lists are never written to.
struct AmbientReferences<'a> {
    projected: &'a mut HashMap<InstanceId, ProjectedReferences>,
    instances: &'a [Instance],
}

impl AmbientReferences<'_> {
    fn list(&mut self, target: InstanceId) -> &mut ReferenceList {
        let instances = self.instances;
        &mut self
            .projected
            .entry(target)
            .or_insert_with(|| match instances.get(target.index()) {
                Some(instance) => ProjectedReferences {
                    list: instance.refs.clone(),
                    base_version: instance.refs_version,
                },
                None => ProjectedReferences {
                    list: ReferenceList::new(),
                    base_version: 0,
                },
            })
            .list
    }
}

impl ReferenceTracker for AmbientReferences<'_> {
    fn add_reference(&mut self, target: InstanceId, reference: Reference) -> bool {
        self.list(target)
            .add(reference.container, reference.property)
    }

    fn remove_reference(&mut self, target: InstanceId, reference: Reference) -> bool {
        self.list(target)
            .remove(reference.container, reference.property)
    }
}

/// A set of changesets committed or rejected as a unit.
///
/// Transactions are owned by the [`Store`](crate::Store) until they are resolved. See
/// the [module documentation](super) for the life cycle.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    version: u64,
    changesets: Vec<Changeset>,
    index: HashMap<InstanceId, usize>,
    references: HashMap<InstanceId, ProjectedReferences>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Open,
            version: 0,
            changesets: Vec::new(),
            index: create_map(),
            references: create_map(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Bumped by every recorded change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_read_only(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn changeset(&self, target: InstanceId) -> Option<&Changeset> {
        self.index.get(&target).map(|&at| &self.changesets[at])
    }

    /// All changesets, in the order their targets were first touched.
    pub fn changesets(&self) -> impl Iterator<Item = &Changeset> {
        self.changesets.iter()
    }

    /// Whether `target` or anything it holds was changed.
    pub fn has_changes(&self, target: InstanceId) -> bool {
        self.changeset(target)
            .is_some_and(|cs| cs.transaction_version() > 0)
    }

    /// Whether any change is pending.
    pub fn is_empty(&self) -> bool {
        !self.changesets.iter().any(Changeset::has_local_changes)
    }

    /// The projected reference list of `target`, if a change of this transaction touched
    /// it.
    pub fn references(&self, target: InstanceId) -> Option<&ReferenceList> {
        self.references.get(&target).map(|projected| &projected.list)
    }

    pub(crate) fn set_state(&mut self, state: TransactionState) {
        debug_assert!(!self.state.is_terminal(), "{} is resolved", self.id);
        self.state = state;
        if state.is_terminal() {
            for cs in &mut self.changesets {
                cs.set_read_only();
            }
        }
    }

    pub(crate) fn position(&self, target: InstanceId) -> Option<usize> {
        self.index.get(&target).copied()
    }

    pub(crate) fn changeset_at(&self, at: usize) -> &Changeset {
        &self.changesets[at]
    }

    pub(crate) fn projected_references(
        &self,
    ) -> impl Iterator<Item = (&InstanceId, &ProjectedReferences)> {
        self.references.iter()
    }

    fn tracker<'a>(&'a mut self, instances: &'a [Instance]) -> AmbientReferences<'a> {
        AmbientReferences {
            projected: &mut self.references,
            instances,
        }
    }

    fn referrers(&self, instances: &[Instance], target: InstanceId) -> Vec<Reference> {
        match self.references.get(&target) {
            Some(projected) => projected.list.iter().copied().collect(),
            None => instances
                .get(target.index())
                .map(|instance| instance.refs.iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    /// Returns the position of the changeset of `target`, creating it if needed.
    ///
    /// A new changeset is linked under the changesets of every container holding
    /// `target`, which are created as well, recursively.
    pub(crate) fn ensure_changeset(
        &mut self,
        instances: &[Instance],
        target: InstanceId,
    ) -> Result<usize, Error> {
        if let Some(at) = self.position(target) {
            return Ok(at);
        }
        let instance = instances
            .get(target.index())
            .ok_or(Error::ArgumentRequired("owner"))?;
        let changeset = match &instance.kind {
            InstanceKind::Complex { ty, storage } => Changeset::Complex(ComplexChangeset::new(
                target,
                instance.version,
                Arc::clone(ty),
                storage.clone(),
            )),
            InstanceKind::List {
                is_boundary,
                storage,
                ..
            } => Changeset::List(ListChangeset::new(
                target,
                instance.version,
                *is_boundary,
                storage.clone(),
            )),
        };
        let at = self.changesets.len();
        self.changesets.push(changeset);
        self.index.insert(target, at);

        for referrer in self.referrers(instances, target) {
            let parent = self.ensure_changeset(instances, referrer.container)?;
            self.link(parent, at, referrer.property);
        }
        Ok(at)
    }

    fn link(&mut self, parent: usize, child: usize, property: Option<usize>) {
        let parent_target = self.changesets[parent].target();
        let child_target = self.changesets[child].target();
        if self.changesets[parent].link_child(ChildLink {
            property,
            target: child_target,
        }) {
            self.changesets[child].link_parent(parent_target);
        }
        let version = self.changesets[child].transaction_version();
        if version > 0 && self.changesets[parent].touch_child(child_target, version) {
            self.propagate(parent, version);
        }
    }

    fn unlink(&mut self, parent: usize, child_target: InstanceId, property: Option<usize>) {
        let Some(child) = self.position(child_target) else {
            return;
        };
        let parent_target = self.changesets[parent].target();
        self.changesets[parent].unlink_child(ChildLink {
            property,
            target: child_target,
        });
        let still_linked = self.changesets[parent]
            .children()
            .iter()
            .any(|link| link.target == child_target);
        if !still_linked {
            self.changesets[parent].forget_child(child_target);
            self.changesets[child].unlink_parent(parent_target);
        }
    }

    /// Keeps child links in line with what the container at `at` holds after `change`
    /// (when `forward`) or after its cancellation.
    fn relink(&mut self, at: usize, referrer: &Referrer, change: &PrimitiveChange, forward: bool) {
        if referrer.is_boundary {
            return;
        }
        let (linked, unlinked): (Vec<_>, Vec<_>) = if forward {
            (
                change.added_instances().collect(),
                change.removed_instances().collect(),
            )
        } else {
            (
                change.removed_instances().collect(),
                change.added_instances().collect(),
            )
        };
        for target in unlinked {
            self.unlink(at, target, referrer.property);
        }
        for target in linked {
            if let Some(child) = self.position(target) {
                self.link(at, child, referrer.property);
            }
        }
    }

    /// Raises the version of the changesets holding the one at `at`, transitively.
    fn propagate(&mut self, at: usize, version: u64) {
        let target = self.changesets[at].target();
        let mut pending: Vec<(InstanceId, InstanceId)> = self.changesets[at]
            .parents()
            .iter()
            .map(|&parent| (parent, target))
            .collect();
        while let Some((parent, child)) = pending.pop() {
            let Some(at) = self.position(parent) else {
                continue;
            };
            if self.changesets[at].touch_child(child, version) {
                pending.extend(
                    self.changesets[at]
                        .parents()
                        .iter()
                        .map(|&grandparent| (grandparent, parent)),
                );
            }
        }
    }

    fn bump(&mut self, at: usize) -> u64 {
        self.version += 1;
        let version = self.version;
        self.changesets[at].touch(version);
        self.propagate(at, version);
        version
    }

    fn referrer_for(&self, at: usize, change: &PrimitiveChange) -> Referrer {
        match &self.changesets[at] {
            Changeset::List(cs) => Referrer::list(self.changesets[at].target(), cs.is_boundary()),
            Changeset::Complex(cs) => {
                let property = match change {
                    PrimitiveChange::Set { property, .. } => *property,
                    other => unreachable!(
                        "{} change in the changeset of complex {}",
                        other.change_type(),
                        self.changesets[at].target()
                    ),
                };
                let is_boundary = cs.complex_type().property_at(property).is_boundary();
                Referrer::property(self.changesets[at].target(), property, is_boundary)
            }
        }
    }

    /// Records the assignment of `value` to `property` of the complex changeset at `at`.
    ///
    /// A previous assignment of the same property is cancelled first. The recorded
    /// change keeps the committed value as its old value, and an assignment of the
    /// committed value leaves no change behind.
    pub(crate) fn record_set(
        &mut self,
        instances: &[Instance],
        at: usize,
        property: usize,
        value: Option<Value>,
    ) {
        let Some(cs) = self.changesets[at].as_complex_mut() else {
            unreachable!("assignment recorded against a list changeset");
        };
        let previous = cs.replace_change(property, None);
        let old = match previous.as_ref().map(RecordedChange::change) {
            Some(PrimitiveChange::Set { old, .. }) => old.clone(),
            _ => cs.committed_at(property).cloned(),
        };
        let unchanged = value == old;
        if previous.is_none() && unchanged {
            return;
        }

        let change = PrimitiveChange::Set {
            property,
            value,
            old,
        };
        let referrer = self.referrer_for(at, &change);
        if let Some(previous) = previous {
            previous
                .change()
                .cancel(&referrer, &mut self.tracker(instances));
            self.relink(at, &referrer, previous.change(), false);
        }
        let version = self.bump(at);
        if unchanged {
            return;
        }
        change.prepare(&referrer, &mut self.tracker(instances));
        self.relink(at, &referrer, &change, true);
        if let Some(cs) = self.changesets[at].as_complex_mut() {
            cs.replace_change(property, Some(RecordedChange::new(version, change)));
        }
    }

    /// Records a list change against the list changeset at `at`.
    pub(crate) fn record_list(&mut self, instances: &[Instance], at: usize, change: PrimitiveChange) {
        let referrer = self.referrer_for(at, &change);
        change.prepare(&referrer, &mut self.tracker(instances));
        self.relink(at, &referrer, &change, true);
        let version = self.bump(at);
        match self.changesets[at].as_list_mut() {
            Some(cs) => cs.push(RecordedChange::new(version, change)),
            None => unreachable!("list change recorded against a complex changeset"),
        }
    }

    /// Cancels the changes of the changeset of `target`, in reverse order.
    pub(crate) fn clear_changes(&mut self, instances: &[Instance], target: InstanceId) {
        let Some(at) = self.position(target) else {
            return;
        };
        let changes = self.changesets[at].take_changes();
        if changes.is_empty() {
            return;
        }
        for recorded in changes.iter().rev() {
            let referrer = self.referrer_for(at, recorded.change());
            recorded
                .change()
                .cancel(&referrer, &mut self.tracker(instances));
            self.relink(at, &referrer, recorded.change(), false);
        }
        self.bump(at);
    }

    /// Cancels every change of every changeset, in reverse order of recording.
    ///
    /// The changesets keep their changes, so they can still be reported.
    pub(crate) fn cancel_all(&mut self, instances: &[Instance]) {
        let mut all: Vec<(u64, usize, PrimitiveChange)> = self
            .changesets
            .iter()
            .enumerate()
            .flat_map(|(at, cs)| {
                cs.changes()
                    .into_iter()
                    .map(move |recorded| (recorded.version(), at, recorded.change().clone()))
            })
            .collect();
        all.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (_, at, change) in all {
            let referrer = self.referrer_for(at, &change);
            change.cancel(&referrer, &mut self.tracker(instances));
        }
    }

    /// Finds an instance this transaction would overwrite although another transaction
    /// committed it after this one read it.
    pub(crate) fn find_stale(&self, instances: &[Instance]) -> Option<InstanceId> {
        let changed = self
            .changesets
            .iter()
            .filter(|cs| cs.has_local_changes())
            .find(|cs| {
                instances
                    .get(cs.target().index())
                    .is_some_and(|instance| instance.version != cs.base_version())
            })
            .map(Changeset::target);
        changed.or_else(|| {
            self.references
                .iter()
                .find(|(id, projected)| {
                    instances
                        .get(id.index())
                        .is_some_and(|instance| instance.refs_version != projected.base_version)
                })
                .map(|(id, _)| *id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Store,
        types::{ComplexType, PropertyType, SimpleKind, ValueType},
    };

    fn store() -> (Store, InstanceId, InstanceId) {
        let mut store = Store::default();
        store
            .register_type(
                ComplexType::builder("item")
                    .property(PropertyType::new("name", ValueType::Simple(SimpleKind::String)))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        store
            .register_type(
                ComplexType::builder("box")
                    .property(PropertyType::new("items", ValueType::list(ValueType::complex("item"))))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let container = store.create("box").unwrap();
        let list = store.list_of(container, "items").unwrap();
        (store, container, list)
    }

    #[test]
    fn new_changeset_is_linked_under_its_containers() {
        let (store, container, list) = store();
        let mut txn = Transaction::new(TransactionId::new(1));
        let at = txn.ensure_changeset(&store.instances, list).unwrap();

        assert_eq!(txn.changesets().count(), 2);
        assert_eq!(txn.changeset_at(at).parents(), &[container]);
        let parent = txn.changeset(container).unwrap();
        assert_eq!(
            parent.children(),
            &[ChildLink {
                property: Some(0),
                target: list
            }]
        );
    }

    #[test]
    fn missing_owner() {
        let (store, ..) = store();
        let mut txn = Transaction::new(TransactionId::new(1));
        assert_eq!(
            txn.ensure_changeset(&store.instances, InstanceId::from_raw(42))
                .unwrap_err(),
            Error::ArgumentRequired("owner")
        );
    }

    #[test]
    fn versions_propagate_to_containers() {
        let (mut store, container, list) = store();
        let item = store.create("item").unwrap();
        let mut txn = Transaction::new(TransactionId::new(1));
        let at = txn.ensure_changeset(&store.instances, list).unwrap();
        txn.record_list(
            &store.instances,
            at,
            PrimitiveChange::Add {
                element: Value::from(item),
                index: 0,
            },
        );

        let list_cs = txn.changeset(list).unwrap();
        assert_eq!(list_cs.transaction_version_local(), 1);
        let parent = txn.changeset(container).unwrap();
        assert_eq!(parent.transaction_version(), 1);
        assert_eq!(parent.transaction_version_local(), 0);
        assert!(txn.references(item).unwrap().contains(list, None));
        // the committed list is left alone
        assert!(store.instances[item.index()].refs.is_empty());

        // once the item has a changeset of its own, it hangs under the list
        let item_at = txn.ensure_changeset(&store.instances, item).unwrap();
        txn.record_set(&store.instances, item_at, 0, Some(Value::from("a")));
        assert_eq!(txn.changeset(list).unwrap().transaction_version(), 2);
        assert_eq!(txn.changeset(container).unwrap().transaction_version(), 2);
    }

    #[test]
    fn sets_coalesce() {
        let (mut store, ..) = store();
        let item = store.create("item").unwrap();
        let mut txn = Transaction::new(TransactionId::new(1));
        let at = txn.ensure_changeset(&store.instances, item).unwrap();

        txn.record_set(&store.instances, at, 0, Some(Value::from("a")));
        txn.record_set(&store.instances, at, 0, Some(Value::from("b")));
        let cs = txn.changeset(item).unwrap();
        let changes = cs.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].change(),
            &PrimitiveChange::Set {
                property: 0,
                value: Some(Value::from("b")),
                old: None,
            }
        );

        // back to the committed value: no change left
        txn.record_set(&store.instances, at, 0, None);
        assert!(!txn.changeset(item).unwrap().has_local_changes());
        assert!(txn.is_empty());
    }

    #[test]
    fn cancel_all_restores_projection() {
        let (mut store, _, list) = store();
        let items: Vec<_> = (0..3).map(|_| store.create("item").unwrap()).collect();
        let mut txn = Transaction::new(TransactionId::new(1));
        let at = txn.ensure_changeset(&store.instances, list).unwrap();
        for (index, item) in items.iter().enumerate() {
            txn.record_list(
                &store.instances,
                at,
                PrimitiveChange::Add {
                    element: Value::from(*item),
                    index,
                },
            );
        }
        txn.record_list(
            &store.instances,
            at,
            PrimitiveChange::Remove {
                elements: vec![Value::from(items[1])],
                index: 1,
            },
        );
        assert!(txn.references(items[1]).unwrap().is_empty());
        assert_eq!(txn.references(items[2]).unwrap().len(), 1);

        txn.cancel_all(&store.instances);
        for item in items {
            assert!(txn.references(item).unwrap().is_empty());
        }
        // the changes are still there to be reported
        assert_eq!(txn.changeset(list).unwrap().changes().len(), 4);
    }
}
