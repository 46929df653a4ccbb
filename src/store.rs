// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The arena owning every instance.
//!
//! A [`Store`] owns the committed state of all instances, the registry of complex types,
//! the stack of transaction scopes and the registered observers. Instances are addressed
//! by [`InstanceId`]s. They are never freed: an instance whose [`ReferenceList`] is empty
//! is merely not held by anything anymore.
//!
//! Every read made through the store reflects the projection of the current
//! transaction, if there is one. Reads made while no transaction is current (or from
//! within a [`CommittedScope`](crate::transaction::CommittedScope)) see committed state.
use crate::{
    HashMap, ReferenceList, Value,
    action::{ChangeObserver, ObserverId},
    changes::Changeset,
    create_map,
    error::Error,
    transaction::{Transaction, TransactionContext, TransactionId},
    types::{ComplexType, ValueType},
};
use std::{fmt, sync::Arc};
use tracing::debug;

mod commit;
mod config;
mod mutation;
mod storage;

#[cfg(feature = "json")]
pub(crate) use mutation::Access;
pub use config::StoreConfig;
pub use storage::{ComplexStorage, ListStorage};

/// A handle to an instance owned by a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct InstanceId(u32);

impl InstanceId {
    /// Builds a handle from its raw index.
    ///
    /// The handle is only meaningful for the store that produced the index.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum InstanceKind {
    Complex {
        ty: Arc<ComplexType>,
        storage: ComplexStorage,
    },
    List {
        element: ValueType,
        is_boundary: bool,
        storage: ListStorage,
    },
}

/// The committed state of one instance.
#[derive(Debug, Clone)]
pub(crate) struct Instance {
    pub(crate) kind: InstanceKind,
    pub(crate) refs: ReferenceList,
    /// Bumped by every commit that changes the instance.
    pub(crate) version: u64,
    /// Bumped by every commit that changes `refs`.
    pub(crate) refs_version: u64,
}

impl Instance {
    fn new(kind: InstanceKind) -> Self {
        Self {
            kind,
            refs: ReferenceList::new(),
            version: 0,
            refs_version: 0,
        }
    }
}

/// The arena of instances, together with the transactions mutating them.
///
/// See the [crate documentation](crate) for an overview.
pub struct Store {
    pub(crate) instances: Vec<Instance>,
    types: HashMap<String, Arc<ComplexType>>,
    pub(crate) tx: TransactionContext,
    pub(crate) observers: Vec<(ObserverId, Box<dyn ChangeObserver>)>,
    next_observer: u64,
    config: StoreConfig,
}

impl Default for Store {
    fn default() -> Self {
        Self::with_config(StoreConfig::default())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("instances", &self.instances.len())
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("current_transaction", &self.tx.current())
            .field("observers", &self.observers.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Store {
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            instances: Vec::new(),
            types: create_map(),
            tx: TransactionContext::default(),
            observers: Vec::new(),
            next_observer: 0,
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Makes `ty` available to [`Store::create`].
    ///
    /// Registering the very same type twice is a no-op; registering a different type
    /// under an id already in use fails.
    pub fn register_type(&mut self, ty: Arc<ComplexType>) -> Result<(), Error> {
        if let Some(existing) = self.types.get(ty.id()) {
            if Arc::ptr_eq(existing, &ty) || **existing == *ty {
                return Ok(());
            }
            return Err(Error::DuplicateType(ty.id().to_owned()));
        }
        debug!(type_id = ty.id(), properties = ty.properties().len(), "registered type");
        self.types.insert(ty.id().to_owned(), ty);
        Ok(())
    }

    pub fn complex_type(&self, type_id: &str) -> Option<&Arc<ComplexType>> {
        self.types.get(type_id)
    }

    /// Creates an instance of a registered complex type with all properties unset.
    ///
    /// Every list-valued property is given a fresh, empty list instance, owned by the new
    /// instance for its whole life.
    pub fn create(&mut self, type_id: &str) -> Result<InstanceId, Error> {
        let ty = self
            .types
            .get(type_id)
            .cloned()
            .ok_or_else(|| Error::UnknownType(type_id.to_owned()))?;

        let id = self.next_id();
        let mut storage = ComplexStorage::with_slots(ty.properties().len());
        self.instances.push(Instance::new(InstanceKind::Complex {
            ty: Arc::clone(&ty),
            storage: storage.clone(),
        }));
        for property in ty.properties() {
            let Some(element) = property.value_type().element() else {
                continue;
            };
            let list = self.create_list(element.clone(), property.is_boundary());
            if !property.is_boundary() {
                self.instances[list.index()]
                    .refs
                    .add(id, Some(property.index()));
            }
            storage.assign(property.index(), Some(Value::Ref(list)));
        }
        if let InstanceKind::Complex { storage: slot, .. } = &mut self.instances[id.index()].kind
        {
            *slot = storage;
        }
        Ok(id)
    }

    /// Creates a standalone, empty list.
    ///
    /// A boundary list does not register itself in the reference lists of its elements.
    pub fn create_list(&mut self, element: ValueType, is_boundary: bool) -> InstanceId {
        let id = self.next_id();
        self.instances.push(Instance::new(InstanceKind::List {
            element,
            is_boundary,
            storage: ListStorage::default(),
        }));
        id
    }

    fn next_id(&self) -> InstanceId {
        let raw = u32::try_from(self.instances.len()).expect("more than u32::MAX instances");
        InstanceId(raw)
    }

    /// Number of instances ever created.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub(crate) fn instance(&self, id: InstanceId) -> Result<&Instance, Error> {
        self.instances
            .get(id.index())
            .ok_or(Error::InstanceNotFound(id))
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        id.index() < self.instances.len()
    }

    pub fn is_list(&self, id: InstanceId) -> bool {
        matches!(
            self.instances.get(id.index()).map(|i| &i.kind),
            Some(InstanceKind::List { .. })
        )
    }

    /// The type of a complex instance.
    pub fn type_of(&self, id: InstanceId) -> Result<&Arc<ComplexType>, Error> {
        match &self.instance(id)?.kind {
            InstanceKind::Complex { ty, .. } => Ok(ty),
            InstanceKind::List { .. } => Err(Error::NotAComplex(id)),
        }
    }

    /// The element type of a list.
    pub fn element_type(&self, list: InstanceId) -> Result<&ValueType, Error> {
        match &self.instance(list)?.kind {
            InstanceKind::List { element, .. } => Ok(element),
            InstanceKind::Complex { .. } => Err(Error::NotAList(list)),
        }
    }

    /// The changeset of `target` in the current transaction.
    pub fn changeset(&self, target: InstanceId) -> Option<&Changeset> {
        self.current()?.changeset(target)
    }

    pub fn current_transaction(&self) -> Option<TransactionId> {
        self.tx.current()
    }

    /// The current transaction.
    pub fn current(&self) -> Option<&Transaction> {
        self.tx.get(self.tx.current()?)
    }

    /// Looks up an unresolved transaction.
    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.tx.get(id)
    }

    /// Reads a property of a complex instance.
    pub fn get(&self, owner: InstanceId, name: &str) -> Result<Option<Value>, Error> {
        let ty = self.type_of(owner)?;
        let index = ty
            .property(name)
            .ok_or_else(|| Error::unknown_property(ty, name))?
            .index();
        if let Some(cs) = self.changeset(owner).and_then(Changeset::as_complex) {
            return Ok(cs.get_new_at(index).cloned());
        }
        match &self.instance(owner)?.kind {
            InstanceKind::Complex { storage, .. } => Ok(storage.get(index).cloned()),
            InstanceKind::List { .. } => Err(Error::NotAComplex(owner)),
        }
    }

    /// The list owned by a list-valued property.
    pub fn list_of(&self, owner: InstanceId, name: &str) -> Result<InstanceId, Error> {
        let ty = self.type_of(owner)?;
        let property = ty
            .property(name)
            .ok_or_else(|| Error::unknown_property(ty, name))?;
        if !property.is_list() {
            return Err(Error::NotAListProperty {
                type_id: ty.id().to_owned(),
                name: name.to_owned(),
            });
        }
        self.get(owner, name)?
            .and_then(|value| value.instance())
            .ok_or(Error::NotAList(owner))
    }

    pub(crate) fn list_storage(&self, list: InstanceId) -> Result<&ListStorage, Error> {
        if let Some(cs) = self.changeset(list).and_then(Changeset::as_list) {
            return Ok(cs.projected());
        }
        match &self.instance(list)?.kind {
            InstanceKind::List { storage, .. } => Ok(storage),
            InstanceKind::Complex { .. } => Err(Error::NotAList(list)),
        }
    }

    pub fn list_elements(&self, list: InstanceId) -> Result<&[Value], Error> {
        Ok(self.list_storage(list)?.elements())
    }

    pub fn list_len(&self, list: InstanceId) -> Result<usize, Error> {
        Ok(self.list_storage(list)?.len())
    }

    pub fn list_get(&self, list: InstanceId, index: usize) -> Result<Option<&Value>, Error> {
        Ok(self.list_storage(list)?.elements().get(index))
    }

    pub fn list_contains(&self, list: InstanceId, element: &Value) -> Result<bool, Error> {
        Ok(self.list_storage(list)?.contains_key(&element.key()))
    }

    /// The containers currently holding `id`.
    pub fn references(&self, id: InstanceId) -> Result<&ReferenceList, Error> {
        let instance = self.instance(id)?;
        Ok(self
            .current()
            .and_then(|txn| txn.references(id))
            .unwrap_or(&instance.refs))
    }

    /// The committed version of an instance, bumped by every commit changing it.
    pub fn version(&self, id: InstanceId) -> Result<u64, Error> {
        Ok(self.instance(id)?.version)
    }

    /// Checks that every required property of `id` has a value.
    ///
    /// A required list-valued property must hold at least one element.
    pub fn validate(&self, id: InstanceId) -> Result<(), Error> {
        let ty = self.type_of(id)?;
        for property in ty.properties().iter().filter(|p| p.is_required()) {
            let present = if property.is_list() {
                self.list_len(self.list_of(id, property.name())?)? > 0
            } else {
                self.get(id, property.name())?.is_some()
            };
            if !present {
                return Err(Error::MissingRequired {
                    type_id: ty.id().to_owned(),
                    name: property.name().to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Checks that `value` may be stored in a slot of type `expected`.
    pub(crate) fn check_value(&self, expected: &ValueType, value: &Value) -> Result<(), Error> {
        let mismatch = |found: String| Error::TypeMismatch {
            expected: expected.to_string(),
            found,
        };
        match (expected, value) {
            (ValueType::Simple(kind), Value::Simple(simple)) => {
                if kind.accepts(simple.value().kind()) {
                    Ok(())
                } else {
                    Err(mismatch(format!("{:?}", simple.value().kind())))
                }
            }
            (ValueType::Complex(type_id), Value::Ref(id)) => match &self.instance(*id)?.kind {
                InstanceKind::Complex { ty, .. } => match type_id {
                    Some(type_id) if ty.id() != type_id => Err(mismatch(ty.id().to_owned())),
                    _ => Ok(()),
                },
                InstanceKind::List { .. } => Err(mismatch("list".to_owned())),
            },
            (ValueType::List(_), Value::Ref(id)) => match &self.instance(*id)?.kind {
                InstanceKind::List { .. } => Ok(()),
                InstanceKind::Complex { ty, .. } => Err(mismatch(ty.id().to_owned())),
            },
            (_, Value::Simple(simple)) => Err(mismatch(format!("{:?}", simple.value().kind()))),
            (ValueType::Simple(_), Value::Ref(id)) => Err(mismatch(id.to_string())),
        }
    }

    /// Registers an observer notified about every changeset of every transaction.
    pub fn add_observer(&mut self, observer: Box<dyn ChangeObserver>) -> ObserverId {
        self.next_observer += 1;
        let id = ObserverId::new(self.next_observer);
        self.observers.push((id, observer));
        id
    }

    /// Unregisters an observer.
    ///
    /// Observers are detached from the store while they are being notified, so an
    /// observer cannot be removed from within a callback.
    pub fn remove_observer(&mut self, id: ObserverId) -> Option<Box<dyn ChangeObserver>> {
        let at = self.observers.iter().position(|(oid, _)| *oid == id)?;
        Some(self.observers.remove(at).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PropertyType, SimpleKind};

    fn store() -> Store {
        let mut store = Store::default();
        store
            .register_type(
                ComplexType::builder("node")
                    .property(PropertyType::new("label", ValueType::Simple(SimpleKind::String)))
                    .property(PropertyType::new("next", ValueType::complex("node")))
                    .property(PropertyType::new(
                        "children",
                        ValueType::list(ValueType::complex("node")),
                    ))
                    .property(PropertyType::new(
                        "weak",
                        ValueType::list(ValueType::complex("node")),
                    ).boundary())
                    .build()
                    .unwrap(),
            )
            .unwrap();
        store
    }

    #[test]
    fn create_owns_list_properties() {
        let mut store = store();
        let node = store.create("node").unwrap();
        let children = store.list_of(node, "children").unwrap();
        let weak = store.list_of(node, "weak").unwrap();
        assert_ne!(children, weak);
        assert!(store.is_list(children));
        assert_eq!(store.list_len(children).unwrap(), 0);

        let refs = store.references(children).unwrap();
        assert_eq!(refs.len(), 1);
        assert!(refs.contains(node, Some(2)));
        assert!(store.references(weak).unwrap().is_empty());
    }

    #[test]
    fn unknown_things_are_errors() {
        let mut store = store();
        assert_eq!(
            store.create("edge").unwrap_err(),
            Error::UnknownType("edge".to_owned())
        );
        let node = store.create("node").unwrap();
        assert!(matches!(
            store.get(node, "color"),
            Err(Error::UnknownProperty { .. })
        ));
        assert!(matches!(
            store.list_of(node, "label"),
            Err(Error::NotAListProperty { .. })
        ));
        assert_eq!(
            store.get(InstanceId::from_raw(99), "label").unwrap_err(),
            Error::InstanceNotFound(InstanceId::from_raw(99))
        );
    }

    #[test]
    fn check_value_matches_types() {
        let mut store = store();
        let node = store.create("node").unwrap();
        let list = store.list_of(node, "children").unwrap();
        let label = ValueType::Simple(SimpleKind::String);
        assert!(store.check_value(&label, &Value::from("x")).is_ok());
        assert!(store.check_value(&label, &Value::from(1)).is_err());
        assert!(store.check_value(&label, &Value::from(node)).is_err());
        let node_type = ValueType::complex("node");
        assert!(store.check_value(&node_type, &Value::from(node)).is_ok());
        assert!(store.check_value(&node_type, &Value::from(list)).is_err());
        assert!(store
            .check_value(&ValueType::complex("edge"), &Value::from(node))
            .is_err());
        assert!(store
            .check_value(&ValueType::Complex(None), &Value::from(node))
            .is_ok());
    }

    #[test]
    fn registering_twice() {
        let mut store = store();
        let same = Arc::clone(store.complex_type("node").unwrap());
        assert!(store.register_type(same).is_ok());
        let other = ComplexType::builder("node").build().unwrap();
        assert_eq!(
            store.register_type(other).unwrap_err(),
            Error::DuplicateType("node".to_owned())
        );
    }
}
