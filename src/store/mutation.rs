// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Mutations. Each one is recorded in the current transaction, or in an implicit one
//! committed before the call returns.
use super::Store;
use crate::{
    Value,
    action::RejectReason,
    changes::{Changeset, PrimitiveChange},
    error::Error,
    store::{InstanceId, ListStorage},
    transaction::{TransactionError, TransactionId},
};
use std::cmp::Ordering;
use tracing::trace;

/// Whether read-only properties may be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    Public,
    /// Used while an instance is being built from a specification.
    #[cfg_attr(not(feature = "json"), allow(dead_code))]
    Initialize,
}

impl Store {
    /// Runs `f` in the current transaction, or in an implicit one.
    ///
    /// An implicit transaction is committed if `f` succeeds and rejected if it fails.
    fn in_transaction<R>(
        &mut self,
        f: impl FnOnce(&mut Store, TransactionId) -> Result<R, Error>,
    ) -> Result<R, Error> {
        if let Some(transaction) = self.tx.current() {
            self.ledger(transaction)?;
            return f(self, transaction);
        }

        let transaction = self.tx.create();
        let frame = self.tx.push(Some(transaction));
        let result = f(self, transaction);
        self.tx.pop(frame.id);
        match result {
            Ok(value) => {
                if self.ledger(transaction)?.is_empty() {
                    self.tx.remove(transaction);
                } else {
                    trace!(%transaction, "committing implicit transaction");
                    self.commit(transaction)?;
                }
                Ok(value)
            }
            Err(error) => {
                self.reject_transaction(
                    transaction,
                    RejectReason::Failed(error.to_string()),
                    None,
                );
                Err(error)
            }
        }
    }

    /// Assigns a property of a complex instance.
    ///
    /// # Errors
    ///
    /// Fails if `owner` is not a live complex instance, if the property does not exist,
    /// is read-only or list-valued, or if `value` does not fit its type. Fails with
    /// [`TransactionError::Rejected`] if the implicit transaction of the call is
    /// rejected.
    pub fn set(&mut self, owner: InstanceId, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        self.assign(owner, name, Some(value.into()), Access::Public)
    }

    /// Clears a property of a complex instance. See [`Store::set`].
    pub fn unset(&mut self, owner: InstanceId, name: &str) -> Result<(), Error> {
        self.assign(owner, name, None, Access::Public)
    }

    pub(crate) fn assign(
        &mut self,
        owner: InstanceId,
        name: &str,
        value: Option<Value>,
        access: Access,
    ) -> Result<(), Error> {
        self.in_transaction(|store, transaction| {
            let at = store.ensure_changeset(transaction, owner)?;
            let ty = store.type_of(owner)?;
            let property = ty
                .property(name)
                .ok_or_else(|| Error::unknown_property(ty, name))?;
            if property.is_list() {
                return Err(Error::ListProperty {
                    type_id: ty.id().to_owned(),
                    name: name.to_owned(),
                });
            }
            if property.is_read_only() && access == Access::Public {
                return Err(Error::ReadOnlyProperty {
                    type_id: ty.id().to_owned(),
                    name: name.to_owned(),
                });
            }
            if let Some(value) = &value {
                store.check_value(property.value_type(), value)?;
            }
            let index = property.index();
            let Store { instances, tx, .. } = store;
            let ledger = tx
                .get_mut(transaction)
                .ok_or(TransactionError::Resolved(transaction))?;
            ledger.record_set(instances, at, index, value);
            Ok(())
        })
    }

    fn ensure_changeset(
        &mut self,
        transaction: TransactionId,
        target: InstanceId,
    ) -> Result<usize, Error> {
        let Store { instances, tx, .. } = self;
        tx.get_mut(transaction)
            .ok_or(TransactionError::Resolved(transaction))?
            .ensure_changeset(instances, target)
    }

    /// Records the change `build` makes of the projected state of `list`, if any.
    ///
    /// `element` is checked against the element type of the list first.
    fn change_list<R>(
        &mut self,
        list: InstanceId,
        element: Option<&Value>,
        build: impl FnOnce(&ListStorage) -> (Option<PrimitiveChange>, R),
    ) -> Result<R, Error> {
        self.in_transaction(|store, transaction| {
            let at = store.ensure_changeset(transaction, list)?;
            if let Some(element) = element {
                let expected = store.element_type(list)?;
                store.check_value(expected, element)?;
            }
            let Store { instances, tx, .. } = store;
            let ledger = tx
                .get_mut(transaction)
                .ok_or(TransactionError::Resolved(transaction))?;
            let projected = match ledger.changeset_at(at) {
                Changeset::List(cs) => cs.projected(),
                Changeset::Complex(_) => return Err(Error::NotAList(list)),
            };
            let (change, result) = build(projected);
            if let Some(change) = change {
                trace!(%transaction, %list, %change, "recording list change");
                ledger.record_list(instances, at, change);
            }
            Ok(result)
        })
    }

    /// Appends `element` to `list`.
    ///
    /// Returns `false`, and changes nothing, if the list holds an element with the same
    /// key already.
    pub fn list_add(&mut self, list: InstanceId, element: impl Into<Value>) -> Result<bool, Error> {
        let element = element.into();
        self.change_list(list, Some(&element), |projected| {
            if projected.contains_key(&element.key()) {
                return (None, false);
            }
            let index = projected.len();
            (Some(PrimitiveChange::Add { element: element.clone(), index }), true)
        })
    }

    /// Inserts `element` into `list` at `index`.
    ///
    /// Returns `false`, and changes nothing, if the list holds an element with the same
    /// key already.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the length of the list.
    pub fn list_insert(
        &mut self,
        list: InstanceId,
        index: usize,
        element: impl Into<Value>,
    ) -> Result<bool, Error> {
        let element = element.into();
        self.change_list(list, Some(&element), |projected| {
            assert!(
                index <= projected.len(),
                "insertion index (is {index}) should be <= len (is {})",
                projected.len()
            );
            if projected.contains_key(&element.key()) {
                return (None, false);
            }
            (Some(PrimitiveChange::Add { element: element.clone(), index }), true)
        })
    }

    /// Removes the element of `list` with the key of `element`.
    ///
    /// Returns whether the element was found.
    pub fn list_remove(&mut self, list: InstanceId, element: &Value) -> Result<bool, Error> {
        self.change_list(list, None, |projected| {
            let Some(index) = projected.position(&element.key()) else {
                return (None, false);
            };
            let elements = vec![projected.elements()[index].clone()];
            (Some(PrimitiveChange::Remove { elements, index }), true)
        })
    }

    /// Removes `count` elements of `list` starting at `index`, returning them.
    ///
    /// # Panics
    ///
    /// Panics if `index + count` is greater than the length of the list.
    pub fn list_remove_at(
        &mut self,
        list: InstanceId,
        index: usize,
        count: usize,
    ) -> Result<Vec<Value>, Error> {
        self.change_list(list, None, |projected| {
            let end = index.checked_add(count).unwrap_or(usize::MAX);
            assert!(
                end <= projected.len(),
                "removal range {index}..{end} out of bounds for length {}",
                projected.len()
            );
            if count == 0 {
                return (None, Vec::new());
            }
            let elements = projected.elements()[index..end].to_vec();
            (
                Some(PrimitiveChange::Remove {
                    elements: elements.clone(),
                    index,
                }),
                elements,
            )
        })
    }

    /// Moves the element of `list` with the key of `element` to `index_new`.
    ///
    /// Returns `false` if the element was not found or is at `index_new` already.
    ///
    /// # Panics
    ///
    /// Panics if `index_new` is not a position of the list.
    pub fn list_move(
        &mut self,
        list: InstanceId,
        element: &Value,
        index_new: usize,
    ) -> Result<bool, Error> {
        self.change_list(list, None, |projected| {
            assert!(
                index_new < projected.len(),
                "move index (is {index_new}) should be < len (is {})",
                projected.len()
            );
            let Some(index_old) = projected.position(&element.key()) else {
                return (None, false);
            };
            if index_old == index_new {
                return (None, false);
            }
            let element = projected.elements()[index_old].clone();
            (
                Some(PrimitiveChange::Move {
                    element,
                    index_old,
                    index_new,
                }),
                true,
            )
        })
    }

    /// Removes every element of `list`.
    pub fn list_clear(&mut self, list: InstanceId) -> Result<(), Error> {
        self.change_list(list, None, |projected| {
            if projected.is_empty() {
                return (None, ());
            }
            let elements = projected.elements().to_vec();
            (Some(PrimitiveChange::Clear { elements }), ())
        })
    }

    /// Sorts `list` with a comparator. The sort is stable.
    pub fn list_sort_by(
        &mut self,
        list: InstanceId,
        mut compare: impl FnMut(&Value, &Value) -> Ordering,
    ) -> Result<(), Error> {
        self.change_list(list, None, |projected| {
            let mut order = projected.elements().to_vec();
            order.sort_by(&mut compare);
            if order == projected.elements() {
                return (None, ());
            }
            (Some(PrimitiveChange::Sort { order }), ())
        })
    }

    /// Cancels the changes recorded against `target` in the current transaction.
    ///
    /// Does nothing when there is no current transaction.
    pub fn clear_changes(&mut self, target: InstanceId) -> Result<(), Error> {
        let Some(transaction) = self.tx.current() else {
            return Ok(());
        };
        let Store { instances, tx, .. } = self;
        tx.get_mut(transaction)
            .ok_or(TransactionError::Resolved(transaction))?
            .clear_changes(instances, target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComplexType, PropertyType, SimpleKind, ValueType};

    fn store() -> (Store, InstanceId, InstanceId) {
        let mut store = Store::default();
        store
            .register_type(
                ComplexType::builder("doc")
                    .property(PropertyType::new("title", ValueType::Simple(SimpleKind::String)))
                    .property(
                        PropertyType::new("id", ValueType::Simple(SimpleKind::Number)).read_only(),
                    )
                    .property(PropertyType::new(
                        "words",
                        ValueType::list(ValueType::Simple(SimpleKind::String)),
                    ))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let doc = store.create("doc").unwrap();
        let words = store.list_of(doc, "words").unwrap();
        (store, doc, words)
    }

    #[test]
    fn implicit_transactions_commit() {
        let (mut store, doc, words) = store();
        store.set(doc, "title", "hello").unwrap();
        assert_eq!(store.version(doc).unwrap(), 1);
        assert!(store.current_transaction().is_none());

        assert!(store.list_add(words, "a").unwrap());
        assert!(!store.list_add(words, "a").unwrap());
        assert_eq!(store.list_elements(words).unwrap(), &[Value::from("a")]);
        assert_eq!(store.version(words).unwrap(), 1);
    }

    #[test]
    fn argument_errors() {
        let (mut store, doc, words) = store();
        assert!(matches!(
            store.set(doc, "id", 3),
            Err(Error::ReadOnlyProperty { .. })
        ));
        assert!(matches!(
            store.set(doc, "words", "x"),
            Err(Error::ListProperty { .. })
        ));
        assert!(matches!(
            store.set(doc, "title", 3),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            store.list_add(words, true),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(
            store.set(InstanceId::from_raw(77), "title", "x").unwrap_err(),
            Error::ArgumentRequired("owner")
        );
        assert_eq!(store.version(doc).unwrap(), 0);
    }

    #[test]
    fn list_edits_in_one_transaction() {
        let (mut store, _, words) = store();
        let mut scope = store.begin();
        for word in ["c", "a", "b"] {
            scope.list_add(words, word).unwrap();
        }
        scope.list_sort_by(words, |a, b| a.as_str().cmp(&b.as_str())).unwrap();
        assert!(scope.list_move(words, &Value::from("c"), 0).unwrap());
        assert!(scope.list_insert(words, 1, "d").unwrap());
        assert_eq!(
            scope.list_remove_at(words, 2, 2).unwrap(),
            vec![Value::from("a"), Value::from("b")]
        );
        assert!(!scope.list_remove(words, &Value::from("z")).unwrap());
        let seen: Vec<_> = scope
            .list_elements(words)
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_owned())
            .collect();
        assert_eq!(seen, ["c", "d"]);
        scope.accept().unwrap();

        assert_eq!(store.list_elements(words).unwrap(), &[Value::from("c"), Value::from("d")]);
    }

    #[test]
    #[should_panic(expected = "should be <= len")]
    fn insert_out_of_bounds_panics() {
        let (mut store, _, words) = store();
        let _ = store.list_insert(words, 1, "a");
    }

    #[test]
    fn clear_changes_cancels() {
        let (mut store, doc, words) = store();
        store.list_add(words, "kept").unwrap();
        let mut scope = store.begin();
        scope.set(doc, "title", "draft").unwrap();
        scope.list_clear(words).unwrap();
        assert_eq!(scope.list_len(words).unwrap(), 0);

        scope.clear_changes(words).unwrap();
        assert_eq!(scope.list_len(words).unwrap(), 1);
        assert_eq!(scope.get(doc, "title").unwrap(), Some(Value::from("draft")));
        scope.accept().unwrap();
        assert_eq!(store.list_len(words).unwrap(), 1);
        assert_eq!(store.get(doc, "title").unwrap(), Some(Value::from("draft")));
    }
}
