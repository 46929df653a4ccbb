// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Instance graphs as JSON.
//!
//! A complex instance is written as an object holding its type id under `"_"`, the id
//! given to it by the ambient [`SpecificationContext`] under `"$id"`, and one entry per
//! property. Unset properties are `null`, lists are arrays. Once written, an instance
//! is written again only as `{"$ref": id}`, which makes shared and cyclic references
//! round trip. A simple value with a formatted representation is written as
//! `{"v": value, "f": formatted}`.
use super::{SpecError, SpecificationContext, SpecificationScope};
use crate::{
    InstanceId, Simple, SimpleValue, Store, Value,
    error::Error,
    store::Access,
    types::{SimpleKind, ValueType},
};
use serde_json::{Map, Value as Json};
use std::{cell::RefCell, rc::Rc};

const TYPE_KEY: &str = "_";
const ID_KEY: &str = "$id";
const REF_KEY: &str = "$ref";

fn shape(json: &Json) -> String {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
    .to_owned()
}

fn unexpected(expected: &ValueType, json: &Json) -> Error {
    SpecError::UnexpectedShape {
        expected: expected.to_string(),
        found: shape(json),
    }
    .into()
}

impl Store {
    /// Writes the instance graph rooted at `root`.
    ///
    /// Ids are assigned by the ambient [`SpecificationContext`], so instances written by
    /// earlier calls within the same [`SpecificationScope`] are only referred to.
    pub fn to_spec(&self, root: InstanceId) -> Result<Json, Error> {
        let scope = SpecificationScope::new();
        self.write_instance(root, scope.context())
    }

    fn write_instance(
        &self,
        id: InstanceId,
        context: &Rc<RefCell<SpecificationContext>>,
    ) -> Result<Json, Error> {
        if self.is_list(id) {
            return self
                .list_elements(id)?
                .iter()
                .map(|element| self.write_value(element, context))
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array);
        }
        if let Some(existing) = context.borrow().id_of(id) {
            let mut object = Map::new();
            object.insert(REF_KEY.to_owned(), Json::String(existing.to_owned()));
            return Ok(Json::Object(object));
        }

        let ty = self.type_of(id)?;
        let mut object = Map::new();
        object.insert(TYPE_KEY.to_owned(), Json::String(ty.id().to_owned()));
        let spec_id = context.borrow_mut().add(id);
        object.insert(ID_KEY.to_owned(), Json::String(spec_id));
        for property in ty.properties() {
            let value = match self.get(id, property.name())? {
                Some(value) => self.write_value(&value, context)?,
                None => Json::Null,
            };
            object.insert(property.name().to_owned(), value);
        }
        Ok(Json::Object(object))
    }

    fn write_value(
        &self,
        value: &Value,
        context: &Rc<RefCell<SpecificationContext>>,
    ) -> Result<Json, Error> {
        let simple = match value {
            Value::Ref(id) => return self.write_instance(*id, context),
            Value::Simple(simple) => simple,
        };
        let json = match simple.value() {
            SimpleValue::Boolean(b) => Json::Bool(*b),
            SimpleValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .ok_or(SpecError::NonFiniteNumber)?,
            SimpleValue::String(s) => Json::String(s.clone()),
        };
        Ok(match simple.formatted() {
            Some(formatted) => {
                let mut object = Map::new();
                object.insert("v".to_owned(), json);
                object.insert("f".to_owned(), Json::String(formatted.to_owned()));
                Json::Object(object)
            }
            None => json,
        })
    }

    /// Reads an instance graph written by [`Store::to_spec`], returning its root.
    ///
    /// New instances are created for every `$id`; `$ref`s resolve through the ambient
    /// [`SpecificationContext`]. The property values are assigned in the current
    /// transaction, or in a new one committed before this returns. Read-only properties
    /// may be given values.
    pub fn from_spec(&mut self, spec: &Json) -> Result<InstanceId, Error> {
        let scope = SpecificationScope::new();
        let mut changes = self.enter_change();
        let expected = ValueType::Complex(None);
        let root = changes.read_instance(spec, &expected, scope.context())?;
        if changes.is_root() {
            changes.accept()?;
        }
        Ok(root)
    }

    fn read_instance(
        &mut self,
        json: &Json,
        expected: &ValueType,
        context: &Rc<RefCell<SpecificationContext>>,
    ) -> Result<InstanceId, Error> {
        let object = json.as_object().ok_or_else(|| unexpected(expected, json))?;
        if let Some(reference) = object.get(REF_KEY) {
            let reference = reference
                .as_str()
                .ok_or_else(|| unexpected(&ValueType::Simple(SimpleKind::String), reference))?;
            return context
                .borrow()
                .get(reference)
                .ok_or_else(|| SpecError::UnknownReference(reference.to_owned()).into());
        }

        let type_id = match (object.get(TYPE_KEY), expected) {
            (Some(Json::String(type_id)), _) => type_id.clone(),
            (Some(other), _) => {
                return Err(unexpected(&ValueType::Simple(SimpleKind::String), other));
            }
            (None, ValueType::Complex(Some(type_id))) => type_id.clone(),
            (None, _) => return Err(SpecError::MissingType.into()),
        };
        let id = self.create(&type_id)?;
        match object.get(ID_KEY) {
            Some(Json::String(spec_id)) => context.borrow_mut().register(spec_id, id)?,
            Some(other) => {
                return Err(unexpected(&ValueType::Simple(SimpleKind::String), other));
            }
            None => {
                context.borrow_mut().add(id);
            }
        }

        let ty = std::sync::Arc::clone(self.type_of(id)?);
        if let Some(unknown) = object
            .keys()
            .find(|key| *key != TYPE_KEY && *key != ID_KEY && ty.property(key).is_none())
        {
            return Err(Error::unknown_property(&ty, unknown));
        }
        // declaration order, which is the order ids were assigned in when writing
        for property in ty.properties() {
            let key = property.name();
            let Some(json) = object.get(key) else {
                continue;
            };
            match property.value_type() {
                ValueType::List(element) => {
                    if json.is_null() {
                        continue;
                    }
                    let items = json
                        .as_array()
                        .ok_or_else(|| unexpected(property.value_type(), json))?;
                    let list = self.list_of(id, key)?;
                    for item in items {
                        if let Some(value) = self.read_value(item, element, context)? {
                            self.list_add(list, value)?;
                        }
                    }
                }
                value_type => {
                    let value = self.read_value(json, value_type, context)?;
                    if value.is_some() {
                        self.assign(id, key, value, Access::Initialize)?;
                    }
                }
            }
        }
        Ok(id)
    }

    fn read_value(
        &mut self,
        json: &Json,
        expected: &ValueType,
        context: &Rc<RefCell<SpecificationContext>>,
    ) -> Result<Option<Value>, Error> {
        if json.is_null() {
            return Ok(None);
        }
        let kind = match expected {
            ValueType::Simple(kind) => *kind,
            ValueType::Complex(_) => {
                return self
                    .read_instance(json, expected, context)
                    .map(|id| Some(Value::Ref(id)));
            }
            ValueType::List(_) => return Err(unexpected(expected, json)),
        };

        let (json, formatted) = match json.as_object() {
            Some(object) => {
                let value = object.get("v").ok_or_else(|| unexpected(expected, json))?;
                let formatted = object.get("f").and_then(Json::as_str);
                (value, formatted)
            }
            None => (json, None),
        };
        let value = match json {
            Json::Bool(b) => SimpleValue::Boolean(*b),
            Json::Number(n) => SimpleValue::Number(n.as_f64().ok_or(SpecError::NonFiniteNumber)?),
            Json::String(s) => SimpleValue::String(s.clone()),
            _ => return Err(unexpected(expected, json)),
        };
        if !kind.accepts(value.kind()) {
            return Err(unexpected(expected, json));
        }
        let simple = match formatted {
            Some(formatted) => Simple::new(value).with_formatted(formatted),
            None => Simple::new(value),
        };
        Ok(Some(Value::Simple(simple)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComplexType, PropertyType};
    use serde_json::json;

    fn store() -> Store {
        let mut store = Store::default();
        store
            .register_type(
                ComplexType::builder("person")
                    .property(PropertyType::new("name", ValueType::Simple(SimpleKind::String)))
                    .property(PropertyType::new("age", ValueType::Simple(SimpleKind::Number)))
                    .property(PropertyType::new("friend", ValueType::complex("person")))
                    .property(PropertyType::new(
                        "pets",
                        ValueType::list(ValueType::Simple(SimpleKind::String)),
                    ))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        store
    }

    #[test]
    fn writes_cycles_once() {
        let mut store = store();
        let a = store.create("person").unwrap();
        let b = store.create("person").unwrap();
        store.set(a, "name", "Ann").unwrap();
        store.set(a, "friend", b).unwrap();
        store.set(b, "friend", a).unwrap();
        let pets = store.list_of(b, "pets").unwrap();
        store.list_add(pets, "cat").unwrap();

        let spec = store.to_spec(a).unwrap();
        assert_eq!(
            spec,
            json!({
                "_": "person",
                "$id": "1",
                "name": "Ann",
                "age": null,
                "friend": {
                    "_": "person",
                    "$id": "2",
                    "name": null,
                    "age": null,
                    "friend": {"$ref": "1"},
                    "pets": ["cat"]
                },
                "pets": []
            })
        );
    }

    #[test]
    fn reads_what_it_writes() {
        let mut store = store();
        let spec = json!({
            "_": "person",
            "$id": "me",
            "name": {"v": "Bo", "f": "Mr. Bo"},
            "age": 40,
            "friend": {"$ref": "me"},
            "pets": ["dog", "fish"]
        });
        let root = store.from_spec(&spec).unwrap();
        assert_eq!(store.get(root, "friend").unwrap(), Some(Value::Ref(root)));
        assert_eq!(store.get(root, "age").unwrap(), Some(Value::from(40)));
        let name = store.get(root, "name").unwrap().unwrap();
        assert_eq!(name.to_string(), "Mr. Bo");
        let pets = store.list_of(root, "pets").unwrap();
        assert_eq!(store.list_len(pets).unwrap(), 2);
        // the cycle registered a reference to itself
        assert!(store.references(root).unwrap().contains(root, Some(2)));
    }

    #[test]
    fn rejects_bad_shapes() {
        let mut store = store();
        assert_eq!(
            store.from_spec(&json!({"name": "x"})).unwrap_err(),
            Error::Spec(SpecError::MissingType)
        );
        assert_eq!(
            store
                .from_spec(&json!({"_": "person", "friend": {"$ref": "nobody"}}))
                .unwrap_err(),
            Error::Spec(SpecError::UnknownReference("nobody".to_owned()))
        );
        assert!(matches!(
            store.from_spec(&json!({"_": "person", "age": "old"})),
            Err(Error::Spec(SpecError::UnexpectedShape { .. }))
        ));
    }
}
