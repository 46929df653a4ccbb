// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Values held by properties and list elements.
//!
//! A [`Value`] is either a [`Simple`] value, which is immutable and compared by content,
//! or a reference to an instance living in a [`Store`](crate::Store). Every value has a
//! [`Key`] which identifies it inside a list: lists never hold two elements with the
//! same key.
use crate::{InstanceId, types::SimpleKind};
use std::{cell::OnceCell, fmt};

/// The primitive content of a [`Simple`] value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum SimpleValue {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl SimpleValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> SimpleKind {
        match self {
            SimpleValue::Boolean(_) => SimpleKind::Boolean,
            SimpleValue::Number(_) => SimpleKind::Number,
            SimpleValue::String(_) => SimpleKind::String,
        }
    }

    fn to_key_string(&self) -> String {
        match self {
            SimpleValue::Boolean(b) => b.to_string(),
            SimpleValue::Number(n) => n.to_string(),
            SimpleValue::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for SimpleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimpleValue::Boolean(b) => write!(f, "{b}"),
            SimpleValue::Number(n) => write!(f, "{n}"),
            SimpleValue::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// An immutable primitive value with an optional formatted representation.
///
/// The key of a simple value is derived from its content the first time it is asked
/// for, and cached afterwards.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(from = "SimpleValue", into = "SimpleValue"))]
pub struct Simple {
    value: SimpleValue,
    formatted: Option<String>,
    key: OnceCell<String>,
}

impl Simple {
    pub fn new(value: SimpleValue) -> Self {
        Self {
            value,
            formatted: None,
            key: OnceCell::new(),
        }
    }

    /// Attaches a human readable representation, used by [`Simple::label`].
    pub fn with_formatted(mut self, formatted: impl Into<String>) -> Self {
        self.formatted = Some(formatted.into());
        self
    }

    pub fn value(&self) -> &SimpleValue {
        &self.value
    }

    pub fn formatted(&self) -> Option<&str> {
        self.formatted.as_deref()
    }

    /// Returns the key of this value, computing it on first access.
    pub fn key(&self) -> &str {
        self.key.get_or_init(|| self.value.to_key_string())
    }

    /// Returns the formatted representation, or the key when there is none.
    pub fn label(&self) -> &str {
        match &self.formatted {
            Some(formatted) => formatted,
            None => self.key(),
        }
    }
}

impl PartialEq for Simple {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.formatted == other.formatted
    }
}

impl fmt::Debug for Simple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.formatted {
            Some(formatted) => write!(f, "{:?} ({formatted:?})", self.value),
            None => write!(f, "{:?}", self.value),
        }
    }
}

impl From<SimpleValue> for Simple {
    fn from(value: SimpleValue) -> Self {
        Simple::new(value)
    }
}

impl From<Simple> for SimpleValue {
    fn from(simple: Simple) -> Self {
        simple.value
    }
}

/// Identifies a value inside a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Key {
    Simple(String),
    Instance(InstanceId),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Simple(key) => f.write_str(key),
            Key::Instance(id) => write!(f, "{id}"),
        }
    }
}

/// A value held by a property slot or a list element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum Value {
    Simple(Simple),
    Ref(InstanceId),
}

impl Value {
    pub fn key(&self) -> Key {
        match self {
            Value::Simple(simple) => Key::Simple(simple.key().to_owned()),
            Value::Ref(id) => Key::Instance(*id),
        }
    }

    /// Returns the referenced instance, if this is a reference.
    pub fn instance(&self) -> Option<InstanceId> {
        match self {
            Value::Ref(id) => Some(*id),
            Value::Simple(_) => None,
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleValue> {
        match self {
            Value::Simple(simple) => Some(simple.value()),
            Value::Ref(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.as_simple()? {
            SimpleValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.as_simple()? {
            SimpleValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.as_simple()? {
            SimpleValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Simple(simple) => f.write_str(simple.label()),
            Value::Ref(id) => write!(f, "{id}"),
        }
    }
}

impl From<SimpleValue> for Value {
    fn from(value: SimpleValue) -> Self {
        Value::Simple(Simple::new(value))
    }
}

impl From<Simple> for Value {
    fn from(value: Simple) -> Self {
        Value::Simple(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        SimpleValue::Boolean(value).into()
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        SimpleValue::Number(value).into()
    }
}

// i32 because it's the "default" inference integer type
impl From<i32> for Value {
    fn from(value: i32) -> Self {
        SimpleValue::Number(f64::from(value)).into()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        SimpleValue::String(value.to_owned()).into()
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        SimpleValue::String(value).into()
    }
}

impl From<InstanceId> for Value {
    fn from(id: InstanceId) -> Self {
        Value::Ref(id)
    }
}

#[cfg(any(test, feature = "arbitrary"))]
impl quickcheck::Arbitrary for SimpleValue {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        match u8::arbitrary(g) % 3 {
            0 => SimpleValue::Boolean(bool::arbitrary(g)),
            // small integral numbers keep keys readable and avoid NaN
            1 => SimpleValue::Number(f64::from(i16::arbitrary(g))),
            _ => SimpleValue::String(String::arbitrary(g)),
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        match self {
            SimpleValue::Boolean(b) => Box::new(b.shrink().map(SimpleValue::Boolean)),
            SimpleValue::Number(n) => Box::new(
                (*n as i16)
                    .shrink()
                    .map(|n| SimpleValue::Number(f64::from(n))),
            ),
            SimpleValue::String(s) => Box::new(s.shrink().map(SimpleValue::String)),
        }
    }
}

#[cfg(any(test, feature = "arbitrary"))]
impl quickcheck::Arbitrary for Value {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Value::from(SimpleValue::arbitrary(g))
    }
}
