// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Type metadata for instances.
//!
//! A [`ComplexType`] describes the properties of a complex instance. Each
//! [`PropertyType`] has a [`ValueType`], and flags which the change machinery consults:
//!
//! - `is_boundary`: values held through the property are not reference tracked through
//!   it, and changes to them do not propagate to the container.
//! - `is_required`: [`Store::validate`](crate::Store::validate) reports a missing value.
//! - `is_read_only`: the property can only be given a value when the instance is
//!   created (or deserialized).
use crate::{HashMap, create_map};
use std::{fmt, sync::Arc};

/// The kinds of [`SimpleValue`](crate::SimpleValue)s a slot may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub enum SimpleKind {
    Any,
    Boolean,
    Number,
    String,
}

impl SimpleKind {
    /// Returns true if a value of kind `other` may be stored in a slot of this kind.
    pub fn accepts(self, other: SimpleKind) -> bool {
        self == SimpleKind::Any || self == other
    }
}

/// The type of the values held by a property or a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Simple(SimpleKind),
    /// A reference to a complex instance of the named type, or of any type for `None`.
    Complex(Option<String>),
    /// A list of elements, owned by the property holding it.
    List(Box<ValueType>),
}

impl ValueType {
    /// Shorthand for `ValueType::List(Box::new(element))`.
    pub fn list(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    /// Shorthand for a reference to a complex type with the given id.
    pub fn complex(type_id: impl Into<String>) -> Self {
        ValueType::Complex(Some(type_id.into()))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ValueType::List(_))
    }

    /// Returns the element type of a list type.
    pub fn element(&self) -> Option<&ValueType> {
        match self {
            ValueType::List(element) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Simple(kind) => write!(f, "{kind:?}"),
            ValueType::Complex(Some(id)) => write!(f, "{id}"),
            ValueType::Complex(None) => f.write_str("complex"),
            ValueType::List(element) => write!(f, "[{element}]"),
        }
    }
}

/// Error returned when building an invalid [`ComplexType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// A required argument was empty.
    ArgumentRequired(&'static str),
    /// Two properties share a name.
    DuplicateProperty { type_id: String, name: String },
    /// Lists may only hold simple or complex elements.
    NestedList { type_id: String, name: String },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::ArgumentRequired(name) => write!(f, "argument {name} is required"),
            TypeError::DuplicateProperty { type_id, name } => {
                write!(f, "property {name} is defined twice in type {type_id}")
            }
            TypeError::NestedList { type_id, name } => {
                write!(f, "property {name} of type {type_id} is a list of lists")
            }
        }
    }
}

impl std::error::Error for TypeError {}

/// Describes one property of a [`ComplexType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyType {
    name: String,
    index: usize,
    value_type: ValueType,
    is_boundary: bool,
    is_required: bool,
    is_read_only: bool,
}

impl PropertyType {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            index: 0,
            value_type,
            is_boundary: false,
            is_required: false,
            is_read_only: false,
        }
    }

    /// Marks the property as a boundary: held values are not reference tracked.
    pub fn boundary(mut self) -> Self {
        self.is_boundary = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.is_read_only = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The position of the property within its declaring type.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn is_list(&self) -> bool {
        self.value_type.is_list()
    }

    pub fn is_boundary(&self) -> bool {
        self.is_boundary
    }

    pub fn is_required(&self) -> bool {
        self.is_required
    }

    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }
}

/// Describes the properties of complex instances.
pub struct ComplexType {
    id: String,
    properties: Vec<PropertyType>,
    by_name: HashMap<String, usize>,
}

impl ComplexType {
    pub fn builder(id: impl Into<String>) -> ComplexTypeBuilder {
        ComplexTypeBuilder {
            id: id.into(),
            properties: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn properties(&self) -> &[PropertyType] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyType> {
        self.by_name.get(name).map(|&index| &self.properties[index])
    }

    /// Returns the property at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a property index of this type.
    pub fn property_at(&self, index: usize) -> &PropertyType {
        &self.properties[index]
    }
}

impl fmt::Debug for ComplexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplexType")
            .field("id", &self.id)
            .field("properties", &self.properties)
            .finish()
    }
}

impl PartialEq for ComplexType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.properties == other.properties
    }
}

/// Builder for [`ComplexType`], see [`ComplexType::builder`].
#[derive(Debug)]
pub struct ComplexTypeBuilder {
    id: String,
    properties: Vec<PropertyType>,
}

impl ComplexTypeBuilder {
    pub fn property(mut self, property: PropertyType) -> Self {
        self.properties.push(property);
        self
    }

    pub fn build(self) -> Result<Arc<ComplexType>, TypeError> {
        let Self { id, mut properties } = self;
        if id.is_empty() {
            return Err(TypeError::ArgumentRequired("id"));
        }

        let mut by_name = create_map();
        for (index, property) in properties.iter_mut().enumerate() {
            if property.name.is_empty() {
                return Err(TypeError::ArgumentRequired("name"));
            }
            if property
                .value_type
                .element()
                .is_some_and(ValueType::is_list)
            {
                return Err(TypeError::NestedList {
                    type_id: id,
                    name: property.name.clone(),
                });
            }
            property.index = index;
            if by_name.insert(property.name.clone(), index).is_some() {
                return Err(TypeError::DuplicateProperty {
                    type_id: id,
                    name: property.name.clone(),
                });
            }
        }

        Ok(Arc::new(ComplexType {
            id,
            properties,
            by_name,
        }))
    }
}
