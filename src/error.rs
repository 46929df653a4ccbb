// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! The error type of the crate.
use crate::{
    InstanceId,
    specification::SpecError,
    transaction::TransactionError,
    types::{ComplexType, TypeError},
};
use std::fmt;

/// Errors returned by [`Store`](crate::Store) operations.
///
/// Programming errors, like positions outside of a list, panic instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A required argument is missing, e.g. the owner of a changeset.
    ArgumentRequired(&'static str),
    InstanceNotFound(InstanceId),
    UnknownType(String),
    /// Another type is registered under the same id.
    DuplicateType(String),
    UnknownProperty { type_id: String, name: String },
    ReadOnlyProperty { type_id: String, name: String },
    /// List-valued properties own their list, which is changed through the list
    /// operations.
    ListProperty { type_id: String, name: String },
    /// A list operation was given a property that is not list-valued.
    NotAListProperty { type_id: String, name: String },
    MissingRequired { type_id: String, name: String },
    NotAList(InstanceId),
    NotAComplex(InstanceId),
    TypeMismatch { expected: String, found: String },
    Type(TypeError),
    Transaction(TransactionError),
    Spec(SpecError),
}

impl Error {
    pub(crate) fn unknown_property(ty: &ComplexType, name: &str) -> Self {
        Error::UnknownProperty {
            type_id: ty.id().to_owned(),
            name: name.to_owned(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ArgumentRequired(name) => write!(f, "argument {name} is required"),
            Error::InstanceNotFound(id) => write!(f, "no instance {id}"),
            Error::UnknownType(id) => write!(f, "unknown type {id}"),
            Error::DuplicateType(id) => write!(f, "another type is registered as {id}"),
            Error::UnknownProperty { type_id, name } => {
                write!(f, "type {type_id} has no property {name}")
            }
            Error::ReadOnlyProperty { type_id, name } => {
                write!(f, "property {name} of type {type_id} is read-only")
            }
            Error::ListProperty { type_id, name } => {
                write!(f, "property {name} of type {type_id} holds a list and cannot be assigned")
            }
            Error::NotAListProperty { type_id, name } => {
                write!(f, "property {name} of type {type_id} does not hold a list")
            }
            Error::MissingRequired { type_id, name } => {
                write!(f, "required property {name} of type {type_id} has no value")
            }
            Error::NotAList(id) => write!(f, "{id} is not a list"),
            Error::NotAComplex(id) => write!(f, "{id} is not a complex instance"),
            Error::TypeMismatch { expected, found } => {
                write!(f, "expected a value of type {expected}, found {found}")
            }
            Error::Type(e) => write!(f, "invalid type: {e}"),
            Error::Transaction(e) => write!(f, "{e}"),
            Error::Spec(e) => write!(f, "invalid specification: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Type(e) => Some(e),
            Error::Transaction(e) => Some(e),
            Error::Spec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TypeError> for Error {
    fn from(e: TypeError) -> Self {
        Error::Type(e)
    }
}

impl From<TransactionError> for Error {
    fn from(e: TransactionError) -> Self {
        Error::Transaction(e)
    }
}

impl From<SpecError> for Error {
    fn from(e: SpecError) -> Self {
        Error::Spec(e)
    }
}
