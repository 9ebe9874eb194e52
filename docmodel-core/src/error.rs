//! Error types and result types for schema, mapping and collection operations.
//!
//! Every fallible operation in this crate returns [`DocModelResult<T>`]. The variants of
//! [`DocModelError`] fall into a handful of families:
//!
//! - **Declaration errors** raised while classes are being described (duplicate type
//!   registration, conflicting schema styles, malformed indexes).
//! - **Configuration errors** raised on first use (no database, not connected).
//! - **Validation errors** raised while validating, serializing or deserializing a value.
//! - **Lookup errors** for unknown types, unbound classes and missing relations.
//! - **Driver errors** passed through verbatim from the storage backend.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur while mapping documents.
///
/// The type is `Clone` so that a single failure (for example a failed connection attempt)
/// can be reported to every task that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocModelError {
    /// A type handler with the given name is already registered.
    #[error("type:{0} already exists")]
    DuplicateType(String),
    /// No type handler is registered under the given name.
    #[error("Unknown type: {0}")]
    UnknownType(String),
    /// A class was declared with both the field-based and the custom schema style.
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),
    /// An index declaration is malformed.
    #[error("Invalid index: {0}")]
    InvalidIndex(String),
    /// Any other problem with a class declaration.
    #[error("Declaration error: {0}")]
    Declaration(String),
    /// The data source is misconfigured for the requested operation.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A query surface was requested before `connect` while auto-connect is disabled.
    #[error("Data source is not connected")]
    NotConnected,
    /// Establishing the connection failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// A value does not satisfy its schema.
    #[error("{0}")]
    Validation(String),
    /// The class has not been bound to a collection.
    #[error("class {0} has not been bound to a collection")]
    NotACollection(String),
    /// A relation could not be resolved.
    #[error("Relation error: {0}")]
    Relation(String),
    /// Conversion between Rust values and BSON failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// An error reported by the storage backend, passed through unchanged.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocModelError {
    /// Shorthand for building a [`DocModelError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        DocModelError::Validation(message.into())
    }

    /// Prefixes the message of a validation error with a location, leaving other
    /// variants untouched.
    pub(crate) fn at(self, prefix: impl AsRef<str>, separator: &str) -> Self {
        match self {
            DocModelError::Validation(message) => {
                DocModelError::Validation(format!("{}{}{}", prefix.as_ref(), separator, message))
            }
            other => other,
        }
    }

    /// Returns `true` for validation failures (recoverable, caller-facing).
    pub fn is_validation(&self) -> bool {
        matches!(self, DocModelError::Validation(_))
    }
}

/// A specialized `Result` type for document mapping operations.
pub type DocModelResult<T> = Result<T, DocModelError>;

impl From<BsonError> for DocModelError {
    fn from(err: BsonError) -> Self {
        DocModelError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocModelError {
    fn from(err: SerdeJsonError) -> Self {
        DocModelError::Serialization(err.to_string())
    }
}
