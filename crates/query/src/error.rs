//! Error types for query construction and lowering.

use alloc::string::String;
use thiserror::Error;
use vellum_core::DataType;

/// Result type alias for query operations.
pub type Result<T> = core::result::Result<T, QueryError>;

/// Configuration errors of a query.
///
/// These are raised when a query is built, never during reconciliation: a
/// query that builds successfully evaluates totally over its model type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A property name does not exist in the entity schema.
    #[error("Property {property} not found in entity {entity}")]
    UnknownProperty { entity: String, property: String },

    /// A query was built without any sort key.
    #[error("Query must have at least one sort key")]
    EmptySort,

    /// A literal or operator does not fit the property type.
    #[error("Type mismatch on {property}: {message}")]
    TypeMismatch { property: String, message: String },

    /// A BETWEEN range has its bounds reversed.
    #[error("Invalid range on {property}: lower bound exceeds upper bound")]
    InvalidRange { property: String },

    /// A non-empty projection leaves out a sort key.
    #[error("Projection does not include sort key {property}")]
    ProjectionMissingSortKey { property: String },

    /// A property whose type has no meaningful order was used as a sort key.
    #[error("Property {property} of type {data_type:?} cannot be used as a sort key")]
    UnsortableProperty { property: String, data_type: DataType },

    /// A predicate references a property that was never resolved.
    #[error("Predicate cannot be lowered: property {property} is unresolved")]
    Unlowerable { property: String },
}

impl QueryError {
    /// Creates an unknown property error.
    pub fn unknown_property(entity: impl Into<String>, property: impl Into<String>) -> Self {
        QueryError::UnknownProperty {
            entity: entity.into(),
            property: property.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(property: impl Into<String>, message: impl Into<String>) -> Self {
        QueryError::TypeMismatch {
            property: property.into(),
            message: message.into(),
        }
    }
}
