//! Error types for Vellum core definitions.

use alloc::string::String;
use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised while defining entity schemas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A property name appears twice in one schema.
    #[error("Duplicate property {property} in entity {entity}")]
    DuplicateProperty { entity: String, property: String },

    /// A schema was built without any properties.
    #[error("Entity {entity} has no properties")]
    EmptySchema { entity: String },
}

impl Error {
    /// Creates a duplicate property error.
    pub fn duplicate_property(entity: impl Into<String>, property: impl Into<String>) -> Self {
        Error::DuplicateProperty {
            entity: entity.into(),
            property: property.into(),
        }
    }

    /// Creates an empty schema error.
    pub fn empty_schema(entity: impl Into<String>) -> Self {
        Error::EmptySchema {
            entity: entity.into(),
        }
    }
}
