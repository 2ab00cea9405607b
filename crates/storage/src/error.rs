//! Error types for the memory store.

use alloc::string::String;
use thiserror::Error;
use vellum_core::ObjectId;

/// Result type alias for store mutations.
pub type Result<T> = core::result::Result<T, StoreError>;

/// Errors raised by store mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The model type was never registered with the store.
    #[error("Entity {entity} is not registered")]
    TypeNotRegistered { entity: String },

    /// An insert reused an identity that is already stored.
    #[error("Duplicate object {id} in entity {entity}")]
    DuplicateId { entity: String, id: ObjectId },

    /// An update or delete named an identity that is not stored.
    #[error("Object {id} not found in entity {entity}")]
    NotFound { entity: String, id: ObjectId },
}
