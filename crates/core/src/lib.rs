//! Vellum Core - Core types for the Vellum live-query engine.
//!
//! This crate provides the foundational types shared by queries, stores and
//! live result controllers:
//!
//! - `DataType`: Supported property types (Boolean, Int64, Float64, String, DateTime, Bytes)
//! - `Value`: Runtime property values with a total order
//! - `ObjectId`: Stable identity of a stored object
//! - `Model`: Trait implemented by every queryable type
//! - `EntitySchema`: Queryable property definitions of a model
//! - `Error`: Error types for schema definitions
//!
//! # Example
//!
//! ```rust
//! use vellum_core::{DataType, EntitySchema, Model, ObjectId, Value};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Task {
//!     id: ObjectId,
//!     priority: i64,
//! }
//!
//! impl Model for Task {
//!     fn schema() -> EntitySchema {
//!         EntitySchema::new("Task", vec![vellum_core::Property::new("priority", DataType::Int64)])
//!     }
//!
//!     fn id(&self) -> ObjectId {
//!         self.id
//!     }
//!
//!     fn field(&self, index: usize) -> Option<Value> {
//!         match index {
//!             0 => Some(Value::Int64(self.priority)),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! let task = Task { id: ObjectId::new(1), priority: 3 };
//! assert_eq!(task.field(0), Some(Value::Int64(3)));
//! assert_eq!(Task::schema().index_of("priority"), Some(0));
//! ```

#![no_std]

extern crate alloc;

mod error;
mod object;
pub mod pattern_match;
mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use object::{next_object_id, reserve_object_id, Model, ObjectId};
pub use schema::{EntitySchema, EntitySchemaBuilder, Property};
pub use types::DataType;
pub use value::Value;
