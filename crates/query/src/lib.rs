//! Vellum Query - Query descriptions for the Vellum live-query engine.
//!
//! This crate describes *what* a live result contains:
//!
//! - `Query`: predicate + sort order + projection, validated against a model schema
//! - `Predicate`: comparable filter tree evaluated in memory
//! - `Filter`: the predicate lowered into the form a store pushes down into a fetch
//! - `sort`: deterministic multi-key ordering with identity tie-break
//!
//! # Example
//!
//! ```ignore
//! use vellum_query::{Predicate, Query};
//!
//! let query = Query::<Task>::builder()
//!     .filter(Predicate::gt("priority", 1i64))
//!     .descending("priority")
//!     .build()?;
//!
//! assert!(query.matches(&urgent_task));
//! let filter = query.predicate().unwrap().lower()?; // store-native form
//! ```

#![no_std]

extern crate alloc;

mod error;
pub mod expr;
pub mod filter;
pub mod predicate;
mod query;
pub mod sort;

pub use error::{QueryError, Result};
pub use expr::{CompareOp, PropertyRef, SortKey, SortOrder};
pub use filter::Filter;
pub use predicate::Predicate;
pub use query::{Query, QueryBuilder};
