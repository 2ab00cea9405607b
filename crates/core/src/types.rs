//! Data type definitions for Vellum.
//!
//! This module defines the property types a model can expose to queries.

/// Supported property types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 string
    String,
    /// Date and time stored as Unix timestamp (milliseconds)
    DateTime,
    /// Binary data
    Bytes,
}

impl DataType {
    /// Returns whether this type is nullable by default.
    pub fn is_nullable_by_default(&self) -> bool {
        matches!(self, DataType::Bytes)
    }

    /// Returns whether values of this type can be used as a sort key.
    pub fn is_sortable(&self) -> bool {
        !matches!(self, DataType::Bytes)
    }

    /// Returns whether values of this type support ordering comparisons
    /// (`<`, `<=`, `>`, `>=`, `BETWEEN`).
    pub fn is_ordered(&self) -> bool {
        !matches!(self, DataType::Bytes | DataType::Boolean)
    }
}
