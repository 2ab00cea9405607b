//! Property references, comparison operators and sort keys.

use alloc::string::String;
use core::cmp::Ordering;
use core::fmt;
use vellum_core::Value;

/// Reference to a property of a model.
///
/// Built from a name; the index is filled in when the owning query is built
/// against the model's schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    /// Property name.
    pub name: String,
    /// Property index in the entity schema, once resolved.
    pub index: Option<usize>,
}

impl PropertyRef {
    /// Creates an unresolved reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    /// Creates a reference with a known index.
    pub fn resolved(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }

    /// Returns true once the index is known.
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.index.is_some()
    }
}

impl From<&str> for PropertyRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Applies the operator to two non-null values.
    #[inline]
    pub fn apply(self, left: &Value, right: &Value) -> bool {
        match self {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            CompareOp::Lt => left.cmp(right) == Ordering::Less,
            CompareOp::Le => left.cmp(right) != Ordering::Greater,
            CompareOp::Gt => left.cmp(right) == Ordering::Greater,
            CompareOp::Ge => left.cmp(right) != Ordering::Less,
        }
    }

    /// Returns true for operators that need an ordered property type.
    #[inline]
    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Applies this direction to an ascending comparison.
    #[inline]
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// One key of a query's sort order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub property: PropertyRef,
    pub order: SortOrder,
}

impl SortKey {
    pub fn new(property: impl Into<PropertyRef>, order: SortOrder) -> Self {
        Self {
            property: property.into(),
            order,
        }
    }

    pub fn asc(property: impl Into<PropertyRef>) -> Self {
        Self::new(property, SortOrder::Asc)
    }

    pub fn desc(property: impl Into<PropertyRef>) -> Self {
        Self::new(property, SortOrder::Desc)
    }
}
