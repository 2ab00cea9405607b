//! Lowered, store-native filter form.
//!
//! Lowering resolves every property to its index, folds constants, sorts
//! membership lists for binary search and prepares LIKE patterns. A store runs
//! the resulting `Filter` over its candidates during a full fetch.

use crate::error::{QueryError, Result};
use crate::expr::{CompareOp, PropertyRef};
use crate::predicate::Predicate;
use alloc::boxed::Box;
use alloc::vec::Vec;
use vellum_core::pattern_match::LikePattern;
use vellum_core::{Model, Value};

/// A lowered predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Compare {
        index: usize,
        op: CompareOp,
        value: Value,
    },
    Range {
        index: usize,
        low: Value,
        high: Value,
    },
    /// Sorted, deduplicated membership list.
    Membership {
        index: usize,
        values: Vec<Value>,
    },
    Pattern {
        index: usize,
        pattern: LikePattern,
    },
    Null {
        index: usize,
        negated: bool,
    },
    All(Vec<Filter>),
    Any(Vec<Filter>),
    Not(Box<Filter>),
    Constant(bool),
}

impl Filter {
    /// Lowers a predicate. Fails if any property was never resolved.
    pub fn lower(predicate: &Predicate) -> Result<Filter> {
        let filter = match predicate {
            Predicate::Compare { property, op, value } => Filter::Compare {
                index: index_of(property)?,
                op: *op,
                value: value.clone(),
            },
            Predicate::Between { property, low, high } => Filter::Range {
                index: index_of(property)?,
                low: low.clone(),
                high: high.clone(),
            },
            Predicate::In { property, values } => {
                let index = index_of(property)?;
                let mut values = values.clone();
                values.sort();
                values.dedup();
                match values.len() {
                    0 => Filter::Constant(false),
                    1 => Filter::Compare {
                        index,
                        op: CompareOp::Eq,
                        value: values.remove(0),
                    },
                    _ => Filter::Membership { index, values },
                }
            }
            Predicate::Like { property, pattern } => Filter::Pattern {
                index: index_of(property)?,
                pattern: LikePattern::new(pattern),
            },
            Predicate::IsNull(property) => Filter::Null {
                index: index_of(property)?,
                negated: false,
            },
            Predicate::IsNotNull(property) => Filter::Null {
                index: index_of(property)?,
                negated: true,
            },
            Predicate::And(parts) => {
                let mut lowered = Vec::with_capacity(parts.len());
                for part in parts {
                    match Filter::lower(part)? {
                        Filter::Constant(true) => {}
                        Filter::Constant(false) => return Ok(Filter::Constant(false)),
                        Filter::All(inner) => lowered.extend(inner),
                        other => lowered.push(other),
                    }
                }
                collapse(lowered, true)
            }
            Predicate::Or(parts) => {
                let mut lowered = Vec::with_capacity(parts.len());
                for part in parts {
                    match Filter::lower(part)? {
                        Filter::Constant(false) => {}
                        Filter::Constant(true) => return Ok(Filter::Constant(true)),
                        Filter::Any(inner) => lowered.extend(inner),
                        other => lowered.push(other),
                    }
                }
                collapse(lowered, false)
            }
            Predicate::Not(inner) => match Filter::lower(inner)? {
                Filter::Constant(b) => Filter::Constant(!b),
                Filter::Not(double) => *double,
                other => Filter::Not(Box::new(other)),
            },
            Predicate::Constant(b) => Filter::Constant(*b),
        };
        Ok(filter)
    }

    /// Tests one object.
    pub fn matches<T: Model>(&self, object: &T) -> bool {
        match self {
            Filter::Compare { index, op, value } => match object.field(*index) {
                Some(Value::Null) | None => false,
                Some(field) => op.apply(&field, value),
            },
            Filter::Range { index, low, high } => match object.field(*index) {
                Some(Value::Null) | None => false,
                Some(field) => &field >= low && &field <= high,
            },
            Filter::Membership { index, values } => match object.field(*index) {
                Some(Value::Null) | None => false,
                Some(field) => values.binary_search(&field).is_ok(),
            },
            Filter::Pattern { index, pattern } => match object.field(*index) {
                Some(Value::String(s)) => pattern.matches(&s),
                _ => false,
            },
            Filter::Null { index, negated } => {
                let is_null = object.field(*index).map_or(true, |v| v.is_null());
                is_null != *negated
            }
            Filter::All(parts) => parts.iter().all(|f| f.matches(object)),
            Filter::Any(parts) => parts.iter().any(|f| f.matches(object)),
            Filter::Not(inner) => !inner.matches(object),
            Filter::Constant(b) => *b,
        }
    }

    /// Filters a candidate iterator, keeping matches.
    pub fn apply<'a, T, I>(&'a self, candidates: I) -> impl Iterator<Item = T> + 'a
    where
        T: Model,
        I: IntoIterator<Item = T>,
        I::IntoIter: 'a,
    {
        candidates.into_iter().filter(move |o| self.matches(o))
    }
}

fn index_of(property: &PropertyRef) -> Result<usize> {
    property.index.ok_or_else(|| QueryError::Unlowerable {
        property: property.name.clone(),
    })
}

fn collapse(mut parts: Vec<Filter>, conjunction: bool) -> Filter {
    match parts.len() {
        0 => Filter::Constant(conjunction),
        1 => parts.remove(0),
        _ if conjunction => Filter::All(parts),
        _ => Filter::Any(parts),
    }
}
