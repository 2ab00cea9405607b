//! Predicate expression trees.
//!
//! A `Predicate` is a first-class, comparable description of a filter. It has
//! two evaluation forms that must agree on every object:
//!
//! - [`Predicate::eval`] walks the tree against one in-memory object; the
//!   reconciler uses it for inserted and updated objects.
//! - [`Predicate::lower`] produces a [`Filter`] that a store pushes down into
//!   its full fetch.
//!
//! Null semantics are shared by both forms: every comparison, range,
//! membership and pattern test against a `Null` field is false. Only
//! `IsNull`/`IsNotNull` observe nullness, and `Not` negates its operand's
//! result as a plain boolean.

use crate::error::{QueryError, Result};
use crate::expr::{CompareOp, PropertyRef};
use crate::filter::Filter;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use vellum_core::pattern_match::like;
use vellum_core::{EntitySchema, Model, Value};

/// A filter over objects of one model type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Predicate {
    /// `property <op> value`
    Compare {
        property: PropertyRef,
        op: CompareOp,
        value: Value,
    },
    /// `low <= property <= high`
    Between {
        property: PropertyRef,
        low: Value,
        high: Value,
    },
    /// `property IN (values)`
    In {
        property: PropertyRef,
        values: Vec<Value>,
    },
    /// `property LIKE pattern`
    Like {
        property: PropertyRef,
        pattern: String,
    },
    IsNull(PropertyRef),
    IsNotNull(PropertyRef),
    /// Conjunction; empty is true.
    And(Vec<Predicate>),
    /// Disjunction; empty is false.
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Constant(bool),
}

impl Predicate {
    fn compare(property: impl Into<PropertyRef>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(property: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Eq, value)
    }

    pub fn ne(property: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Ne, value)
    }

    pub fn lt(property: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Lt, value)
    }

    pub fn le(property: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Le, value)
    }

    pub fn gt(property: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Gt, value)
    }

    pub fn ge(property: impl Into<PropertyRef>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Ge, value)
    }

    pub fn between(
        property: impl Into<PropertyRef>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Predicate::Between {
            property: property.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn in_list<V: Into<Value>>(
        property: impl Into<PropertyRef>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::In {
            property: property.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn like(property: impl Into<PropertyRef>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            property: property.into(),
            pattern: pattern.into(),
        }
    }

    pub fn is_null(property: impl Into<PropertyRef>) -> Self {
        Predicate::IsNull(property.into())
    }

    pub fn is_not_null(property: impl Into<PropertyRef>) -> Self {
        Predicate::IsNotNull(property.into())
    }

    /// Conjunction of all predicates.
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(predicates.into_iter().collect())
    }

    /// Disjunction of all predicates.
    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(predicates.into_iter().collect())
    }

    /// `self AND other`, flattening nested conjunctions.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(alloc::vec![first, other]),
        }
    }

    /// `self OR other`, flattening nested disjunctions.
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut parts) => {
                parts.push(other);
                Predicate::Or(parts)
            }
            first => Predicate::Or(alloc::vec![first, other]),
        }
    }

    /// Evaluates the predicate against one in-memory object.
    ///
    /// Total for any predicate that was resolved against `T::schema()`; an
    /// unresolved property reads as `Null`.
    pub fn eval<T: Model>(&self, object: &T) -> bool {
        match self {
            Predicate::Compare { property, op, value } => {
                match read(object, property) {
                    Value::Null => false,
                    field => op.apply(&field, value),
                }
            }
            Predicate::Between { property, low, high } => match read(object, property) {
                Value::Null => false,
                field => &field >= low && &field <= high,
            },
            Predicate::In { property, values } => match read(object, property) {
                Value::Null => false,
                field => values.contains(&field),
            },
            Predicate::Like { property, pattern } => match read(object, property) {
                Value::String(s) => like(&s, pattern),
                _ => false,
            },
            Predicate::IsNull(property) => read(object, property).is_null(),
            Predicate::IsNotNull(property) => !read(object, property).is_null(),
            Predicate::And(parts) => parts.iter().all(|p| p.eval(object)),
            Predicate::Or(parts) => parts.iter().any(|p| p.eval(object)),
            Predicate::Not(inner) => !inner.eval(object),
            Predicate::Constant(b) => *b,
        }
    }

    /// Lowers the predicate into the store-native filter form.
    pub fn lower(&self) -> Result<Filter> {
        Filter::lower(self)
    }

    /// Returns every property referenced by this predicate.
    pub fn properties(&self) -> Vec<&PropertyRef> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a PropertyRef>) {
        match self {
            Predicate::Compare { property, .. }
            | Predicate::Between { property, .. }
            | Predicate::In { property, .. }
            | Predicate::Like { property, .. }
            | Predicate::IsNull(property)
            | Predicate::IsNotNull(property) => out.push(property),
            Predicate::And(parts) | Predicate::Or(parts) => {
                for p in parts {
                    p.collect_properties(out);
                }
            }
            Predicate::Not(inner) => inner.collect_properties(out),
            Predicate::Constant(_) => {}
        }
    }

    /// Resolves property names against `schema` and checks that every
    /// literal and operator fits the property it is applied to.
    pub fn resolve(&mut self, schema: &EntitySchema) -> Result<()> {
        match self {
            Predicate::Compare { property, op, value } => {
                let dt = resolve_property(property, schema)?;
                check_literal(property, value, dt)?;
                if op.is_ordering() && !dt.is_ordered() {
                    return Err(QueryError::type_mismatch(
                        &property.name,
                        format!("operator {} is not defined for {:?}", op.symbol(), dt),
                    ));
                }
                Ok(())
            }
            Predicate::Between { property, low, high } => {
                let dt = resolve_property(property, schema)?;
                if !dt.is_ordered() {
                    return Err(QueryError::type_mismatch(
                        &property.name,
                        format!("BETWEEN is not defined for {:?}", dt),
                    ));
                }
                check_literal(property, low, dt)?;
                check_literal(property, high, dt)?;
                if low > high {
                    return Err(QueryError::InvalidRange {
                        property: property.name.clone(),
                    });
                }
                Ok(())
            }
            Predicate::In { property, values } => {
                let dt = resolve_property(property, schema)?;
                for value in values.iter() {
                    check_literal(property, value, dt)?;
                }
                Ok(())
            }
            Predicate::Like { property, .. } => {
                let dt = resolve_property(property, schema)?;
                if dt != vellum_core::DataType::String {
                    return Err(QueryError::type_mismatch(
                        &property.name,
                        format!("LIKE requires a String property, found {:?}", dt),
                    ));
                }
                Ok(())
            }
            Predicate::IsNull(property) | Predicate::IsNotNull(property) => {
                resolve_property(property, schema).map(|_| ())
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                for p in parts.iter_mut() {
                    p.resolve(schema)?;
                }
                Ok(())
            }
            Predicate::Not(inner) => inner.resolve(schema),
            Predicate::Constant(_) => Ok(()),
        }
    }
}

impl core::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

#[inline]
fn read<T: Model>(object: &T, property: &PropertyRef) -> Value {
    property
        .index
        .and_then(|i| object.field(i))
        .unwrap_or(Value::Null)
}

fn resolve_property(property: &mut PropertyRef, schema: &EntitySchema) -> Result<vellum_core::DataType> {
    let def = schema
        .property(&property.name)
        .ok_or_else(|| QueryError::unknown_property(schema.name(), &property.name))?;
    property.index = Some(def.index());
    Ok(def.data_type())
}

fn check_literal(property: &PropertyRef, value: &Value, dt: vellum_core::DataType) -> Result<()> {
    if value.is_null() {
        return Err(QueryError::type_mismatch(
            &property.name,
            "null literals never match; use IsNull or IsNotNull",
        ));
    }
    if !value.is_compatible_with(dt) {
        return Err(QueryError::type_mismatch(
            &property.name,
            format!("expected {:?} literal, found {:?}", dt, value.data_type()),
        ));
    }
    Ok(())
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { property, op, value } => {
                write!(f, "{} {} {:?}", property, op.symbol(), value)
            }
            Predicate::Between { property, low, high } => {
                write!(f, "{} BETWEEN {:?} AND {:?}", property, low, high)
            }
            Predicate::In { property, values } => write!(f, "{} IN {:?}", property, values),
            Predicate::Like { property, pattern } => write!(f, "{} LIKE {:?}", property, pattern),
            Predicate::IsNull(property) => write!(f, "{} IS NULL", property),
            Predicate::IsNotNull(property) => write!(f, "{} IS NOT NULL", property),
            Predicate::And(parts) => write_joined(f, parts, " AND ", "TRUE"),
            Predicate::Or(parts) => write_joined(f, parts, " OR ", "FALSE"),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
            Predicate::Constant(true) => f.write_str("TRUE"),
            Predicate::Constant(false) => f.write_str("FALSE"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str, empty: &str) -> fmt::Result {
    if parts.is_empty() {
        return f.write_str(empty);
    }
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({})", p)?;
    }
    Ok(())
}
