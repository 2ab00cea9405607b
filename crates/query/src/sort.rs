//! Deterministic multi-key ordering.
//!
//! Objects are ordered by the sort keys in declared sequence, each ascending
//! or descending. Ties that survive every key are broken by `ObjectId`
//! ascending, so the order is total and reproducible.

use crate::expr::SortKey;
use alloc::vec::Vec;
use core::cmp::Ordering;
use vellum_core::{Model, ObjectId, Value};

/// An object decorated with its extracted sort values.
pub struct Keyed<T> {
    pub values: Vec<Value>,
    pub object: T,
}

impl<T: Model> Keyed<T> {
    /// Extracts the sort values of `object` once.
    pub fn new(keys: &[SortKey], object: T) -> Self {
        Self {
            values: extract(keys, &object),
            object,
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.object.id()
    }
}

/// Reads the sort key values of one object. Missing fields read as `Null`.
pub fn extract<T: Model>(keys: &[SortKey], object: &T) -> Vec<Value> {
    keys.iter()
        .map(|k| {
            k.property
                .index
                .and_then(|i| object.field(i))
                .unwrap_or(Value::Null)
        })
        .collect()
}

/// Compares two extracted key vectors, then identities.
pub fn compare_values(keys: &[SortKey], a: &[Value], a_id: ObjectId, b: &[Value], b_id: ObjectId) -> Ordering {
    for ((key, av), bv) in keys.iter().zip(a).zip(b) {
        let cmp = av.cmp(bv);
        if cmp != Ordering::Equal {
            return key.order.apply(cmp);
        }
    }
    a_id.cmp(&b_id)
}

/// Compares two objects directly.
pub fn compare_objects<T: Model>(keys: &[SortKey], a: &T, b: &T) -> Ordering {
    compare_values(keys, &extract(keys, a), a.id(), &extract(keys, b), b.id())
}

/// Sorts objects, extracting each object's key values only once.
pub fn sort_objects<T: Model>(keys: &[SortKey], objects: Vec<T>) -> Vec<T> {
    let mut keyed: Vec<Keyed<T>> = objects.into_iter().map(|o| Keyed::new(keys, o)).collect();
    sort_keyed(keys, &mut keyed);
    keyed.into_iter().map(|k| k.object).collect()
}

/// Sorts decorated objects in place.
pub fn sort_keyed<T: Model>(keys: &[SortKey], keyed: &mut [Keyed<T>]) {
    keyed.sort_unstable_by(|a, b| compare_values(keys, &a.values, a.id(), &b.values, b.id()));
}

/// Returns true if `objects` is strictly ascending under the sort keys.
///
/// Strictness also rejects repeated identities.
pub fn is_sorted<T: Model>(keys: &[SortKey], objects: &[T]) -> bool {
    let mut prev: Option<(Vec<Value>, ObjectId)> = None;
    for object in objects {
        let values = extract(keys, object);
        let id = object.id();
        if let Some((pv, pid)) = &prev {
            if compare_values(keys, pv, *pid, &values, id) != Ordering::Less {
                return false;
            }
        }
        prev = Some((values, id));
    }
    true
}
