//! Change set for tracking pending mutations of one object type.
//!
//! A `ChangeSet` is the cumulative record of a store transaction: every object
//! inserted, updated or deleted since the last commit, keyed by identity.
//! Repeated mutations of one identity are coalesced so each identity appears
//! in at most one of the three groups. An identity, once touched, stays
//! touched until the set is cleared.

use alloc::collections::{BTreeMap, BTreeSet};
use vellum_core::{Model, ObjectId};

/// Inserted, updated and deleted objects of one type.
///
/// Coalescing rules, applied in mutation order:
/// - insert after delete becomes an update
/// - update after insert stays an insert carrying the new value
/// - delete after insert or update becomes a delete
///
/// A delete after an insert leaves a tombstone rather than erasing the
/// insert: a reader that observed the pending insert must still learn that
/// the object is gone.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeSet<T> {
    inserted: BTreeMap<ObjectId, T>,
    updated: BTreeMap<ObjectId, T>,
    deleted: BTreeSet<ObjectId>,
}

impl<T> Default for ChangeSet<T> {
    fn default() -> Self {
        Self {
            inserted: BTreeMap::new(),
            updated: BTreeMap::new(),
            deleted: BTreeSet::new(),
        }
    }
}

impl<T: Model> ChangeSet<T> {
    /// Creates a new empty change set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an inserted object.
    pub fn insert(&mut self, object: T) {
        let id = object.id();
        if self.deleted.remove(&id) {
            self.updated.insert(id, object);
        } else {
            self.inserted.insert(id, object);
        }
    }

    /// Records the new value of an updated object.
    pub fn update(&mut self, object: T) {
        let id = object.id();
        if let Some(slot) = self.inserted.get_mut(&id) {
            *slot = object;
        } else {
            self.deleted.remove(&id);
            self.updated.insert(id, object);
        }
    }

    /// Records a deleted identity.
    pub fn delete(&mut self, id: ObjectId) {
        self.inserted.remove(&id);
        self.updated.remove(&id);
        self.deleted.insert(id);
    }

    /// Inserted objects in identity order.
    pub fn inserted(&self) -> impl Iterator<Item = &T> + '_ {
        self.inserted.values()
    }

    /// Updated objects (current values) in identity order.
    pub fn updated(&self) -> impl Iterator<Item = &T> + '_ {
        self.updated.values()
    }

    /// Deleted identities in order.
    pub fn deleted(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.deleted.iter().copied()
    }

    /// Returns the pending value of `id`: `Some(Some(_))` if inserted or
    /// updated, `Some(None)` if deleted, `None` if untouched.
    pub fn get(&self, id: ObjectId) -> Option<Option<&T>> {
        if let Some(object) = self.inserted.get(&id).or_else(|| self.updated.get(&id)) {
            Some(Some(object))
        } else if self.deleted.contains(&id) {
            Some(None)
        } else {
            None
        }
    }

    /// Returns true if `id` was mutated in this change set.
    #[inline]
    pub fn touches(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Returns true if there are no changes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Returns the number of touched identities.
    #[inline]
    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    /// Applies the changes of `other` after this one's.
    pub fn merge(&mut self, other: ChangeSet<T>) {
        for id in other.deleted {
            self.delete(id);
        }
        for (_, object) in other.updated {
            self.update(object);
        }
        for (_, object) in other.inserted {
            self.insert(object);
        }
    }

    /// Clears all changes.
    pub fn clear(&mut self) {
        self.inserted.clear();
        self.updated.clear();
        self.deleted.clear();
    }
}
