//! Object table for a single model type.
//!
//! A `Table` keeps committed objects apart from the pending journal of the
//! open transaction. Reads see the journal laid over the committed state;
//! `commit` folds the journal in and `rollback` drops it.

use alloc::string::String;
use core::any::Any;
use vellum_core::{Model, ObjectId};
use vellum_reactive::ChangeSet;

use crate::error::{Result, StoreError};

/// Committed object storage: HashMap (O(1) lookup) or BTreeMap (ordered).
#[cfg(feature = "hash-store")]
type ObjectMap<T> = hashbrown::HashMap<ObjectId, T>;
#[cfg(not(feature = "hash-store"))]
type ObjectMap<T> = alloc::collections::BTreeMap<ObjectId, T>;

/// Committed objects of `T` plus the pending journal.
pub(crate) struct Table<T: Model> {
    committed: ObjectMap<T>,
    journal: ChangeSet<T>,
}

impl<T: Model> Table<T> {
    pub fn new() -> Self {
        Self {
            committed: ObjectMap::new(),
            journal: ChangeSet::new(),
        }
    }

    /// Visible value of `id`: the journal first, then committed state.
    pub fn get(&self, id: ObjectId) -> Option<&T> {
        match self.journal.get(id) {
            Some(pending) => pending,
            None => self.committed.get(&id),
        }
    }

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Every visible object.
    pub fn visible(&self) -> impl Iterator<Item = &T> + '_ {
        self.committed
            .values()
            .filter(move |o| !self.journal.touches(o.id()))
            .chain(self.journal.updated())
            .chain(self.journal.inserted())
    }

    pub fn len(&self) -> usize {
        self.visible().count()
    }

    /// The cumulative pending changes.
    #[inline]
    pub fn journal(&self) -> &ChangeSet<T> {
        &self.journal
    }

    pub fn insert(&mut self, object: T) -> Result<()> {
        if self.contains(object.id()) {
            return Err(duplicate::<T>(object.id()));
        }
        self.journal.insert(object);
        Ok(())
    }

    pub fn update(&mut self, object: T) -> Result<()> {
        if !self.contains(object.id()) {
            return Err(not_found::<T>(object.id()));
        }
        self.journal.update(object);
        Ok(())
    }

    /// Deletes `id`, returning its last visible value.
    pub fn delete(&mut self, id: ObjectId) -> Result<T> {
        let object = self.get(id).cloned().ok_or_else(|| not_found::<T>(id))?;
        self.journal.delete(id);
        Ok(object)
    }

    // Direct writes to committed state, bypassing the journal.

    pub fn insert_committed(&mut self, object: T) -> Result<()> {
        let id = object.id();
        if self.committed.contains_key(&id) {
            return Err(duplicate::<T>(id));
        }
        self.committed.insert(id, object);
        Ok(())
    }

    pub fn update_committed(&mut self, object: T) -> Result<()> {
        let id = object.id();
        match self.committed.get_mut(&id) {
            Some(slot) => {
                *slot = object;
                Ok(())
            }
            None => Err(not_found::<T>(id)),
        }
    }

    pub fn delete_committed(&mut self, id: ObjectId) -> Result<T> {
        self.committed.remove(&id).ok_or_else(|| not_found::<T>(id))
    }
}

/// Type-erased table operations used by store-wide commit and rollback.
pub(crate) trait AnyTable {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn has_changes(&self) -> bool;
    /// Folds the journal into committed state. Returns false if it was empty.
    fn commit(&mut self) -> bool;
    /// Drops the journal. Returns false if it was empty.
    fn rollback(&mut self) -> bool;
}

impl<T: Model> AnyTable for Table<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn has_changes(&self) -> bool {
        !self.journal.is_empty()
    }

    fn commit(&mut self) -> bool {
        if self.journal.is_empty() {
            return false;
        }
        let journal = core::mem::take(&mut self.journal);
        for id in journal.deleted() {
            self.committed.remove(&id);
        }
        for object in journal.updated().chain(journal.inserted()) {
            self.committed.insert(object.id(), object.clone());
        }
        true
    }

    fn rollback(&mut self) -> bool {
        let had_changes = !self.journal.is_empty();
        self.journal.clear();
        had_changes
    }
}

pub(crate) fn entity_name<T: Model>() -> String {
    T::schema().name().into()
}

fn duplicate<T: Model>(id: ObjectId) -> StoreError {
    StoreError::DuplicateId {
        entity: entity_name::<T>(),
        id,
    }
}

fn not_found<T: Model>(id: ObjectId) -> StoreError {
    StoreError::NotFound {
        entity: entity_name::<T>(),
        id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use vellum_core::{DataType, EntitySchema, Property, Value};

    #[derive(Clone, Debug, PartialEq)]
    struct Cell {
        id: ObjectId,
        n: i64,
    }

    impl Model for Cell {
        fn schema() -> EntitySchema {
            EntitySchema::new("Cell", vec![Property::new("n", DataType::Int64)])
        }

        fn id(&self) -> ObjectId {
            self.id
        }

        fn field(&self, index: usize) -> Option<Value> {
            (index == 0).then(|| Value::Int64(self.n))
        }
    }

    fn cell(id: u64, n: i64) -> Cell {
        Cell {
            id: ObjectId::new(id),
            n,
        }
    }

    fn visible_ids(table: &Table<Cell>) -> Vec<u64> {
        let mut ids: Vec<u64> = table.visible().map(|c| c.id.get()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_journal_overlays_committed() {
        let mut table = Table::new();
        table.insert_committed(cell(1, 1)).unwrap();
        table.insert_committed(cell(2, 2)).unwrap();

        table.update(cell(1, 10)).unwrap();
        table.delete(ObjectId::new(2)).unwrap();
        table.insert(cell(3, 3)).unwrap();

        assert_eq!(table.get(ObjectId::new(1)), Some(&cell(1, 10)));
        assert_eq!(table.get(ObjectId::new(2)), None);
        assert_eq!(visible_ids(&table), vec![1, 3]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_insert_duplicate() {
        let mut table = Table::new();
        table.insert(cell(1, 1)).unwrap();
        assert!(matches!(table.insert(cell(1, 2)), Err(StoreError::DuplicateId { .. })));
    }

    #[test]
    fn test_update_missing() {
        let mut table = Table::<Cell>::new();
        assert!(matches!(table.update(cell(9, 1)), Err(StoreError::NotFound { .. })));
        assert!(matches!(table.delete(ObjectId::new(9)), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_commit() {
        let mut table = Table::new();
        table.insert_committed(cell(1, 1)).unwrap();
        table.insert(cell(2, 2)).unwrap();
        table.delete(ObjectId::new(1)).unwrap();

        assert!(table.commit());
        assert!(!table.has_changes());
        assert_eq!(visible_ids(&table), vec![2]);
        assert!(!table.commit());
    }

    #[test]
    fn test_rollback() {
        let mut table = Table::new();
        table.insert_committed(cell(1, 1)).unwrap();
        table.update(cell(1, 5)).unwrap();

        assert!(table.rollback());
        assert_eq!(table.get(ObjectId::new(1)), Some(&cell(1, 1)));
        assert!(!table.rollback());
    }

    #[test]
    fn test_delete_then_reinsert() {
        let mut table = Table::new();
        table.insert_committed(cell(1, 1)).unwrap();
        table.delete(ObjectId::new(1)).unwrap();
        table.insert(cell(1, 7)).unwrap();

        assert_eq!(table.get(ObjectId::new(1)), Some(&cell(1, 7)));
        assert_eq!(table.journal().updated().count(), 1);
    }
}
