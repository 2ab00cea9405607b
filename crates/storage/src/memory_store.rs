//! In-memory transactional store.
//!
//! `MemoryStore` holds one table per registered model type and a single open
//! transaction spanning all of them. Every mutation is journaled and
//! announced to subscribers of its type with the cumulative pending change
//! set. `save` commits, `rollback` discards, and `apply_remote` simulates a
//! writer outside this process.
//!
//! Internal borrows are always released before subscribers run, so callbacks
//! may fetch from the store or (un)subscribe.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::any::TypeId;
use core::cell::RefCell;
use hashbrown::HashMap;
use log::{debug, warn};
use vellum_core::{reserve_object_id, Model, ObjectId};
use vellum_query::Query;
use vellum_reactive::{
    ChangeRegistry, EventCallback, FetchFailure, Store, StoreEvent, StoreId, SubscriptionId,
};

use crate::error::{Result, StoreError};
use crate::table::{entity_name, AnyTable, Table};

type Tables = HashMap<TypeId, Box<dyn AnyTable>>;

fn table<T: Model>(tables: &Tables) -> Option<&Table<T>> {
    tables
        .get(&TypeId::of::<T>())
        .and_then(|t| t.as_any().downcast_ref::<Table<T>>())
}

fn table_mut<T: Model>(tables: &mut Tables) -> Result<&mut Table<T>> {
    tables
        .get_mut(&TypeId::of::<T>())
        .and_then(|t| t.as_any_mut().downcast_mut::<Table<T>>())
        .ok_or_else(|| StoreError::TypeNotRegistered {
            entity: entity_name::<T>(),
        })
}

/// A transactional in-memory object store.
///
/// # Example
///
/// ```ignore
/// let store = Rc::new(MemoryStore::new());
/// store.register::<Task>();
/// store.insert(Task::new("write docs", 2))?;
/// store.save();
/// ```
pub struct MemoryStore {
    id: StoreId,
    tables: RefCell<Tables>,
    registry: ChangeRegistry,
    fail_next_fetch: RefCell<Option<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            id: StoreId::next(),
            tables: RefCell::new(HashMap::new()),
            registry: ChangeRegistry::new(),
            fail_next_fetch: RefCell::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Registers a model type. Returns false if it was already registered.
    pub fn register<T: Model>(&self) -> bool {
        let mut tables = self.tables.borrow_mut();
        if tables.contains_key(&TypeId::of::<T>()) {
            return false;
        }
        debug!("{}: registered {}", self.id, entity_name::<T>());
        tables.insert(TypeId::of::<T>(), Box::new(Table::<T>::new()));
        true
    }

    pub fn is_registered<T: Model>(&self) -> bool {
        self.tables.borrow().contains_key(&TypeId::of::<T>())
    }

    /// Inserts an object into the open transaction.
    pub fn insert<T: Model>(&self, object: T) -> Result<()> {
        let id = object.id();
        self.mutate::<T, _, _>(|table| table.insert(object))?;
        reserve_object_id(id);
        Ok(())
    }

    /// Replaces a visible object in the open transaction.
    pub fn update<T: Model>(&self, object: T) -> Result<()> {
        self.mutate::<T, _, _>(|table| table.update(object))
    }

    /// Deletes a visible object in the open transaction, returning it.
    pub fn delete<T: Model>(&self, id: ObjectId) -> Result<T> {
        self.mutate::<T, _, _>(|table| table.delete(id))
    }

    /// Returns the visible value of an object.
    pub fn get<T: Model>(&self, id: ObjectId) -> Option<T> {
        let tables = self.tables.borrow();
        table::<T>(&tables).and_then(|t| t.get(id)).cloned()
    }

    /// Number of visible objects of `T`.
    pub fn len<T: Model>(&self) -> usize {
        let tables = self.tables.borrow();
        table::<T>(&tables).map_or(0, Table::len)
    }

    pub fn is_empty<T: Model>(&self) -> bool {
        self.len::<T>() == 0
    }

    /// True if the open transaction holds any change.
    pub fn has_changes(&self) -> bool {
        self.tables.borrow().values().any(|t| t.has_changes())
    }

    /// Commits the open transaction and announces `Committed` to every
    /// subscriber.
    pub fn save(&self) {
        let committed = {
            let mut tables = self.tables.borrow_mut();
            tables.values_mut().map(|t| t.commit()).filter(|&changed| changed).count()
        };
        debug!("{}: saved ({} tables changed)", self.id, committed);
        #[cfg(feature = "debug-events")]
        log::trace!("{}: publishing committed", self.id);
        self.registry.publish_committed();
    }

    /// Discards the open transaction.
    ///
    /// Subscribers of every rolled-back type receive `RemoteChange`: a result
    /// may have been fetched while the discarded changes were visible, so
    /// only a refetch can restore it.
    pub fn rollback(&self) {
        let reverted: Vec<TypeId> = {
            let mut tables = self.tables.borrow_mut();
            tables
                .iter_mut()
                .filter_map(|(type_id, t)| t.rollback().then_some(*type_id))
                .collect()
        };
        debug!("{}: rolled back {} tables", self.id, reverted.len());
        for type_id in reverted {
            self.publish_remote(type_id);
        }
    }

    /// Applies changes straight to committed state, as another process
    /// would, then announces `RemoteChange` to subscribers of every touched
    /// type.
    pub fn apply_remote<R>(&self, write: impl FnOnce(&mut RemoteWriter<'_>) -> R) -> R {
        let (result, touched) = {
            let mut tables = self.tables.borrow_mut();
            let mut writer = RemoteWriter {
                tables: &mut *tables,
                touched: Vec::new(),
            };
            let result = write(&mut writer);
            (result, writer.touched)
        };
        debug!("{}: remote write touched {} types", self.id, touched.len());
        for type_id in touched {
            self.publish_remote(type_id);
        }
        result
    }

    /// Makes the next fetch fail with `FetchFailure::Backend`.
    pub fn fail_next_fetch(&self, reason: impl Into<String>) {
        *self.fail_next_fetch.borrow_mut() = Some(reason.into());
    }

    /// Number of subscribers of `T`.
    pub fn subscriber_count<T: Model>(&self) -> usize {
        self.registry.subscriber_count::<T>()
    }

    fn mutate<T, R, F>(&self, op: F) -> Result<R>
    where
        T: Model,
        F: FnOnce(&mut Table<T>) -> Result<R>,
    {
        let (result, changes) = {
            let mut tables = self.tables.borrow_mut();
            let table = table_mut::<T>(&mut tables)?;
            let result = op(table)?;
            (result, table.journal().clone())
        };
        self.publish(&StoreEvent::InTransaction(changes));
        Ok(result)
    }

    fn publish<T: Model>(&self, event: &StoreEvent<T>) {
        #[cfg(feature = "debug-events")]
        log::trace!("{}: publishing {} to {}", self.id, event.kind(), entity_name::<T>());
        self.registry.publish(event);
    }

    fn publish_remote(&self, type_id: TypeId) {
        #[cfg(feature = "debug-events")]
        log::trace!("{}: publishing remote-change to {:?}", self.id, type_id);
        self.registry.publish_remote(type_id);
    }
}

impl<T: Model> Store<T> for MemoryStore {
    fn id(&self) -> StoreId {
        self.id
    }

    /// Objects are held whole, so the projection is ignored.
    fn fetch(&self, query: &Query<T>) -> core::result::Result<Vec<T>, FetchFailure> {
        if let Some(message) = self.fail_next_fetch.borrow_mut().take() {
            warn!("{}: injected fetch failure: {}", self.id, message);
            return Err(FetchFailure::Backend { message });
        }

        let filter = query.predicate().map(|p| p.lower()).transpose()?;
        let matching: Vec<T> = {
            let tables = self.tables.borrow();
            let table = table::<T>(&tables).ok_or_else(|| FetchFailure::TypeNotRegistered {
                entity: entity_name::<T>(),
            })?;
            match &filter {
                Some(filter) => filter.apply(table.visible().cloned()).collect(),
                None => table.visible().cloned().collect(),
            }
        };
        debug!(
            "{}: fetched {} {} objects",
            self.id,
            matching.len(),
            entity_name::<T>()
        );
        Ok(query.sort_objects(matching))
    }

    fn subscribe(&self, callback: EventCallback<T>) -> SubscriptionId {
        self.registry.subscribe(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }
}

/// Writes applied directly to committed state by [`MemoryStore::apply_remote`].
pub struct RemoteWriter<'a> {
    tables: &'a mut Tables,
    touched: Vec<TypeId>,
}

impl RemoteWriter<'_> {
    pub fn insert<T: Model>(&mut self, object: T) -> Result<()> {
        let id = object.id();
        table_mut::<T>(self.tables)?.insert_committed(object)?;
        reserve_object_id(id);
        self.touch::<T>();
        Ok(())
    }

    pub fn update<T: Model>(&mut self, object: T) -> Result<()> {
        table_mut::<T>(self.tables)?.update_committed(object)?;
        self.touch::<T>();
        Ok(())
    }

    pub fn delete<T: Model>(&mut self, id: ObjectId) -> Result<T> {
        let object = table_mut::<T>(self.tables)?.delete_committed(id)?;
        self.touch::<T>();
        Ok(object)
    }

    fn touch<T: Model>(&mut self) {
        let type_id = TypeId::of::<T>();
        if !self.touched.contains(&type_id) {
            self.touched.push(type_id);
        }
    }
}
