//! Store events and the subscriptions that carry them.
//!
//! A store owns one `ChangeRegistry`. Subscribers register per entity type
//! (keyed by `TypeId`, never by name) and receive:
//!
//! - `StoreEvent::InTransaction` with the cumulative pending change set of
//!   their type after every mutation,
//! - `StoreEvent::Committed` after every save,
//! - `StoreEvent::RemoteChange` when the store changed in ways the change
//!   sets do not describe.
//!
//! `ChangeChannel` is the subscriber side: an RAII handle that unsubscribes
//! when dropped.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::cell::{Cell, RefCell};
use hashbrown::HashMap;
use vellum_core::Model;

use crate::change_set::ChangeSet;
use crate::store::Store;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback type for store events of one model type.
pub type EventCallback<T> = Box<dyn Fn(&StoreEvent<T>)>;

/// An event delivered to subscribers of type `T`.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent<T> {
    /// A mutation inside the open transaction. Carries every pending change
    /// of `T` since the last commit, not just the latest mutation.
    InTransaction(ChangeSet<T>),
    /// The store persisted its transaction.
    Committed,
    /// The store changed outside in-process tracking; results must refetch.
    RemoteChange,
}

impl<T> StoreEvent<T> {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::InTransaction(_) => "in-transaction",
            StoreEvent::Committed => "committed",
            StoreEvent::RemoteChange => "remote-change",
        }
    }
}

#[derive(Clone, Copy)]
enum Signal {
    Committed,
    RemoteChange,
}

/// Type-erased subscriber.
trait EventSink {
    fn as_any(&self) -> &dyn Any;
    fn signal(&self, signal: Signal);
}

struct TypedSink<T>(EventCallback<T>);

impl<T: Model> EventSink for TypedSink<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn signal(&self, signal: Signal) {
        let event = match signal {
            Signal::Committed => StoreEvent::Committed,
            Signal::RemoteChange => StoreEvent::RemoteChange,
        };
        (self.0)(&event);
    }
}

struct Subscription {
    id: SubscriptionId,
    active: Cell<bool>,
    sink: Box<dyn EventSink>,
}

impl Subscription {
    #[inline]
    fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Typed subscription registry owned by a store.
///
/// All methods take `&self`. Publishing snapshots the matching subscriptions
/// and releases the registry before invoking any callback, so callbacks may
/// subscribe or unsubscribe. A subscription removed during a publish is not
/// invoked afterwards.
pub struct ChangeRegistry {
    subscriptions: RefCell<HashMap<TypeId, Vec<Rc<Subscription>>>>,
    next_id: Cell<SubscriptionId>,
}

impl Default for ChangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            subscriptions: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Subscribes to events of type `T`.
    pub fn subscribe<T: Model>(&self, callback: EventCallback<T>) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let subscription = Rc::new(Subscription {
            id,
            active: Cell::new(true),
            sink: Box::new(TypedSink(callback)),
        });
        self.subscriptions
            .borrow_mut()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(subscription);
        id
    }

    /// Unsubscribes by ID.
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.borrow_mut();
        let mut found = false;
        for list in subscriptions.values_mut() {
            list.retain(|s| {
                if s.id == id {
                    s.active.set(false);
                    found = true;
                    false
                } else {
                    true
                }
            });
        }
        subscriptions.retain(|_, list| !list.is_empty());
        found
    }

    /// Delivers an event to every subscriber of `T`, in subscription order.
    pub fn publish<T: Model>(&self, event: &StoreEvent<T>) {
        for subscription in self.snapshot(Some(TypeId::of::<T>())) {
            if !subscription.is_active() {
                continue;
            }
            if let Some(typed) = subscription.sink.as_any().downcast_ref::<TypedSink<T>>() {
                (typed.0)(event);
            }
        }
    }

    /// Delivers `Committed` to every subscriber of every type.
    pub fn publish_committed(&self) {
        self.signal(None, Signal::Committed);
    }

    /// Delivers `RemoteChange` to every subscriber of the given type.
    pub fn publish_remote(&self, type_id: TypeId) {
        self.signal(Some(type_id), Signal::RemoteChange);
    }

    fn signal(&self, scope: Option<TypeId>, signal: Signal) {
        for subscription in self.snapshot(scope) {
            if subscription.is_active() {
                subscription.sink.signal(signal);
            }
        }
    }

    fn snapshot(&self, scope: Option<TypeId>) -> Vec<Rc<Subscription>> {
        let subscriptions = self.subscriptions.borrow();
        let mut snapshot: Vec<Rc<Subscription>> = match scope {
            Some(type_id) => subscriptions
                .get(&type_id)
                .map(|list| list.to_vec())
                .unwrap_or_default(),
            None => subscriptions.values().flatten().cloned().collect(),
        };
        snapshot.sort_by_key(|s| s.id);
        snapshot
    }

    /// Returns the number of subscribers of `T`.
    pub fn subscriber_count<T: Model>(&self) -> usize {
        self.subscriptions
            .borrow()
            .get(&TypeId::of::<T>())
            .map_or(0, Vec::len)
    }

    /// Returns the total number of subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.borrow().values().map(Vec::len).sum()
    }

    /// Returns true if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live subscription to one store.
///
/// Dropping the channel unsubscribes. The channel holds the store weakly, so
/// it never keeps a store alive on its own.
pub struct ChangeChannel<T: Model> {
    store: Weak<dyn Store<T>>,
    subscription: SubscriptionId,
}

impl<T: Model> ChangeChannel<T> {
    /// Subscribes `callback` to `store`.
    pub fn open(store: &Rc<dyn Store<T>>, callback: EventCallback<T>) -> Self {
        let subscription = store.subscribe(callback);
        Self {
            store: Rc::downgrade(store),
            subscription,
        }
    }

    #[inline]
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }
}

impl<T: Model> Drop for ChangeChannel<T> {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.subscription);
        }
    }
}

impl<T: Model> core::fmt::Debug for ChangeChannel<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangeChannel")
            .field("subscription", &self.subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchFailure;
    use crate::store::StoreId;
    use alloc::string::String;
    use alloc::vec;
    use vellum_core::{DataType, EntitySchema, ObjectId, Property, Value};
    use vellum_query::Query;

    #[derive(Clone, Debug, PartialEq)]
    struct Note {
        id: ObjectId,
        text: String,
    }

    impl Model for Note {
        fn schema() -> EntitySchema {
            EntitySchema::new("Note", vec![Property::new("text", DataType::String)])
        }

        fn id(&self) -> ObjectId {
            self.id
        }

        fn field(&self, index: usize) -> Option<Value> {
            (index == 0).then(|| Value::String(self.text.clone()))
        }
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Tag {
        id: ObjectId,
    }

    impl Model for Tag {
        fn schema() -> EntitySchema {
            EntitySchema::new("Tag", vec![Property::new("name", DataType::String)])
        }

        fn id(&self) -> ObjectId {
            self.id
        }

        fn field(&self, _index: usize) -> Option<Value> {
            None
        }
    }

    struct RegistryStore {
        id: StoreId,
        registry: ChangeRegistry,
    }

    impl Store<Note> for RegistryStore {
        fn id(&self) -> StoreId {
            self.id
        }

        fn fetch(&self, _query: &Query<Note>) -> Result<Vec<Note>, FetchFailure> {
            Ok(Vec::new())
        }

        fn subscribe(&self, callback: EventCallback<Note>) -> SubscriptionId {
            self.registry.subscribe(callback)
        }

        fn unsubscribe(&self, id: SubscriptionId) -> bool {
            self.registry.unsubscribe(id)
        }
    }

    fn counter() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&StoreEvent<Note>) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        (seen, move |event: &StoreEvent<Note>| seen_clone.borrow_mut().push(event.kind()))
    }

    #[test]
    fn test_registry_subscribe() {
        let registry = ChangeRegistry::new();

        let id1 = registry.subscribe::<Note>(Box::new(|_| {}));
        let id2 = registry.subscribe::<Tag>(Box::new(|_| {}));

        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.subscriber_count::<Note>(), 1);
    }

    #[test]
    fn test_registry_unsubscribe() {
        let registry = ChangeRegistry::new();

        let id = registry.subscribe::<Note>(Box::new(|_| {}));
        assert!(registry.unsubscribe(id));
        assert!(registry.is_empty());
        assert!(!registry.unsubscribe(id)); // Already removed
    }

    #[test]
    fn test_publish_is_scoped_by_type() {
        let registry = ChangeRegistry::new();
        let (seen, callback) = counter();
        registry.subscribe::<Note>(Box::new(callback));

        let tag_calls = Rc::new(Cell::new(0));
        let tag_calls_clone = tag_calls.clone();
        registry.subscribe::<Tag>(Box::new(move |_| tag_calls_clone.set(tag_calls_clone.get() + 1)));

        registry.publish::<Note>(&StoreEvent::InTransaction(ChangeSet::new()));
        assert_eq!(*seen.borrow(), vec!["in-transaction"]);
        assert_eq!(tag_calls.get(), 0);

        registry.publish_committed();
        assert_eq!(*seen.borrow(), vec!["in-transaction", "committed"]);
        assert_eq!(tag_calls.get(), 1);

        registry.publish_remote(TypeId::of::<Tag>());
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(tag_calls.get(), 2);
    }

    #[test]
    fn test_callback_may_unsubscribe_during_publish() {
        let registry = Rc::new(ChangeRegistry::new());
        let calls = Rc::new(Cell::new(0));

        let later_id = Rc::new(Cell::new(0));
        let registry_clone = Rc::downgrade(&registry);
        let later_clone = later_id.clone();
        registry.subscribe::<Note>(Box::new(move |_| {
            if let Some(registry) = registry_clone.upgrade() {
                registry.unsubscribe(later_clone.get());
            }
        }));
        let calls_clone = calls.clone();
        later_id.set(registry.subscribe::<Note>(Box::new(move |_| calls_clone.set(calls_clone.get() + 1))));

        registry.publish::<Note>(&StoreEvent::Committed);
        assert_eq!(calls.get(), 0);
        assert_eq!(registry.subscriber_count::<Note>(), 1);
    }

    #[test]
    fn test_channel_unsubscribes_on_drop() {
        let store = Rc::new(RegistryStore {
            id: StoreId::next(),
            registry: ChangeRegistry::new(),
        });
        let dyn_store: Rc<dyn Store<Note>> = store.clone();
        let (seen, callback) = counter();

        let channel = ChangeChannel::open(&dyn_store, Box::new(callback));
        assert_eq!(store.registry.subscriber_count::<Note>(), 1);
        store.registry.publish_committed();

        drop(channel);
        assert_eq!(store.registry.subscriber_count::<Note>(), 0);
        store.registry.publish_committed();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_channel_outliving_store() {
        let dyn_store: Rc<dyn Store<Note>> = Rc::new(RegistryStore {
            id: StoreId::next(),
            registry: ChangeRegistry::new(),
        });
        let channel = ChangeChannel::open(&dyn_store, Box::new(|_| {}));
        drop(dyn_store);
        drop(channel);
    }
}
