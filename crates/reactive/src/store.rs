//! The contract a store offers to live results.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use alloc::vec::Vec;
use vellum_core::Model;
use vellum_query::Query;

use crate::channel::{EventCallback, SubscriptionId};
use crate::error::FetchFailure;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a store instance, used to detect rebinding to another store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreId(u64);

impl StoreId {
    /// Allocates a fresh, process-unique store identity.
    pub fn next() -> Self {
        StoreId(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store-{}", self.0)
    }
}

/// A transactional collection of identity-addressable objects of type `T`.
///
/// The store must deliver every event exactly once and in mutation order to
/// each subscriber, and must not hold internal borrows while a callback runs:
/// callbacks may fetch, subscribe or unsubscribe.
pub trait Store<T: Model> {
    /// Identity of this store instance.
    fn id(&self) -> StoreId;

    /// Runs a full fetch: every visible object the query predicate accepts,
    /// in query order.
    ///
    /// The query's projection is a loading hint. A store may populate only
    /// the projected properties (always a superset of the sort keys), or
    /// ignore it and return whole objects.
    fn fetch(&self, query: &Query<T>) -> Result<Vec<T>, FetchFailure>;

    /// Registers a callback for events concerning `T`.
    fn subscribe(&self, callback: EventCallback<T>) -> SubscriptionId;

    /// Removes a subscription. Returns false if it was already gone.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
