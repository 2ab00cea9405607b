//! Live result controller.
//!
//! A `LiveResultController` keeps the result of one query against one store
//! up to date. It owns three pieces of state:
//!
//! - the *baseline*: the last list known to match the store (set by a full
//!   fetch, or by the materialized list when a local commit lands)
//! - the *pending changes*: the store's cumulative change set since then
//! - the *materialized list*: `reconcile(baseline, pending changes, query)`,
//!   the only state handed to observers
//!
//! In-transaction events are folded in with the reconciler; the observer is
//! told only when the materialized list actually changes. Commits promote the
//! materialized list to baseline. Remote changes force a full fetch.

use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU64, Ordering};
use log::{debug, trace, warn};
use vellum_core::Model;
use vellum_query::Query;

use crate::change_set::ChangeSet;
use crate::channel::{ChangeChannel, StoreEvent};
use crate::error::FetchFailure;
use crate::observer::ResultObserver;
use crate::reconcile::{reconcile, reconcile_with_stats};
use crate::store::Store;

static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a controller.
pub type ControllerId = u64;

/// How the controller reacts to change notices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Reconcile in memory; full fetch only for remote changes.
    #[default]
    Incremental,
    /// Full fetch on every change notice.
    Refetch,
}

/// Where a commit-or-remote notice came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// This process saved its own transaction.
    Local,
    /// Another writer changed the store.
    Remote,
}

/// Outcome of [`LiveResultController::finish_fetch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchApplied {
    /// The fetched list was applied as is.
    Applied,
    /// In-transaction changes arrived during the fetch and were reconciled
    /// into the fetched list before applying it.
    Revalidated,
    /// The fetch was stale and has been discarded.
    Superseded,
}

/// Counters describing a controller's work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub fetches: u64,
    pub fetch_failures: u64,
    pub reconciliations: u64,
    pub notifications: u64,
    pub suppressed_notifications: u64,
    pub stale_fetches: u64,
}

/// A full fetch captured for running outside the controller.
///
/// Obtained from [`LiveResultController::begin_fetch`]; run with
/// [`FetchTicket::execute`]; hand the outcome back to
/// [`LiveResultController::finish_fetch`].
pub struct FetchTicket<T: Model> {
    generation: u64,
    change_epoch: u64,
    sync_epoch: u64,
    seq: u64,
    query: Query<T>,
    store: Rc<dyn Store<T>>,
}

impl<T: Model> FetchTicket<T> {
    /// Runs the fetch against the captured store and query.
    pub fn execute(&self) -> Result<Vec<T>, FetchFailure> {
        self.store.fetch(&self.query)
    }

    pub fn query(&self) -> &Query<T> {
        &self.query
    }
}

impl<T: Model> core::fmt::Debug for FetchTicket<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FetchTicket")
            .field("generation", &self.generation)
            .field("change_epoch", &self.change_epoch)
            .field("sync_epoch", &self.sync_epoch)
            .field("seq", &self.seq)
            .finish()
    }
}

type Inbox<T> = Rc<RefCell<VecDeque<(u64, StoreEvent<T>)>>>;

/// Keeps one query's result synchronized with one store.
pub struct LiveResultController<T: Model> {
    id: ControllerId,
    self_ref: Weak<RefCell<LiveResultController<T>>>,
    store: Option<Rc<dyn Store<T>>>,
    query: Option<Query<T>>,
    policy: RefreshPolicy,
    observer: Option<Weak<dyn ResultObserver<T>>>,
    channel: Option<ChangeChannel<T>>,
    /// Events waiting to be applied, tagged with the channel epoch they
    /// arrived on.
    inbox: Inbox<T>,
    channel_epoch: u64,
    baseline: Option<Vec<T>>,
    materialized: Option<Vec<T>>,
    failure: Option<FetchFailure>,
    pending: ChangeSet<T>,
    /// Bumped by every effective `bind`.
    generation: u64,
    /// Bumped by every in-transaction event.
    change_epoch: u64,
    /// Bumped by every commit or remote event.
    sync_epoch: u64,
    fetch_seq: u64,
    applied_seq: u64,
    stats: ControllerStats,
}

impl<T: Model> LiveResultController<T> {
    /// Creates an unbound controller with the default refresh policy.
    pub fn new() -> Rc<RefCell<Self>> {
        Self::with_policy(RefreshPolicy::default())
    }

    /// Creates an unbound controller.
    pub fn with_policy(policy: RefreshPolicy) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|self_ref| {
            RefCell::new(Self {
                id: NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed),
                self_ref: self_ref.clone(),
                store: None,
                query: None,
                policy,
                observer: None,
                channel: None,
                inbox: Rc::new(RefCell::new(VecDeque::new())),
                channel_epoch: 0,
                baseline: None,
                materialized: None,
                failure: None,
                pending: ChangeSet::new(),
                generation: 0,
                change_epoch: 0,
                sync_epoch: 0,
                fetch_seq: 0,
                applied_seq: 0,
                stats: ControllerStats::default(),
            })
        })
    }

    /// Creates a controller already bound to `store` and `query`.
    pub fn bound(store: Rc<dyn Store<T>>, query: Query<T>) -> Rc<RefCell<Self>> {
        let controller = Self::new();
        controller.borrow_mut().bind(store, query);
        controller
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn query(&self) -> Option<&Query<T>> {
        self.query.as_ref()
    }

    /// The current materialized list, if one is valid.
    pub fn materialized(&self) -> Option<&[T]> {
        self.materialized.as_deref()
    }

    pub fn baseline(&self) -> Option<&[T]> {
        self.baseline.as_deref()
    }

    /// The current result: the cached failure if the last fetch failed,
    /// otherwise the materialized list if one is valid.
    pub fn last_result(&self) -> Option<Result<&[T], &FetchFailure>> {
        match (&self.failure, &self.materialized) {
            (Some(failure), _) => Some(Err(failure)),
            (None, Some(list)) => Some(Ok(list.as_slice())),
            (None, None) => None,
        }
    }

    /// True while a change channel to the bound store is open.
    #[inline]
    pub fn is_subscribed(&self) -> bool {
        self.channel.is_some()
    }

    #[inline]
    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    #[inline]
    pub fn refresh_policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn set_refresh_policy(&mut self, policy: RefreshPolicy) {
        self.policy = policy;
    }

    // ------------------------------------------------------------------
    // Binding and observation
    // ------------------------------------------------------------------

    /// Binds to `store` and `query`.
    ///
    /// - same store, same query: nothing happens
    /// - same store, same predicate: the materialized list is invalidated and
    ///   re-derived from the baseline on the next `result()`
    /// - same store, new predicate: the baseline is discarded too
    /// - new store: all state is discarded and the channel is reopened
    ///
    /// Any effective bind supersedes outstanding fetch tickets.
    pub fn bind(&mut self, store: Rc<dyn Store<T>>, query: Query<T>) {
        self.drain_inbox();
        let same_store = self.store.as_ref().map_or(false, |s| s.id() == store.id());
        if same_store && self.query.as_ref() == Some(&query) {
            return;
        }
        self.generation += 1;

        if !same_store {
            debug!(
                "controller {}: binding to {} with {}",
                self.id,
                store.id(),
                query
            );
            self.close_channel();
            self.reset_state();
            self.store = Some(store);
            self.query = Some(query);
            if self.observer.is_some() {
                self.open_channel();
            }
            return;
        }

        let filter_kept = self.query.as_ref().map_or(false, |q| q.same_filter(&query));
        debug!(
            "controller {}: rebinding query to {} (baseline {})",
            self.id,
            query,
            if filter_kept { "kept" } else { "discarded" }
        );
        self.query = Some(query);
        self.materialized = None;
        self.failure = None;
        if !filter_kept {
            self.baseline = None;
            self.pending.clear();
        }
    }

    /// Attaches the single observer, opening the change channel if needed.
    pub fn set_observer(&mut self, observer: Weak<dyn ResultObserver<T>>) {
        self.drain_inbox();
        self.observer = Some(observer);
        if self.channel.is_none() && self.store.is_some() {
            self.open_channel();
        }
    }

    /// Detaches the observer and closes the change channel.
    pub fn clear_observer(&mut self) {
        self.observer = None;
        self.close_channel();
    }

    fn open_channel(&mut self) {
        if self.store.is_none() {
            return;
        }
        // Events may have been missed while no channel was open.
        self.reset_state();
        self.channel_epoch += 1;

        let Some(store) = self.store.as_ref() else {
            return;
        };
        let epoch = self.channel_epoch;
        let inbox = Rc::clone(&self.inbox);
        let controller = self.self_ref.clone();
        let channel = ChangeChannel::open(
            store,
            alloc::boxed::Box::new(move |event: &StoreEvent<T>| {
                inbox.borrow_mut().push_back((epoch, event.clone()));
                if let Some(controller) = controller.upgrade() {
                    // Busy means the event was raised from inside this
                    // controller or while it is borrowed elsewhere; the
                    // running handler or the next mutator drains it.
                    if let Ok(mut controller) = controller.try_borrow_mut() {
                        controller.drain_inbox();
                    }
                }
            }),
        );
        trace!(
            "controller {}: opened channel {} on {}",
            self.id,
            channel.subscription(),
            store.id()
        );
        self.channel = Some(channel);
    }

    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            trace!("controller {}: closing channel {}", self.id, channel.subscription());
        }
        self.inbox.borrow_mut().clear();
    }

    fn reset_state(&mut self) {
        self.baseline = None;
        self.materialized = None;
        self.failure = None;
        self.pending.clear();
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Returns the current result.
    ///
    /// Serves the materialized list if valid, else re-derives it from the
    /// baseline, else runs a full fetch. Without an open channel the
    /// controller cannot see changes, so every call runs a full fetch.
    /// A failure is cached as the current result and the next call retries.
    ///
    /// Store events queued while the controller was borrowed are applied
    /// first and notify as usual; the fetch itself never notifies.
    pub fn result(&mut self) -> Result<Vec<T>, FetchFailure> {
        self.drain_inbox();
        if self.store.is_none() || self.query.is_none() {
            self.failure = Some(FetchFailure::Unbound);
            return Err(FetchFailure::Unbound);
        }

        if self.is_subscribed() {
            if let Some(list) = &self.materialized {
                return Ok(list.clone());
            }
            if let (Some(baseline), Some(query)) = (&self.baseline, &self.query) {
                let list = reconcile(baseline, &self.pending, query);
                self.stats.reconciliations += 1;
                trace!("controller {}: re-derived {} objects from baseline", self.id, list.len());
                self.materialized = Some(list.clone());
                self.failure = None;
                return Ok(list);
            }
        }

        self.full_fetch()
    }

    fn full_fetch(&mut self) -> Result<Vec<T>, FetchFailure> {
        let (Some(store), Some(query)) = (self.store.as_ref(), self.query.as_ref()) else {
            return Err(FetchFailure::Unbound);
        };
        self.fetch_seq += 1;
        let seq = self.fetch_seq;
        let outcome = store.fetch(query);
        self.stats.fetches += 1;
        self.applied_seq = seq;

        match outcome {
            Ok(list) => {
                debug!("controller {}: fetched {} objects", self.id, list.len());
                self.baseline = Some(list.clone());
                self.materialized = Some(list.clone());
                self.failure = None;
                self.pending.clear();
                Ok(list)
            }
            Err(failure) => {
                warn!("controller {}: fetch failed: {}", self.id, failure);
                self.stats.fetch_failures += 1;
                self.failure = Some(failure.clone());
                Err(failure)
            }
        }
    }

    /// Captures a full fetch to run later, possibly elsewhere.
    pub fn begin_fetch(&mut self) -> Result<FetchTicket<T>, FetchFailure> {
        let (Some(store), Some(query)) = (self.store.as_ref(), self.query.as_ref()) else {
            return Err(FetchFailure::Unbound);
        };
        self.fetch_seq += 1;
        Ok(FetchTicket {
            generation: self.generation,
            change_epoch: self.change_epoch,
            sync_epoch: self.sync_epoch,
            seq: self.fetch_seq,
            query: query.clone(),
            store: Rc::clone(store),
        })
    }

    /// Applies the outcome of a ticket's fetch if it is still current.
    ///
    /// A ticket is stale if the controller was rebound, a later fetch was
    /// already applied, or a commit or remote change arrived since it was
    /// taken. In-transaction changes that arrived meanwhile are reconciled
    /// into the fetched list. Notifies the observer if the result changed.
    pub fn finish_fetch(
        &mut self,
        ticket: FetchTicket<T>,
        outcome: Result<Vec<T>, FetchFailure>,
    ) -> FetchApplied {
        let applied = self.apply_ticket(ticket, outcome);
        self.drain_inbox();
        applied
    }

    fn apply_ticket(&mut self, ticket: FetchTicket<T>, outcome: Result<Vec<T>, FetchFailure>) -> FetchApplied {
        if ticket.generation != self.generation
            || ticket.seq <= self.applied_seq
            || ticket.sync_epoch != self.sync_epoch
        {
            warn!("controller {}: discarding stale fetch {:?}", self.id, ticket);
            self.stats.stale_fetches += 1;
            return FetchApplied::Superseded;
        }
        self.applied_seq = ticket.seq;
        self.stats.fetches += 1;

        let fetched = match outcome {
            Ok(list) => list,
            Err(failure) => {
                warn!("controller {}: fetch failed: {}", self.id, failure);
                self.apply_failure(failure);
                return FetchApplied::Applied;
            }
        };

        if ticket.change_epoch == self.change_epoch {
            self.baseline = Some(fetched.clone());
            self.pending.clear();
            self.replace_materialized(fetched);
            FetchApplied::Applied
        } else {
            let list = reconcile(&fetched, &self.pending, &ticket.query);
            self.stats.reconciliations += 1;
            debug!(
                "controller {}: revalidated fetch against {} pending changes",
                self.id,
                self.pending.len()
            );
            self.baseline = Some(fetched);
            self.replace_materialized(list);
            FetchApplied::Revalidated
        }
    }

    // ------------------------------------------------------------------
    // Change handling
    // ------------------------------------------------------------------

    /// Folds an in-transaction change set into the result.
    ///
    /// `changes` is the store's cumulative change set since the last commit.
    /// Ignored until a baseline exists.
    pub fn on_in_transaction_change(&mut self, changes: ChangeSet<T>) {
        self.handle_in_transaction(changes);
        self.drain_inbox();
    }

    /// Handles a commit of this process's transaction or a remote change.
    pub fn on_commit_or_remote_change(&mut self, origin: ChangeOrigin) {
        self.handle_commit_or_remote(origin);
        self.drain_inbox();
    }

    fn handle_in_transaction(&mut self, changes: ChangeSet<T>) {
        self.change_epoch += 1;
        self.pending = changes;

        if self.policy == RefreshPolicy::Refetch {
            self.refetch();
            return;
        }

        let (Some(baseline), Some(query)) = (&self.baseline, &self.query) else {
            trace!("controller {}: no baseline, change ignored", self.id);
            return;
        };
        let (list, stats) = reconcile_with_stats(baseline, &self.pending, query);
        self.stats.reconciliations += 1;
        trace!("controller {}: reconciled {:?}", self.id, stats);
        self.replace_materialized(list);
    }

    fn handle_commit_or_remote(&mut self, origin: ChangeOrigin) {
        self.sync_epoch += 1;

        if origin == ChangeOrigin::Remote || self.policy == RefreshPolicy::Refetch {
            self.pending.clear();
            self.refetch();
            return;
        }

        let derived = match (&self.materialized, &self.baseline, &self.query) {
            (Some(list), _, _) => Some(list.clone()),
            (None, Some(baseline), Some(query)) => {
                self.stats.reconciliations += 1;
                Some(reconcile(baseline, &self.pending, query))
            }
            _ => None,
        };
        if let Some(list) = derived {
            trace!("controller {}: commit, baseline now {} objects", self.id, list.len());
            self.baseline = Some(list);
        }
        self.pending.clear();
    }

    /// Full fetch replacing baseline and materialized list, notifying if the
    /// result changed. Skipped while nothing has been loaded.
    fn refetch(&mut self) {
        if self.baseline.is_none() && self.materialized.is_none() && self.failure.is_none() {
            return;
        }
        let (Some(store), Some(query)) = (self.store.as_ref(), self.query.as_ref()) else {
            return;
        };
        self.fetch_seq += 1;
        self.applied_seq = self.fetch_seq;
        self.stats.fetches += 1;

        match store.fetch(query) {
            Ok(list) => {
                debug!("controller {}: refetched {} objects", self.id, list.len());
                self.baseline = Some(list.clone());
                self.pending.clear();
                self.replace_materialized(list);
            }
            Err(failure) => {
                warn!("controller {}: refetch failed: {}", self.id, failure);
                self.apply_failure(failure);
            }
        }
    }

    /// Replaces the materialized list, notifying only if it differs.
    fn replace_materialized(&mut self, list: Vec<T>) {
        if self.failure.is_none() && self.materialized.as_ref() == Some(&list) {
            self.stats.suppressed_notifications += 1;
            debug!("controller {}: result unchanged, notification suppressed", self.id);
            return;
        }
        self.notify(move |controller| {
            controller.materialized = Some(list);
            controller.failure = None;
        });
    }

    fn apply_failure(&mut self, failure: FetchFailure) {
        self.stats.fetch_failures += 1;
        if self.failure.as_ref() == Some(&failure) && self.materialized.is_none() {
            self.stats.suppressed_notifications += 1;
            return;
        }
        self.notify(move |controller| {
            controller.baseline = None;
            controller.materialized = None;
            controller.pending.clear();
            controller.failure = Some(failure);
        });
    }

    fn notify(&mut self, apply: impl FnOnce(&mut Self)) {
        let observer = self.observer.as_ref().and_then(Weak::upgrade);
        if let Some(observer) = &observer {
            observer.will_change(self);
        }
        apply(self);
        self.stats.notifications += 1;
        if let Some(observer) = &observer {
            observer.did_change(self);
        }
    }

    fn drain_inbox(&mut self) {
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some((epoch, event)) = next else {
                break;
            };
            if epoch != self.channel_epoch || self.channel.is_none() {
                continue;
            }
            match event {
                StoreEvent::InTransaction(changes) => self.handle_in_transaction(changes),
                StoreEvent::Committed => self.handle_commit_or_remote(ChangeOrigin::Local),
                StoreEvent::RemoteChange => self.handle_commit_or_remote(ChangeOrigin::Remote),
            }
        }
    }
}

impl<T: Model> core::fmt::Debug for LiveResultController<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LiveResultController")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("policy", &self.policy)
            .field("subscribed", &self.is_subscribed())
            .field("materialized", &self.materialized.as_ref().map(Vec::len))
            .field("baseline", &self.baseline.as_ref().map(Vec::len))
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChangeRegistry, EventCallback, SubscriptionId};
    use crate::store::StoreId;
    use alloc::string::String;
    use alloc::vec;
    use core::cell::Cell;
    use vellum_core::{DataType, EntitySchema, ObjectId, Property, Value};
    use vellum_query::Predicate;

    #[derive(Clone, Debug, PartialEq)]
    struct Task {
        id: ObjectId,
        rank: i64,
    }

    impl Model for Task {
        fn schema() -> EntitySchema {
            EntitySchema::new("Task", vec![Property::new("rank", DataType::Int64)])
        }

        fn id(&self) -> ObjectId {
            self.id
        }

        fn field(&self, index: usize) -> Option<Value> {
            (index == 0).then(|| Value::Int64(self.rank))
        }
    }

    fn task(id: u64, rank: i64) -> Task {
        Task {
            id: ObjectId::new(id),
            rank,
        }
    }

    /// A store serving a fixed list, filtered and sorted by the query.
    struct FixedStore {
        id: StoreId,
        objects: RefCell<Vec<Task>>,
        failure: RefCell<Option<String>>,
        fetches: Cell<usize>,
        registry: ChangeRegistry,
    }

    impl FixedStore {
        fn new(objects: Vec<Task>) -> Rc<Self> {
            Rc::new(Self {
                id: StoreId::next(),
                objects: RefCell::new(objects),
                failure: RefCell::new(None),
                fetches: Cell::new(0),
                registry: ChangeRegistry::new(),
            })
        }
    }

    impl Store<Task> for FixedStore {
        fn id(&self) -> StoreId {
            self.id
        }

        fn fetch(&self, query: &Query<Task>) -> Result<Vec<Task>, FetchFailure> {
            self.fetches.set(self.fetches.get() + 1);
            if let Some(message) = self.failure.borrow().clone() {
                return Err(FetchFailure::backend(message));
            }
            let matching: Vec<Task> = self
                .objects
                .borrow()
                .iter()
                .filter(|t| query.matches(t))
                .cloned()
                .collect();
            Ok(query.sort_objects(matching))
        }

        fn subscribe(&self, callback: EventCallback<Task>) -> SubscriptionId {
            self.registry.subscribe(callback)
        }

        fn unsubscribe(&self, id: SubscriptionId) -> bool {
            self.registry.unsubscribe(id)
        }
    }

    #[derive(Default)]
    struct Recorder {
        will: Cell<usize>,
        did: Cell<usize>,
        last_len: Cell<usize>,
    }

    impl ResultObserver<Task> for Recorder {
        fn will_change(&self, _controller: &LiveResultController<Task>) {
            self.will.set(self.will.get() + 1);
        }

        fn did_change(&self, controller: &LiveResultController<Task>) {
            self.did.set(self.did.get() + 1);
            self.last_len.set(controller.materialized().map_or(0, <[Task]>::len));
        }
    }

    fn by_rank() -> Query<Task> {
        Query::builder().ascending("rank").build().unwrap()
    }

    fn rank_above(threshold: i64) -> Query<Task> {
        Query::builder()
            .filter(Predicate::gt("rank", threshold))
            .ascending("rank")
            .build()
            .unwrap()
    }

    fn observed(
        store: &Rc<FixedStore>,
        query: Query<Task>,
    ) -> (Rc<RefCell<LiveResultController<Task>>>, Rc<Recorder>) {
        let controller = LiveResultController::bound(store.clone(), query);
        let recorder = Rc::new(Recorder::default());
        let observer: Rc<dyn ResultObserver<Task>> = recorder.clone();
        controller.borrow_mut().set_observer(Rc::downgrade(&observer));
        (controller, recorder)
    }

    #[test]
    fn test_unbound_result() {
        let controller = LiveResultController::<Task>::new();
        assert_eq!(controller.borrow_mut().result(), Err(FetchFailure::Unbound));
        assert!(matches!(
            controller.borrow().last_result(),
            Some(Err(FetchFailure::Unbound))
        ));
    }

    #[test]
    fn test_result_fetches_once_when_subscribed() {
        let store = FixedStore::new(vec![task(1, 2), task(2, 1)]);
        let (controller, _recorder) = observed(&store, by_rank());

        let first = controller.borrow_mut().result().unwrap();
        let second = controller.borrow_mut().result().unwrap();
        assert_eq!(first, vec![task(2, 1), task(1, 2)]);
        assert_eq!(first, second);
        assert_eq!(store.fetches.get(), 1);
        assert_eq!(controller.borrow().baseline(), Some(first.as_slice()));
    }

    #[test]
    fn test_unsubscribed_result_always_fetches() {
        let store = FixedStore::new(vec![task(1, 1)]);
        let controller = LiveResultController::bound(store.clone(), by_rank());

        controller.borrow_mut().result().unwrap();
        controller.borrow_mut().result().unwrap();
        assert_eq!(store.fetches.get(), 2);
        assert!(!controller.borrow().is_subscribed());
    }

    #[test]
    fn test_lazy_subscribe() {
        let store = FixedStore::new(Vec::new());
        let controller = LiveResultController::bound(store.clone(), by_rank());
        assert_eq!(store.registry.subscriber_count::<Task>(), 0);

        let recorder: Rc<dyn ResultObserver<Task>> = Rc::new(Recorder::default());
        controller.borrow_mut().set_observer(Rc::downgrade(&recorder));
        assert_eq!(store.registry.subscriber_count::<Task>(), 1);

        controller.borrow_mut().clear_observer();
        assert_eq!(store.registry.subscriber_count::<Task>(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let store = FixedStore::new(Vec::new());
        let (controller, _recorder) = observed(&store, by_rank());
        assert_eq!(store.registry.subscriber_count::<Task>(), 1);
        drop(controller);
        assert_eq!(store.registry.subscriber_count::<Task>(), 0);
    }

    #[test]
    fn test_change_ignored_without_baseline() {
        let store = FixedStore::new(Vec::new());
        let (controller, recorder) = observed(&store, by_rank());

        let mut changes = ChangeSet::new();
        changes.insert(task(1, 1));
        controller.borrow_mut().on_in_transaction_change(changes);

        assert_eq!(recorder.did.get(), 0);
        assert!(controller.borrow().materialized().is_none());
    }

    #[test]
    fn test_in_transaction_change_notifies() {
        let store = FixedStore::new(vec![task(1, 5)]);
        let (controller, recorder) = observed(&store, rank_above(1));
        controller.borrow_mut().result().unwrap();

        let mut changes = ChangeSet::new();
        changes.insert(task(2, 3));
        controller.borrow_mut().on_in_transaction_change(changes);

        assert_eq!(recorder.will.get(), 1);
        assert_eq!(recorder.did.get(), 1);
        assert_eq!(recorder.last_len.get(), 2);
        assert_eq!(
            controller.borrow_mut().result().unwrap(),
            vec![task(2, 3), task(1, 5)]
        );
    }

    #[test]
    fn test_unchanged_result_is_suppressed() {
        let store = FixedStore::new(vec![task(1, 5)]);
        let (controller, recorder) = observed(&store, rank_above(1));
        controller.borrow_mut().result().unwrap();

        let mut changes = ChangeSet::new();
        changes.insert(task(2, 0));
        controller.borrow_mut().on_in_transaction_change(changes);

        assert_eq!(recorder.did.get(), 0);
        assert_eq!(controller.borrow().stats().suppressed_notifications, 1);
    }

    #[test]
    fn test_local_commit_promotes_materialized() {
        let store = FixedStore::new(vec![task(1, 5)]);
        let (controller, recorder) = observed(&store, by_rank());
        controller.borrow_mut().result().unwrap();

        let mut changes = ChangeSet::new();
        changes.insert(task(2, 6));
        controller.borrow_mut().on_in_transaction_change(changes);
        controller.borrow_mut().on_commit_or_remote_change(ChangeOrigin::Local);

        let c = controller.borrow();
        assert_eq!(c.baseline(), Some(&[task(1, 5), task(2, 6)][..]));
        assert_eq!(recorder.did.get(), 1);
        assert_eq!(store.fetches.get(), 1);
    }

    #[test]
    fn test_remote_change_refetches() {
        let store = FixedStore::new(vec![task(1, 5)]);
        let (controller, recorder) = observed(&store, by_rank());
        controller.borrow_mut().result().unwrap();

        controller.borrow_mut().on_commit_or_remote_change(ChangeOrigin::Remote);
        assert_eq!(store.fetches.get(), 2);
        assert_eq!(recorder.did.get(), 0);

        store.objects.borrow_mut().push(task(2, 1));
        controller.borrow_mut().on_commit_or_remote_change(ChangeOrigin::Remote);
        assert_eq!(recorder.did.get(), 1);
        assert_eq!(
            controller.borrow().materialized(),
            Some(&[task(2, 1), task(1, 5)][..])
        );
    }

    #[test]
    fn test_failure_is_cached_and_retried() {
        let store = FixedStore::new(vec![task(1, 5)]);
        let (controller, _recorder) = observed(&store, by_rank());

        *store.failure.borrow_mut() = Some("offline".into());
        assert_eq!(
            controller.borrow_mut().result(),
            Err(FetchFailure::backend("offline"))
        );
        assert!(matches!(controller.borrow().last_result(), Some(Err(_))));

        *store.failure.borrow_mut() = None;
        assert_eq!(controller.borrow_mut().result().unwrap(), vec![task(1, 5)]);
        assert_eq!(store.fetches.get(), 2);
    }

    #[test]
    fn test_failed_remote_refetch_clears_and_notifies() {
        let store = FixedStore::new(vec![task(1, 5)]);
        let (controller, recorder) = observed(&store, by_rank());
        controller.borrow_mut().result().unwrap();

        *store.failure.borrow_mut() = Some("gone".into());
        controller.borrow_mut().on_commit_or_remote_change(ChangeOrigin::Remote);

        let c = controller.borrow();
        assert_eq!(recorder.did.get(), 1);
        assert!(c.baseline().is_none());
        assert!(c.materialized().is_none());
        assert_eq!(c.last_result(), Some(Err(&FetchFailure::backend("gone"))));
    }

    #[test]
    fn test_rebind_sort_only_keeps_baseline() {
        let store = FixedStore::new(vec![task(1, 1), task(2, 2)]);
        let (controller, _recorder) = observed(&store, by_rank());
        controller.borrow_mut().result().unwrap();

        let descending = Query::builder().descending("rank").build().unwrap();
        controller.borrow_mut().bind(store.clone(), descending);
        assert!(controller.borrow().materialized().is_none());
        assert!(controller.borrow().baseline().is_some());

        let list = controller.borrow_mut().result().unwrap();
        assert_eq!(list, vec![task(2, 2), task(1, 1)]);
        assert_eq!(store.fetches.get(), 1);
    }

    #[test]
    fn test_rebind_predicate_refetches() {
        let store = FixedStore::new(vec![task(1, 1), task(2, 2)]);
        let (controller, _recorder) = observed(&store, rank_above(1));
        assert_eq!(controller.borrow_mut().result().unwrap(), vec![task(2, 2)]);

        controller.borrow_mut().bind(store.clone(), by_rank());
        assert!(controller.borrow().baseline().is_none());
        assert_eq!(controller.borrow_mut().result().unwrap().len(), 2);
        assert_eq!(store.fetches.get(), 2);
    }

    #[test]
    fn test_rebind_same_query_is_noop() {
        let store = FixedStore::new(vec![task(1, 1)]);
        let (controller, _recorder) = observed(&store, by_rank());
        controller.borrow_mut().result().unwrap();

        controller.borrow_mut().bind(store.clone(), by_rank());
        assert!(controller.borrow().materialized().is_some());
    }

    #[test]
    fn test_rebind_other_store_moves_channel() {
        let first = FixedStore::new(vec![task(1, 1)]);
        let second = FixedStore::new(vec![task(2, 2)]);
        let (controller, _recorder) = observed(&first, by_rank());
        controller.borrow_mut().result().unwrap();

        controller.borrow_mut().bind(second.clone(), by_rank());
        assert_eq!(first.registry.subscriber_count::<Task>(), 0);
        assert_eq!(second.registry.subscriber_count::<Task>(), 1);
        assert!(controller.borrow().baseline().is_none());
        assert_eq!(controller.borrow_mut().result().unwrap(), vec![task(2, 2)]);
    }

    #[test]
    fn test_ticket_superseded_by_rebind() {
        let store = FixedStore::new(vec![task(1, 1)]);
        let (controller, _recorder) = observed(&store, by_rank());

        let ticket = controller.borrow_mut().begin_fetch().unwrap();
        let outcome = ticket.execute();
        controller.borrow_mut().bind(store.clone(), rank_above(0));

        assert_eq!(
            controller.borrow_mut().finish_fetch(ticket, outcome),
            FetchApplied::Superseded
        );
        assert!(controller.borrow().materialized().is_none());
        assert_eq!(controller.borrow().stats().stale_fetches, 1);
    }

    #[test]
    fn test_ticket_superseded_by_newer_fetch() {
        let store = FixedStore::new(vec![task(1, 1)]);
        let (controller, _recorder) = observed(&store, by_rank());

        let older = controller.borrow_mut().begin_fetch().unwrap();
        let newer = controller.borrow_mut().begin_fetch().unwrap();
        let newer_outcome = newer.execute();
        let older_outcome = older.execute();

        let mut c = controller.borrow_mut();
        assert_eq!(c.finish_fetch(newer, newer_outcome), FetchApplied::Applied);
        assert_eq!(c.finish_fetch(older, older_outcome), FetchApplied::Superseded);
    }

    #[test]
    fn test_ticket_superseded_by_remote_change() {
        let store = FixedStore::new(vec![task(1, 1)]);
        let (controller, _recorder) = observed(&store, by_rank());

        let ticket = controller.borrow_mut().begin_fetch().unwrap();
        let outcome = ticket.execute();
        controller.borrow_mut().on_commit_or_remote_change(ChangeOrigin::Remote);

        assert_eq!(
            controller.borrow_mut().finish_fetch(ticket, outcome),
            FetchApplied::Superseded
        );
    }

    #[test]
    fn test_ticket_revalidated_by_in_transaction_change() {
        let store = FixedStore::new(vec![task(1, 1)]);
        let (controller, recorder) = observed(&store, by_rank());

        let ticket = controller.borrow_mut().begin_fetch().unwrap();
        let outcome = ticket.execute();

        let mut changes = ChangeSet::new();
        changes.insert(task(2, 0));
        controller.borrow_mut().on_in_transaction_change(changes);

        assert_eq!(
            controller.borrow_mut().finish_fetch(ticket, outcome),
            FetchApplied::Revalidated
        );
        assert_eq!(
            controller.borrow().materialized(),
            Some(&[task(2, 0), task(1, 1)][..])
        );
        assert_eq!(recorder.did.get(), 1);
    }

    #[test]
    fn test_refetch_policy() {
        let store = FixedStore::new(vec![task(1, 1)]);
        let (controller, recorder) = observed(&store, by_rank());
        controller.borrow_mut().set_refresh_policy(RefreshPolicy::Refetch);
        controller.borrow_mut().result().unwrap();

        store.objects.borrow_mut().push(task(2, 2));
        let mut changes = ChangeSet::new();
        changes.insert(task(2, 2));
        controller.borrow_mut().on_in_transaction_change(changes);

        assert_eq!(store.fetches.get(), 2);
        assert_eq!(recorder.did.get(), 1);
        assert_eq!(controller.borrow().materialized().map(<[Task]>::len), Some(2));
    }

    #[test]
    fn test_dropped_observer_is_skipped() {
        let store = FixedStore::new(vec![task(1, 1)]);
        let (controller, recorder) = observed(&store, by_rank());
        controller.borrow_mut().result().unwrap();
        drop(recorder);

        let mut changes = ChangeSet::new();
        changes.insert(task(2, 2));
        controller.borrow_mut().on_in_transaction_change(changes);
        assert_eq!(controller.borrow().stats().notifications, 1);
    }
}
