//! Vellum Reactive - Live query results maintained incrementally.
//!
//! This crate keeps the result of a query synchronized with a transactional
//! store. Instead of re-running the query after every mutation, the store's
//! pending change set is reconciled against the last known result, and
//! observers are told only when the result list actually changes.
//!
//! # Core Concepts
//!
//! - `ChangeSet`: Cumulative inserted/updated/deleted objects of one type
//! - `reconcile`: Pure function (baseline, changes, query) -> new result
//! - `LiveResultController`: Owns one query bound to one store
//! - `ChangeRegistry` / `ChangeChannel`: Typed store-owned subscriptions
//! - `Store`: The contract a store implements for live results
//!
//! # Example
//!
//! ```ignore
//! use vellum_reactive::{LiveResultController, ResultObserver};
//!
//! let controller = LiveResultController::bound(store.clone(), query);
//! controller.borrow_mut().set_observer(Rc::downgrade(&observer));
//!
//! let tasks = controller.borrow_mut().result()?; // full fetch
//! store.insert(task)?;                             // reconciled, observer notified
//! store.save();                                    // baseline promoted, no fetch
//! ```

#![no_std]

extern crate alloc;

pub mod change_set;
pub mod channel;
pub mod controller;
mod error;
pub mod observer;
pub mod reconcile;
pub mod store;

pub use change_set::ChangeSet;
pub use channel::{ChangeChannel, ChangeRegistry, EventCallback, StoreEvent, SubscriptionId};
pub use controller::{
    ChangeOrigin, ControllerId, ControllerStats, FetchApplied, FetchTicket, LiveResultController,
    RefreshPolicy,
};
pub use error::FetchFailure;
pub use observer::ResultObserver;
pub use reconcile::{reconcile, reconcile_with_stats, ReconcileStats};
pub use store::{Store, StoreId};
