//! Vellum Storage - In-memory reference store for the Vellum live-query engine.
//!
//! This crate provides:
//!
//! - `MemoryStore`: per-type object tables with a single open transaction,
//!   implementing `vellum_reactive::Store` for every registered model
//! - `RemoteWriter`: direct writes to committed state, announced as remote changes
//! - `StoreError`: mutation errors
//!
//! # Features
//!
//! - `hash-store`: keep committed objects in a hash map instead of a B-tree
//! - `debug-events`: log every published store event at trace level
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use vellum_reactive::LiveResultController;
//! use vellum_storage::MemoryStore;
//!
//! let store = Rc::new(MemoryStore::new());
//! store.register::<Task>();
//!
//! let controller = LiveResultController::bound(store.clone(), open_tasks);
//! controller.borrow_mut().set_observer(Rc::downgrade(&observer));
//!
//! store.insert(task)?;   // controller reconciles, observer notified
//! store.save();          // controller promotes its result to baseline
//! ```

#![no_std]

extern crate alloc;

mod error;
mod memory_store;
mod table;

pub use error::{Result, StoreError};
pub use memory_store::{MemoryStore, RemoteWriter};
