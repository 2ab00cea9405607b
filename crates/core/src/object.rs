//! Object identity and the `Model` trait.
//!
//! Every object a store hands out has a stable `ObjectId` that does not depend
//! on its field values. Set membership during reconciliation is decided by
//! identity, never by value equality.

use crate::schema::EntitySchema;
use crate::value::Value;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Stable identity of a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Creates an identity from its raw value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Global identity counter.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh, process-unique object identity.
pub fn next_object_id() -> ObjectId {
    ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::SeqCst))
}

/// Bumps the allocator past `id` so ids chosen by callers never collide with
/// allocated ones.
pub fn reserve_object_id(id: ObjectId) {
    NEXT_OBJECT_ID.fetch_max(id.0.saturating_add(1), Ordering::SeqCst);
}

/// A type whose instances live in a store and can be queried.
///
/// `field(index)` must return a value for every property index listed by
/// `schema()`, typed as the schema declares (or `Value::Null` for nullable
/// properties). Queries resolve property names to indices once, at build
/// time.
pub trait Model: Clone + fmt::Debug + PartialEq + 'static {
    /// Describes the queryable properties of this type.
    fn schema() -> EntitySchema;

    /// Returns the stable identity of this object.
    fn id(&self) -> ObjectId;

    /// Returns the value of the property at `index`.
    fn field(&self, index: usize) -> Option<Value>;
}
