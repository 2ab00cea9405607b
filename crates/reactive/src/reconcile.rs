//! Incremental reconciliation of a baseline with a change set.
//!
//! `reconcile` rebuilds the result of a query from the last known ground
//! truth plus the changes made since, without asking the store:
//!
//! 1. start from the identities of the baseline
//! 2. drop every deleted identity
//! 3. drop every updated or inserted identity, then admit its current value
//!    if the predicate accepts it
//! 4. sort by the query order, ties broken by identity
//!
//! Every touched identity is decided by its value in the change set alone,
//! so the baseline may already reflect some of those changes (a fetch taken
//! mid-transaction) and the outcome is the same.
//!
//! The function is total for any query that passed validation.

use alloc::vec::Vec;
use hashbrown::HashMap;
use vellum_core::{Model, ObjectId};
use vellum_query::sort::{sort_keyed, Keyed};
use vellum_query::Query;

use crate::change_set::ChangeSet;

/// What one reconciliation did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Baseline objects carried over untouched.
    pub retained: usize,
    /// Objects that left the result (deleted, or updated and now rejected).
    pub removed: usize,
    /// Updated or inserted objects that were in the baseline and still match.
    pub readmitted: usize,
    /// Objects that entered the result (inserted, or updated and newly matching).
    pub admitted: usize,
    /// True if the sorted baseline was returned without rebuilding.
    pub fast_path: bool,
}

/// Computes the new result list. See the module docs.
pub fn reconcile<T: Model>(baseline: &[T], changes: &ChangeSet<T>, query: &Query<T>) -> Vec<T> {
    reconcile_with_stats(baseline, changes, query).0
}

/// Like [`reconcile`], also reporting what changed.
pub fn reconcile_with_stats<T: Model>(
    baseline: &[T],
    changes: &ChangeSet<T>,
    query: &Query<T>,
) -> (Vec<T>, ReconcileStats) {
    let mut stats = ReconcileStats::default();

    if changes.is_empty() && query.is_sorted(baseline) {
        stats.retained = baseline.len();
        stats.fast_path = true;
        return (baseline.to_vec(), stats);
    }

    let mut members: HashMap<ObjectId, T> = HashMap::with_capacity(baseline.len() + changes.len());
    for object in baseline {
        members.insert(object.id(), object.clone());
    }

    for id in changes.deleted() {
        if members.remove(&id).is_some() {
            stats.removed += 1;
        }
    }

    for object in changes.updated().chain(changes.inserted()) {
        let id = object.id();
        let was_member = members.remove(&id).is_some();
        if query.matches(object) {
            members.insert(id, object.clone());
            if was_member {
                stats.readmitted += 1;
            } else {
                stats.admitted += 1;
            }
        } else if was_member {
            stats.removed += 1;
        }
    }

    stats.retained = members.len() - stats.readmitted - stats.admitted;

    let keys = query.sort();
    let mut keyed: Vec<Keyed<T>> = members
        .into_iter()
        .map(|(_, object)| Keyed::new(keys, object))
        .collect();
    sort_keyed(keys, &mut keyed);

    (keyed.into_iter().map(|k| k.object).collect(), stats)
}
