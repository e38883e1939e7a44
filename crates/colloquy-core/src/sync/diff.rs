//! Classify candidate objects against local state into insert/update/delete.

use std::collections::HashMap;

use crate::sync::syncable::Syncable;

/// Result of classifying a candidate batch.
///
/// The three sets are disjoint and preserve input order within each.
#[derive(Debug, Clone)]
pub struct Diff<T> {
    /// Objects with no local row
    pub insert: Vec<T>,
    /// Objects strictly newer than their local row
    pub update: Vec<T>,
    /// Tombstones; win over any concurrent update regardless of timestamp
    pub delete: Vec<T>,
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            insert: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<T> Diff<T> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Classify `candidates` against the local rows sharing their object ids.
///
/// - not found locally: insert
/// - found locally, candidate tombstoned: delete, regardless of timestamp
/// - found locally, candidate strictly newer: update
/// - otherwise: dropped silently (local state already newer or equal)
///
/// The local `modified` column is the single source of truth for conflict
/// resolution: last-writer-wins by modification time, deletes sticky.
pub fn diff<T: Syncable>(candidates: Vec<T>, local: &[T]) -> Diff<T> {
    let local_by_id: HashMap<&str, &T> =
        local.iter().map(|row| (row.object_id(), row)).collect();

    let mut result = Diff::default();
    for candidate in candidates {
        match local_by_id.get(candidate.object_id()) {
            None => result.insert.push(candidate),
            Some(existing) => {
                if candidate.removed() {
                    result.delete.push(candidate);
                } else if candidate.modified() > existing.modified() {
                    result.update.push(candidate);
                }
                // stale or duplicate: drop
            }
        }
    }
    result
}

/// Sort objects by ascending `modified` so the log reflects causal intent
/// order even when diff ran out of order.
pub fn sort_by_modified<T: Syncable>(objects: &mut [T]) {
    objects.sort_by_key(Syncable::modified);
}
