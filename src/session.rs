//! Operator lock/exclusion session.
//!
//! A [`CurationSession`] tracks the item indices an operator has pinned out
//! of randomized contention. Locking is monotonic until cleared and
//! orthogonal to any single curation run: the caller owns the session and
//! passes its current lock set as the exclusion set on every `curate` call,
//! so the algorithm never reconsiders pinned items. The typical workflow is
//! to lock the clear winners of one run and re-run curation on the remainder
//! with a different target.

use std::collections::HashSet;

use crate::models::FrequencyRecord;

/// Caller-owned lock state, scoped to one browsing session.
#[derive(Debug, Clone, Default)]
pub struct CurationSession {
    locked: HashSet<usize>,
}

impl CurationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session from an existing lock set (e.g. a client-supplied
    /// `excluded_indices` list).
    pub fn from_locked(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            locked: indices.into_iter().collect(),
        }
    }

    /// Pin an item out of further contention. Idempotent.
    pub fn lock(&mut self, index: usize) -> bool {
        self.locked.insert(index)
    }

    /// Release a pinned item. Idempotent.
    pub fn unlock(&mut self, index: usize) -> bool {
        self.locked.remove(&index)
    }

    /// Bulk-lock a list, e.g. to freeze the current winning selection before
    /// re-running with a larger target.
    pub fn lock_all(&mut self, indices: &[usize]) {
        self.locked.extend(indices.iter().copied());
    }

    /// Lock every item whose consensus frequency meets `threshold` percent,
    /// graduating high-confidence items out of randomized contention.
    /// Returns the number of newly locked items; already-locked items are
    /// never re-counted.
    pub fn lock_by_threshold(&mut self, table: &[FrequencyRecord], threshold: f64) -> usize {
        let mut newly_locked = 0;
        for record in table {
            if record.frequency >= threshold && self.locked.insert(record.index) {
                newly_locked += 1;
            }
        }
        newly_locked
    }

    /// Unlock everything.
    pub fn clear(&mut self) {
        self.locked.clear();
    }

    pub fn is_locked(&self, index: usize) -> bool {
        self.locked.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.locked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked.is_empty()
    }

    /// The current lock set, to be passed to the engine as the exclusion set.
    pub fn excluded(&self) -> &HashSet<usize> {
        &self.locked
    }

    /// Locked indices in ascending order, for display.
    pub fn sorted(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self.locked.iter().copied().collect();
        v.sort_unstable();
        v
    }
}
