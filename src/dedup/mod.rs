//! Bounded window of recently forwarded reading ids.
//!
//! Owned by the single poll-cycle actor, so it carries no synchronization.
//! The window is process-local and starts empty on every restart.


use std::collections::HashSet;
use std::collections::VecDeque;

use tracing::debug;

use crate::metrics;
use crate::Reading;

/// Split of one poll batch
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DedupOutcome {
    /// Not seen before, in the order the store returned them
    pub forwarded: Vec<Reading>,
    /// Already in the window (or repeated within the batch)
    pub dropped: Vec<Reading>,
}

#[derive(Debug)]
pub struct DedupWindow {
    /// Insertion order, oldest at the front
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
    keep: usize,
}

impl DedupWindow {
    /// `keep` must be smaller than `capacity`; config validation enforces it.
    pub fn new(
        capacity: usize,
        keep: usize,
    ) -> Self {
        debug_assert!(keep < capacity);
        Self {
            order: VecDeque::with_capacity(capacity + 1),
            seen: HashSet::with_capacity(capacity + 1),
            capacity,
            keep,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.seen.contains(id)
    }

    /// Partitions `batch` and marks every forwarded id as seen before
    /// returning, so a later enrichment or publish failure does not cause
    /// re-delivery.
    pub fn filter(
        &mut self,
        batch: Vec<Reading>,
    ) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        for reading in batch {
            if self.seen.contains(&reading.id) {
                outcome.dropped.push(reading);
            } else {
                self.insert(reading.id.clone());
                outcome.forwarded.push(reading);
            }
        }

        metrics::READINGS_FORWARDED.inc_by(outcome.forwarded.len() as u64);
        metrics::DUPLICATES_DROPPED.inc_by(outcome.dropped.len() as u64);
        if !outcome.dropped.is_empty() {
            debug!(
                dropped = outcome.dropped.len(),
                forwarded = outcome.forwarded.len(),
                "duplicate readings dropped"
            );
        }
        outcome
    }

    /// Inserts one id and trims the window back to `keep` once it grows past
    /// `capacity`. Only the oldest ids are evicted.
    fn insert(
        &mut self,
        id: String,
    ) {
        self.seen.insert(id.clone());
        self.order.push_back(id);

        if self.order.len() > self.capacity {
            let evict = self.order.len() - self.keep;
            for old in self.order.drain(..evict) {
                self.seen.remove(&old);
            }
            debug!(evicted = evict, remaining = self.order.len(), "dedup window trimmed");
        }
    }
}
