use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use chrono::DateTime;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

use super::TickOutcome;

/// Last observed state of the poll cycle, readable from outside the actor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub watermark: DateTime<Utc>,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<TickOutcome>,
    pub dedup_window_len: usize,
    pub ticks_skipped: u64,
}

#[derive(Debug)]
pub struct FeedStatus {
    inner: Mutex<FeedSnapshot>,
    ticks_skipped: AtomicU64,
}

impl FeedStatus {
    pub fn new(watermark: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(FeedSnapshot {
                watermark,
                last_tick_at: None,
                last_outcome: None,
                dedup_window_len: 0,
                ticks_skipped: 0,
            }),
            ticks_skipped: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_tick(
        &self,
        watermark: DateTime<Utc>,
        outcome: TickOutcome,
        dedup_window_len: usize,
    ) {
        let mut inner = self.inner.lock();
        inner.watermark = watermark;
        inner.last_tick_at = Some(Utc::now());
        inner.last_outcome = Some(outcome);
        inner.dedup_window_len = dedup_window_len;
    }

    pub(crate) fn record_skip(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let mut snapshot = self.inner.lock().clone();
        snapshot.ticks_skipped = self.ticks_skipped();
        snapshot
    }
}
