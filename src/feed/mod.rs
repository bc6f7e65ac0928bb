//! The poll cycle: poll, filter, enrich, publish.
//!
//! [`ChangeFeed`] owns the poller and the dedup window and is driven by a
//! single task, so neither needs locking. A separate timer task hands ticks
//! over a one-slot channel and only while the [`CycleGuard`] reads `Idle`; a
//! tick that fires while a cycle is still in flight is dropped, never queued.

mod cycle;
mod enrich;
mod status;
pub use cycle::*;
pub use enrich::*;
pub use status::*;


use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::metrics;
use crate::Broadcaster;
use crate::DedupOutcome;
use crate::DedupWindow;
use crate::MetadataCache;
use crate::WatermarkPoller;

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickOutcome {
    /// A previous cycle was still running
    Skipped,
    /// The query returned nothing
    Empty,
    /// The query failed; the watermark was not moved
    Failed,
    /// Every polled reading had already been forwarded
    AllDuplicates { dropped: usize },
    Published {
        forwarded: usize,
        dropped: usize,
        subscribers: usize,
    },
}

pub struct ChangeFeed {
    poller: WatermarkPoller,
    dedup: DedupWindow,
    metadata: Arc<MetadataCache>,
    broadcaster: Arc<dyn Broadcaster>,
    guard: Arc<CycleGuard>,
    status: Arc<FeedStatus>,
    poll_interval: Duration,
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("watermark", &self.poller.watermark())
            .field("dedup_window_len", &self.dedup.len())
            .field("state", &self.guard.state())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl ChangeFeed {
    pub fn new(
        poller: WatermarkPoller,
        dedup: DedupWindow,
        metadata: Arc<MetadataCache>,
        broadcaster: Arc<dyn Broadcaster>,
        poll_interval: Duration,
    ) -> Self {
        let status = Arc::new(FeedStatus::new(poller.watermark()));
        Self {
            poller,
            dedup,
            metadata,
            broadcaster,
            guard: Arc::new(CycleGuard::new()),
            status,
            poll_interval,
        }
    }

    pub fn guard(&self) -> Arc<CycleGuard> {
        self.guard.clone()
    }

    pub fn status(&self) -> Arc<FeedStatus> {
        self.status.clone()
    }

    pub fn poller(&self) -> &WatermarkPoller {
        &self.poller
    }

    pub fn dedup(&self) -> &DedupWindow {
        &self.dedup
    }

    /// Runs one full cycle.
    ///
    /// Never fails: a query failure ends the cycle with [`TickOutcome::Failed`]
    /// and leaves the watermark for the next tick. `publish` is only called
    /// with a non-empty batch.
    pub async fn tick(&mut self) -> TickOutcome {
        let guard = self.guard.clone();
        let Some(token) = guard.try_begin() else {
            self.status.record_skip();
            metrics::TICKS_SKIPPED.inc();
            debug!(state = ?guard.state(), "cycle already in flight, tick skipped");
            return TickOutcome::Skipped;
        };

        let started = Instant::now();
        let outcome = match self.poller.poll().await {
            // already logged by the poller
            Err(_) => TickOutcome::Failed,
            Ok(batch) if batch.is_empty() => TickOutcome::Empty,
            Ok(batch) => {
                token.enter(CycleState::Filtering);
                let DedupOutcome { forwarded, dropped } = self.dedup.filter(batch);

                if forwarded.is_empty() {
                    TickOutcome::AllDuplicates { dropped: dropped.len() }
                } else {
                    token.enter(CycleState::Enriching);
                    let mapping = self.metadata.snapshot();
                    let events = enrich(forwarded, &mapping);

                    token.enter(CycleState::Publishing);
                    let subscribers = self.broadcaster.publish(&events);
                    TickOutcome::Published {
                        forwarded: events.len(),
                        dropped: dropped.len(),
                        subscribers,
                    }
                }
            }
        };

        metrics::POLL_DURATION_MS.observe(started.elapsed().as_secs_f64() * 1000.0);
        self.status
            .record_tick(self.poller.watermark(), outcome.clone(), self.dedup.len());
        trace!(?outcome, watermark = %self.poller.watermark(), "tick complete");

        drop(token);
        outcome
    }

    /// Drives the cycle on its interval until shutdown.
    ///
    /// The first poll happens one full interval after start. On shutdown an
    /// in-flight cycle is abandoned; its watermark advance, if not yet made,
    /// is simply lost.
    pub async fn run(
        mut self,
        mut shutdown_rx: watch::Receiver<()>,
    ) {
        let (tick_tx, mut tick_rx) = mpsc::channel::<()>(1);
        let timer = tokio::spawn(drive_ticks(
            self.poll_interval,
            self.guard.clone(),
            self.status.clone(),
            tick_tx,
            shutdown_rx.clone(),
        ));

        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.poller.batch_size(),
            watermark = %self.poller.watermark(),
            "ChangeFeed started"
        );

        loop {
            tokio::select! {
                maybe_tick = tick_rx.recv() => {
                    if maybe_tick.is_none() {
                        break;
                    }
                    tokio::select! {
                        _ = self.tick() => {}
                        _ = shutdown_rx.changed() => {
                            debug!("shutdown during cycle, abandoning it");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("ChangeFeed received shutdown signal");
                    break;
                }
            }
        }

        timer.abort();
        info!(watermark = %self.poller.watermark(), "ChangeFeed stopped");
    }
}

/// Timer side of the cycle. Forwards a tick only when the cycle is idle and
/// the slot is free.
async fn drive_ticks(
    poll_interval: Duration,
    guard: Arc<CycleGuard>,
    status: Arc<FeedStatus>,
    tick_tx: mpsc::Sender<()>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    let mut timer = interval(poll_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Skip the immediate tick
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => {
                if !guard.is_idle() {
                    status.record_skip();
                    metrics::TICKS_SKIPPED.inc();
                    debug!(state = ?guard.state(), "cycle still in flight, tick skipped");
                    continue;
                }
                match tick_tx.try_send(()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        status.record_skip();
                        metrics::TICKS_SKIPPED.inc();
                        debug!("pending tick not yet taken, tick skipped");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}
