use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;

use super::MetadataCache;

/// Periodically refreshes the [`MetadataCache`] on its own timer, decoupled
/// from the poll cycle.
pub struct MetadataRefresher {
    cache: Arc<MetadataCache>,
    refresh_interval: Duration,
}

impl MetadataRefresher {
    pub fn new(
        cache: Arc<MetadataCache>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            cache,
            refresh_interval,
        }
    }

    /// Runs until the shutdown signal fires. The startup load happens in the
    /// node builder, so the first tick here is one full interval away.
    pub async fn run(
        self,
        mut shutdown_rx: watch::Receiver<()>,
    ) {
        let mut timer = interval(self.refresh_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate tick
        timer.tick().await;

        info!(
            producer_id = self.cache.producer_id(),
            refresh_interval_secs = self.refresh_interval.as_secs(),
            "MetadataRefresher started"
        );

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    // failure already logged and recorded by the cache
                    let _ = self.cache.refresh().await;
                }
                _ = shutdown_rx.changed() => {
                    debug!("MetadataRefresher received shutdown signal");
                    break;
                }
            }
        }

        info!("MetadataRefresher stopped");
    }
}
