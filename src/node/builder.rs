//! A builder for assembling a [`FeedNode`].
//!
//! [`FeedNodeBuilder`] wires the document store, the change feed, the
//! metadata cache and its refresher, and the server state from a
//! [`FeedConfig`]. Every component has a production default; the setters
//! replace individual pieces.
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = FeedNodeBuilder::new(config, shutdown_rx)
//!     .clock(custom_clock) // Optional override
//!     .build()
//!     .await?;
//! node.run().await?;
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use crate::metrics;
use crate::Broadcaster;
use crate::ChangeFeed;
use crate::Clock;
use crate::DedupWindow;
use crate::DocumentSink;
use crate::DocumentStore;
use crate::FeedConfig;
use crate::FeedNode;
use crate::MetadataCache;
use crate::MetadataRefresher;
use crate::Result;
use crate::ServerState;
use crate::SledDocumentStore;
use crate::SubscriberHub;
use crate::SystemClock;
use crate::WatermarkPoller;

pub struct FeedNodeBuilder {
    pub(super) config: FeedConfig,
    pub(super) store: Option<Arc<dyn DocumentStore>>,
    pub(super) sink: Option<Arc<dyn DocumentSink>>,
    pub(super) hub: Option<Arc<SubscriberHub>>,
    pub(super) broadcaster: Option<Arc<dyn Broadcaster>>,
    pub(super) clock: Option<Arc<dyn Clock>>,
    pub(super) shutdown_signal: watch::Receiver<()>,
}

impl FeedNodeBuilder {
    /// `config` is expected to be validated already.
    pub fn new(
        config: FeedConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            store: None,
            sink: None,
            hub: None,
            broadcaster: None,
            clock: None,
            shutdown_signal,
        }
    }

    /// Read side used by the poller and the metadata cache. Without it a sled
    /// store is opened at `store.path`, which then also backs ingest.
    pub fn store(
        mut self,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn sink(
        mut self,
        sink: Arc<dyn DocumentSink>,
    ) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Registry backing `/ws`
    pub fn hub(
        mut self,
        hub: Arc<SubscriberHub>,
    ) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Replaces the hub as the target of published batches.
    pub fn broadcaster(
        mut self,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn clock(
        mut self,
        clock: Arc<dyn Clock>,
    ) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Assembles the node and performs the initial device mapping load.
    ///
    /// The initial load is best effort: on failure the node starts with an
    /// empty mapping and the refresh timer keeps retrying.
    ///
    /// # Errors
    /// `StoreError::Open` when the default sled store cannot be opened.
    pub async fn build(self) -> Result<FeedNode> {
        let config = self.config;

        let (store, sink) = match self.store {
            Some(store) => (store, self.sink),
            None => {
                let sled = Arc::new(SledDocumentStore::open(&config.store.path, config.store.flush_every_ms)?);
                info!(path = ?config.store.path, "document store opened");
                let sink = self.sink.unwrap_or_else(|| sled.clone());
                (sled as Arc<dyn DocumentStore>, Some(sink))
            }
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let hub = self
            .hub
            .unwrap_or_else(|| Arc::new(SubscriberHub::with_queue_capacity(config.server.subscriber_queue_capacity)));
        let broadcaster = self.broadcaster.unwrap_or_else(|| hub.clone());

        let metadata = Arc::new(MetadataCache::new(store.clone(), config.metadata.producer_id.clone()));
        if let Err(e) = metadata.refresh().await {
            warn!("initial device mapping load failed, starting with an empty mapping: {}", e);
        }

        let poller = WatermarkPoller::new(store, clock, config.poller.batch_size);
        let feed = ChangeFeed::new(
            poller,
            DedupWindow::new(config.dedup.capacity, config.dedup.keep),
            metadata.clone(),
            broadcaster,
            config.poller.interval(),
        );
        let refresher = MetadataRefresher::new(metadata.clone(), config.metadata.refresh_interval());

        if config.monitoring.metrics_enabled {
            metrics::register_custom_metrics();
        }

        let state = Arc::new(ServerState {
            hub,
            feed_status: feed.status(),
            cycle_guard: feed.guard(),
            metadata,
            sink,
            metrics_enabled: config.monitoring.metrics_enabled,
            ingest_enabled: config.server.ingest_enabled,
        });

        Ok(FeedNode {
            config,
            feed,
            refresher,
            state,
            shutdown_signal: self.shutdown_signal,
        })
    }
}
