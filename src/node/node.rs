//! The running bridge: change feed, metadata refresher and server.
//!
//! ## Example Usage
//! ```ignore
//! let node = FeedNodeBuilder::new(config, shutdown_rx).build().await?;
//! node.run().await?;
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::error;
use tracing::info;

use crate::server;
use crate::ChangeFeed;
use crate::FeedConfig;
use crate::FeedStatus;
use crate::MetadataCache;
use crate::MetadataRefresher;
use crate::Result;
use crate::ServerState;
use crate::SubscriberHub;

pub struct FeedNode {
    pub(crate) config: FeedConfig,
    pub(crate) feed: ChangeFeed,
    pub(crate) refresher: MetadataRefresher,
    pub(crate) state: Arc<ServerState>,
    pub(crate) shutdown_signal: watch::Receiver<()>,
}

impl FeedNode {
    pub fn hub(&self) -> Arc<SubscriberHub> {
        self.state.hub.clone()
    }

    pub fn metadata(&self) -> Arc<MetadataCache> {
        self.state.metadata.clone()
    }

    pub fn feed_status(&self) -> Arc<FeedStatus> {
        self.state.feed_status.clone()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Runs until the shutdown signal fires.
    ///
    /// # Errors
    /// `Error::Fatal` when the server cannot bind its listen address; the
    /// feed and refresher are stopped before returning.
    pub async fn run(self) -> Result<()> {
        let FeedNode {
            config,
            feed,
            refresher,
            state,
            shutdown_signal,
        } = self;

        let feed_handle = tokio::spawn(feed.run(shutdown_signal.clone()));
        let refresher_handle = tokio::spawn(refresher.run(shutdown_signal.clone()));

        let hub = state.hub.clone();
        let served = server::serve(state, config.server.clone(), shutdown_signal).await;
        hub.close_all();

        if let Err(e) = served {
            error!("server failed: {}", e);
            feed_handle.abort();
            refresher_handle.abort();
            return Err(e);
        }

        if let Err(e) = feed_handle.await {
            error!("change feed task failed: {:?}", e);
        }
        if let Err(e) = refresher_handle.await {
            error!("metadata refresher task failed: {:?}", e);
        }

        info!("FeedNode stopped");
        Ok(())
    }
}

impl std::fmt::Debug for FeedNode {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FeedNode")
            .field("config", &self.config)
            .field("feed", &self.feed)
            .finish()
    }
}

