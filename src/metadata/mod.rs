//! Device metadata cache.
//!
//! Writers are the refresh timer and the producer upsert route; refreshes are
//! serialized so a slow fetch of an older roster cannot land after a newer
//! one. Readers are each tick's enrichment step. The mapping is immutable once
//! built and replaced wholesale through an [`ArcSwap`], so readers never see a
//! partially updated mapping and never wait on a refresh.

mod refresher;
pub use refresher::*;

#[cfg(test)]
mod metadata_test;

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::DateTime;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::metrics;
use crate::DeviceInfo;
use crate::DocumentStore;
use crate::FeedError;
use crate::Producer;

/// `deviceId -> {name, owner}`
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeviceMapping {
    devices: HashMap<String, DeviceInfo>,
}

impl DeviceMapping {
    pub fn from_producer(producer: &Producer) -> Self {
        let devices = producer
            .devices
            .iter()
            .map(|d| (d.device_id.clone(), DeviceInfo::new(d.name.clone(), producer.owner.clone())))
            .collect();
        Self { devices }
    }

    /// Sentinel on miss, never an error.
    pub fn resolve(
        &self,
        device_id: &str,
    ) -> DeviceInfo {
        self.devices.get(device_id).cloned().unwrap_or_else(DeviceInfo::unknown)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Outcome of the refresh cycle, exposed on `/status`.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RefreshStatus {
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub device_count: usize,
}

pub struct MetadataCache {
    store: Arc<dyn DocumentStore>,
    producer_id: String,
    mapping: ArcSwap<DeviceMapping>,
    status: Mutex<RefreshStatus>,
    /// Held across fetch and install
    refresh_lock: tokio::sync::Mutex<()>,
}

impl MetadataCache {
    /// Starts with an empty mapping: every device resolves to the sentinel
    /// until the first successful refresh.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        producer_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            producer_id: producer_id.into(),
            mapping: ArcSwap::from_pointee(DeviceMapping::default()),
            status: Mutex::new(RefreshStatus::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    /// Fetches the roster and installs a freshly built mapping.
    ///
    /// Best effort: on any failure the installed mapping is left untouched,
    /// the failure is logged and recorded in [`RefreshStatus`], and the error
    /// is returned for the caller to observe. Concurrent callers run one after
    /// another, each fetching the roster anew.
    pub async fn refresh(&self) -> Result<usize, FeedError> {
        let _refreshing = self.refresh_lock.lock().await;
        let attempted_at = Utc::now();
        let result = match self.store.find_producer(&self.producer_id).await {
            Ok(Some(producer)) => Ok(DeviceMapping::from_producer(&producer)),
            Ok(None) => Err(FeedError::ProducerNotFound {
                producer_id: self.producer_id.clone(),
            }),
            Err(e) => Err(FeedError::MetadataFetch {
                producer_id: self.producer_id.clone(),
                source: e,
            }),
        };

        let mut status = self.status.lock();
        status.last_attempt = Some(attempted_at);
        match result {
            Ok(mapping) => {
                let count = mapping.len();
                self.mapping.store(Arc::new(mapping));
                status.last_success = Some(attempted_at);
                status.last_error = None;
                status.consecutive_failures = 0;
                status.device_count = count;
                metrics::METADATA_DEVICES.set(count as i64);
                info!(producer_id = %self.producer_id, devices = count, "device mapping refreshed");
                Ok(count)
            }
            Err(e) => {
                status.last_error = Some(e.to_string());
                status.consecutive_failures += 1;
                metrics::METADATA_REFRESH_FAILURES.inc();
                warn!(
                    producer_id = %self.producer_id,
                    consecutive_failures = status.consecutive_failures,
                    retained_devices = status.device_count,
                    "device mapping refresh failed, keeping previous mapping: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Non-blocking read against the mapping currently in effect.
    pub fn lookup(
        &self,
        device_id: &str,
    ) -> DeviceInfo {
        self.mapping.load().resolve(device_id)
    }

    /// The mapping currently in effect. Enriching a whole batch from one
    /// snapshot keeps the batch consistent even if a refresh lands mid-way.
    pub fn snapshot(&self) -> Arc<DeviceMapping> {
        self.mapping.load_full()
    }

    pub fn status(&self) -> RefreshStatus {
        self.status.lock().clone()
    }
}
