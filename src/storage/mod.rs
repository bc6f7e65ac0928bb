//! Document store seam.
//!
//! The bridge consumes two collections: readings, range-queried on their
//! timestamp, and producers, point-queried by id. [`DocumentStore`] is the
//! read side the poll and refresh cycles depend on; [`DocumentSink`] is the
//! write side used by the local ingest routes.

mod sled_document_store;
pub use sled_document_store::*;


use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::warn;

use crate::Producer;
use crate::Reading;
use crate::StoreError;

/// Sled tree holding readings, keyed by `timestamp_ms ++ id`
pub(crate) const READINGS_TREE: &str = "_readings";
/// Sled tree holding producer documents, keyed by id
pub(crate) const PRODUCERS_TREE: &str = "_producers";

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Readings with `timestamp > watermark`, at most `limit` of them.
    ///
    /// # Errors
    /// Any failure is surfaced as-is; callers treat it as transient.
    async fn readings_after(
        &self,
        watermark: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError>;

    /// Point lookup of a producer document. `Ok(None)` when absent.
    async fn find_producer(
        &self,
        producer_id: &str,
    ) -> Result<Option<Producer>, StoreError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DocumentSink: Send + Sync + 'static {
    async fn insert_reading(
        &self,
        reading: &Reading,
    ) -> Result<(), StoreError>;

    async fn upsert_producer(
        &self,
        producer: &Producer,
    ) -> Result<(), StoreError>;
}

pub fn init_sled_document_db(
    db_path: impl AsRef<Path> + std::fmt::Debug,
    flush_every_ms: u64,
) -> std::result::Result<sled::Db, StoreError> {
    debug!("init_sled_document_db from path: {:?}", &db_path);

    let path = db_path.as_ref();
    sled::Config::default()
        .path(path)
        .cache_capacity(64 * 1024 * 1024) //64MB
        .flush_every_ms(Some(flush_every_ms))
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            StoreError::Open {
                path: path.to_path_buf(),
                source: e,
            }
        })
}
