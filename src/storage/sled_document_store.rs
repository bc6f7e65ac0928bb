//! Embedded document store backed by sled.
//!
//! Readings are keyed so that a forward range scan visits them in timestamp
//! order, which turns `timestamp > watermark` into a single seek.

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use tracing::debug;
use tracing::instrument;
use tracing::trace;

use super::init_sled_document_db;
use super::DocumentSink;
use super::DocumentStore;
use super::PRODUCERS_TREE;
use super::READINGS_TREE;
use crate::convert::reading_key;
use crate::convert::timestamp_to_key_prefix;
use crate::Producer;
use crate::Reading;
use crate::StoreError;

pub struct SledDocumentStore {
    db: sled::Db,

    pub(crate) readings_tree: sled::Tree,

    pub(crate) producers_tree: sled::Tree,
}

impl std::fmt::Debug for SledDocumentStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledDocumentStore")
            .field("readings", &self.readings_tree.len())
            .field("producers", &self.producers_tree.len())
            .finish()
    }
}

impl SledDocumentStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    /// `StoreError::Open` when the database cannot be opened; the caller
    /// treats this as a startup failure.
    pub fn open(
        path: impl AsRef<Path> + std::fmt::Debug,
        flush_every_ms: u64,
    ) -> Result<Self, StoreError> {
        let db = init_sled_document_db(path, flush_every_ms)?;
        Self::new(db)
    }

    pub fn new(db: sled::Db) -> Result<Self, StoreError> {
        let readings_tree = db.open_tree(READINGS_TREE)?;
        let producers_tree = db.open_tree(PRODUCERS_TREE)?;
        Ok(Self {
            db,
            readings_tree,
            producers_tree,
        })
    }

    pub fn reading_count(&self) -> usize {
        self.readings_tree.len()
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        trace!("SledDocumentStore flush");
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SledDocumentStore {
    #[instrument(skip(self))]
    async fn readings_after(
        &self,
        watermark: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        // Start at the watermark's millisecond and filter exactly, so
        // sub-millisecond timestamps are compared precisely.
        let start = timestamp_to_key_prefix(&watermark);
        let mut readings = Vec::with_capacity(limit.min(64));

        for item in self.readings_tree.range(start..) {
            if readings.len() >= limit {
                break;
            }
            let (_, value) = item?;
            let reading: Reading = serde_json::from_slice(&value)?;
            if reading.timestamp > watermark {
                readings.push(reading);
            }
        }

        debug!(count = readings.len(), %watermark, "readings_after");
        Ok(readings)
    }

    #[instrument(skip(self))]
    async fn find_producer(
        &self,
        producer_id: &str,
    ) -> Result<Option<Producer>, StoreError> {
        match self.producers_tree.get(producer_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DocumentSink for SledDocumentStore {
    #[instrument(skip(self, reading), fields(id = %reading.id))]
    async fn insert_reading(
        &self,
        reading: &Reading,
    ) -> Result<(), StoreError> {
        let key = reading_key(&reading.timestamp, &reading.id);
        let value = serde_json::to_vec(reading)?;
        self.readings_tree.insert(key, value)?;
        Ok(())
    }

    #[instrument(skip(self, producer), fields(id = %producer.id))]
    async fn upsert_producer(
        &self,
        producer: &Producer,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_vec(producer)?;
        self.producers_tree.insert(producer.id.as_bytes(), value)?;
        Ok(())
    }
}
