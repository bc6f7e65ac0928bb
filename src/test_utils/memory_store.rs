use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use parking_lot::Mutex;

use crate::DocumentStore;
use crate::Producer;
use crate::Reading;
use crate::StoreError;

/// In-memory store with failure injection and concurrency accounting.
///
/// Unlike the mockall mocks it can hold a query open for a while, which is
/// what the tick-overlap tests need.
#[derive(Default)]
pub struct MemoryStore {
    readings: Mutex<Vec<Reading>>,
    producers: Mutex<HashMap<String, Producer>>,
    query_delay: Mutex<Option<Duration>>,
    producer_delay: Mutex<Option<Duration>>,
    fail_queries: AtomicBool,
    fail_producer_lookups: AtomicBool,
    /// Ignore the requested limit and return everything matching
    ignore_limit: AtomicBool,
    pub query_calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub producer_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(
        &self,
        reading: Reading,
    ) {
        self.readings.lock().push(reading);
    }

    pub fn put_producer(
        &self,
        producer: Producer,
    ) {
        self.producers.lock().insert(producer.id.clone(), producer);
    }

    pub fn set_query_delay(
        &self,
        delay: Duration,
    ) {
        *self.query_delay.lock() = Some(delay);
    }

    /// Producer lookups read the roster first, then hold the answer this long.
    pub fn set_producer_delay(
        &self,
        delay: Option<Duration>,
    ) {
        *self.producer_delay.lock() = delay;
    }

    pub fn fail_queries(
        &self,
        fail: bool,
    ) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_producer_lookups(
        &self,
        fail: bool,
    ) {
        self.fail_producer_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn ignore_limit(
        &self,
        ignore: bool,
    ) {
        self.ignore_limit.store(ignore, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn readings_after(
        &self,
        watermark: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.query_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.fail_queries.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected query failure".into()))
        } else {
            let take = if self.ignore_limit.load(Ordering::SeqCst) {
                usize::MAX
            } else {
                limit
            };
            Ok(self
                .readings
                .lock()
                .iter()
                .filter(|r| r.timestamp > watermark)
                .take(take)
                .cloned()
                .collect())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn find_producer(
        &self,
        producer_id: &str,
    ) -> Result<Option<Producer>, StoreError> {
        self.producer_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_producer_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected lookup failure".into()));
        }
        let producer = self.producers.lock().get(producer_id).cloned();
        let delay = *self.producer_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(producer)
    }
}
