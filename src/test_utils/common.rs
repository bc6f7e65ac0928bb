use std::sync::Arc;

use chrono::DateTime;
use chrono::Duration;
use chrono::TimeZone;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::subscriber::DefaultGuard;

use crate::Broadcaster;
use crate::Clock;
use crate::DeviceEntry;
use crate::EnrichedEvent;
use crate::Producer;
use crate::Reading;

/// Scoped to the calling thread for as long as the guard lives. The global
/// dispatcher stays free for `#[traced_test]`.
pub fn enable_logger() -> DefaultGuard {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(subscriber)
}

/// Fixed process-start instant used across tests
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

pub fn reading_at(
    id: &str,
    device_id: &str,
    offset_ms: i64,
) -> Reading {
    Reading::new(id, device_id, t0() + Duration::milliseconds(offset_ms))
}

pub fn producer(
    id: &str,
    owner: &str,
    devices: &[(&str, &str)],
) -> Producer {
    Producer {
        id: id.to_string(),
        owner: owner.to_string(),
        devices: devices
            .iter()
            .map(|(device_id, name)| DeviceEntry {
                device_id: device_id.to_string(),
                name: name.to_string(),
            })
            .collect(),
    }
}

/// Clock driven by the test
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    pub fn set(
        &self,
        now: DateTime<Utc>,
    ) {
        *self.now.lock() = now;
    }

    pub fn advance_ms(
        &self,
        ms: i64,
    ) {
        let mut now = self.now.lock();
        *now += Duration::milliseconds(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Broadcaster that keeps every published batch
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    batches: Mutex<Vec<Vec<EnrichedEvent>>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<Vec<EnrichedEvent>> {
        self.batches.lock().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.batches.lock().len()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn publish(
        &self,
        batch: &[EnrichedEvent],
    ) -> usize {
        self.batches.lock().push(batch.to_vec());
        1
    }

    fn subscriber_count(&self) -> usize {
        1
    }
}
