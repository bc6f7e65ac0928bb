use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntGauge;
use prometheus::Registry;
use tracing::error;

lazy_static! {
    pub static ref READINGS_POLLED: IntCounter =
        IntCounter::new("feed_readings_polled_total", "Readings returned by poll queries")
            .expect("metric can not be created");

    pub static ref READINGS_FORWARDED: IntCounter =
        IntCounter::new("feed_readings_forwarded_total", "Readings passed by the dedup window")
            .expect("metric can not be created");

    pub static ref DUPLICATES_DROPPED: IntCounter =
        IntCounter::new("feed_duplicates_dropped_total", "Readings dropped as already forwarded")
            .expect("metric can not be created");

    pub static ref POLL_FAILURES: IntCounter =
        IntCounter::new("feed_poll_failures_total", "Failed reading queries")
            .expect("metric can not be created");

    pub static ref TICKS_SKIPPED: IntCounter =
        IntCounter::new("feed_ticks_skipped_total", "Poll ticks dropped because a cycle was in flight")
            .expect("metric can not be created");

    pub static ref BATCHES_PUBLISHED: IntCounter =
        IntCounter::new("feed_batches_published_total", "db_update frames broadcast")
            .expect("metric can not be created");

    pub static ref METADATA_REFRESH_FAILURES: IntCounter =
        IntCounter::new("feed_metadata_refresh_failures_total", "Failed device roster refreshes")
            .expect("metric can not be created");

    pub static ref METADATA_DEVICES: IntGauge =
        IntGauge::new("feed_metadata_devices", "Devices in the installed mapping")
            .expect("metric can not be created");

    pub static ref SUBSCRIBERS: IntGauge =
        IntGauge::new("feed_subscribers", "Connected push-channel subscribers")
            .expect("metric can not be created");

    pub static ref POLL_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("feed_poll_duration_ms", "Duration of one poll cycle in ms")
            .buckets(exponential_buckets(1.0, 2.0, 16).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

/// Registers the feed collectors with [`REGISTRY`]. Safe to call repeatedly.
pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(READINGS_POLLED.clone()),
            Box::new(READINGS_FORWARDED.clone()),
            Box::new(DUPLICATES_DROPPED.clone()),
            Box::new(POLL_FAILURES.clone()),
            Box::new(TICKS_SKIPPED.clone()),
            Box::new(BATCHES_PUBLISHED.clone()),
            Box::new(METADATA_REFRESH_FAILURES.clone()),
            Box::new(METADATA_DEVICES.clone()),
            Box::new(SUBSCRIBERS.clone()),
            Box::new(POLL_DURATION_MS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("collector can not be registered: {}", e);
            }
        }
    });
}

/// Prometheus text exposition of [`REGISTRY`]
pub fn gather_text() -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
