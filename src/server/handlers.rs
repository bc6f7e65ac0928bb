use std::convert::Infallible;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use tracing::info;
use tracing::warn;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

use super::ServerState;
use crate::metrics;
use crate::Broadcaster;
use crate::CycleState;
use crate::DeviceEntry;
use crate::FeedSnapshot;
use crate::Producer;
use crate::Reading;
use crate::RefreshStatus;
use crate::StoreError;

/// Body of `GET /status`
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub cycle_state: CycleState,
    pub feed: FeedSnapshot,
    pub metadata: RefreshStatus,
    pub producer_id: String,
    pub subscribers: usize,
}

/// A reading as submitted to `POST /api/readings`. `id` and `timestamp` are
/// assigned on arrival when absent.
#[derive(Debug, Deserialize)]
pub struct NewReading {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(rename = "deviceId")]
    pub device_id: String,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl NewReading {
    pub fn into_reading(
        self,
        received_at: DateTime<Utc>,
    ) -> Reading {
        Reading {
            id: self.id.unwrap_or_else(|| nanoid::nanoid!()),
            device_id: self.device_id,
            timestamp: self.timestamp.unwrap_or(received_at),
            payload: self.payload,
        }
    }
}

/// One reading or a list of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IngestBody {
    Many(Vec<NewReading>),
    One(NewReading),
}

/// Body of `PUT /api/producers/{id}`
#[derive(Debug, Deserialize)]
pub struct ProducerBody {
    #[serde(default, alias = "ownerName", alias = "companyName")]
    pub owner: String,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

pub fn health_handler() -> impl Reply {
    warp::reply::json(&json!({ "status": "ok" }))
}

pub fn status_handler(state: Arc<ServerState>) -> impl Reply {
    let report = StatusReport {
        cycle_state: state.cycle_guard.state(),
        feed: state.feed_status.snapshot(),
        metadata: state.metadata.status(),
        producer_id: state.metadata.producer_id().to_string(),
        subscribers: state.hub.subscriber_count(),
    };
    warp::reply::json(&report)
}

pub fn metrics_handler() -> impl Reply {
    metrics::gather_text()
}

pub async fn ingest_readings_handler(
    body: IngestBody,
    state: Arc<ServerState>,
) -> Result<Response, Infallible> {
    let Some(sink) = state.sink.as_ref() else {
        return Ok(ingest_unavailable());
    };
    let received_at = Utc::now();
    let readings: Vec<Reading> = match body {
        IngestBody::Many(list) => list.into_iter().map(|r| r.into_reading(received_at)).collect(),
        IngestBody::One(one) => vec![one.into_reading(received_at)],
    };

    let mut ids = Vec::with_capacity(readings.len());
    for reading in &readings {
        if let Err(e) = sink.insert_reading(reading).await {
            return Ok(store_failure("insert reading", e));
        }
        ids.push(reading.id.clone());
    }

    info!(count = ids.len(), "readings ingested");
    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "inserted": ids.len(), "ids": ids })),
        StatusCode::CREATED,
    )
    .into_response())
}

/// Stores the roster and, when it belongs to the tracked producer, reloads
/// the device mapping right away instead of waiting for the refresh timer.
pub async fn upsert_producer_handler(
    producer_id: String,
    body: ProducerBody,
    state: Arc<ServerState>,
) -> Result<Response, Infallible> {
    let Some(sink) = state.sink.as_ref() else {
        return Ok(ingest_unavailable());
    };
    let producer = Producer {
        id: producer_id,
        owner: body.owner,
        devices: body.devices,
    };

    if let Err(e) = sink.upsert_producer(&producer).await {
        return Ok(store_failure("upsert producer", e));
    }

    let mut refreshed = false;
    if producer.id == state.metadata.producer_id() {
        refreshed = state.metadata.refresh().await.is_ok();
    }

    info!(producer_id = %producer.id, devices = producer.devices.len(), refreshed, "producer stored");
    Ok(warp::reply::json(&json!({
        "id": producer.id,
        "devices": producer.devices.len(),
        "mappingRefreshed": refreshed,
    }))
    .into_response())
}

fn store_failure(
    op: &str,
    e: StoreError,
) -> Response {
    warn!("{} failed: {}", op, e);
    warp::reply::with_status(
        warp::reply::json(&json!({ "error": e.to_string() })),
        StatusCode::SERVICE_UNAVAILABLE,
    )
    .into_response()
}

fn ingest_unavailable() -> Response {
    StatusCode::NOT_FOUND.into_response()
}
