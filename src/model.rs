//! Documents read from the store and events pushed to subscribers.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// Name of the only outbound push message type
pub const DB_UPDATE_EVENT: &str = "db_update";

/// Placeholder used when a device is absent from the current mapping
pub const UNKNOWN: &str = "Unknown";

/// A sensor record as stored. Owned by the store; the bridge only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Store-assigned unique identifier
    pub id: String,

    #[serde(rename = "deviceId")]
    pub device_id: String,

    /// Non-decreasing per device, not globally ordered
    pub timestamp: DateTime<Utc>,

    /// Any further measurement fields, passed through untouched
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Reading {
    pub fn new(
        id: impl Into<String>,
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            device_id: device_id.into(),
            timestamp,
            payload: Map::new(),
        }
    }

    pub fn with_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// One entry of a producer's device roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub name: String,
}

/// Producer document, point-queried by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub id: String,

    #[serde(default, alias = "ownerName", alias = "companyName")]
    pub owner: String,

    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// Resolved display metadata for a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub owner: String,
}

impl DeviceInfo {
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Sentinel returned for devices missing from the mapping
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN && self.owner == UNKNOWN
    }
}

/// A reading plus resolved device metadata. Built per outgoing batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub reading: Reading,

    #[serde(rename = "deviceName")]
    pub device_name: String,

    #[serde(rename = "ownerName")]
    pub owner_name: String,
}

impl EnrichedEvent {
    pub fn new(
        reading: Reading,
        info: DeviceInfo,
    ) -> Self {
        Self {
            reading,
            device_name: info.name,
            owner_name: info.owner,
        }
    }
}

/// Wire frame sent to every subscriber: `{"event":"db_update","data":[...]}`
#[derive(Debug, Serialize)]
pub struct UpdateMessage<'a> {
    pub event: &'static str,
    pub data: &'a [EnrichedEvent],
}

impl<'a> UpdateMessage<'a> {
    pub fn db_update(data: &'a [EnrichedEvent]) -> Self {
        Self {
            event: DB_UPDATE_EVENT,
            data,
        }
    }
}
