use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Device roster cache settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetadataConfig {
    /// Producer whose device roster names the devices
    #[serde(default = "default_producer_id")]
    pub producer_id: String,

    /// Refresh period, independent of the poll cycle
    #[serde(default = "default_refresh_interval_in_secs")]
    pub refresh_interval_in_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            producer_id: default_producer_id(),
            refresh_interval_in_secs: default_refresh_interval_in_secs(),
        }
    }
}

impl MetadataConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_in_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.producer_id.trim().is_empty() {
            return Err(Error::InvalidConfig("metadata.producer_id cannot be empty".into()));
        }
        if self.refresh_interval_in_secs == 0 {
            return Err(Error::InvalidConfig(
                "metadata.refresh_interval_in_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_producer_id() -> String {
    "port-operator".to_string()
}

fn default_refresh_interval_in_secs() -> u64 {
    3600
}
