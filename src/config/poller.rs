use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watermark poll cycle parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollerConfig {
    /// Fixed tick interval. Doubles as the retry delay after a failed query.
    #[serde(default = "default_poll_interval_in_ms")]
    pub interval_in_ms: u64,

    /// Maximum readings yielded per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_in_ms: default_poll_interval_in_ms(),
            batch_size: default_batch_size(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_in_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_in_ms == 0 {
            return Err(Error::InvalidConfig("poller.interval_in_ms must be greater than 0".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("poller.batch_size must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Recently-forwarded window bounds
///
/// Once the window holds more than `capacity` ids it is trimmed back to the
/// newest `keep` ids.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DedupConfig {
    /// Window size that triggers a trim
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,

    /// Newest ids retained after a trim
    #[serde(default = "default_dedup_keep")]
    pub keep: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: default_dedup_capacity(),
            keep: default_dedup_keep(),
        }
    }
}

impl DedupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.keep == 0 {
            return Err(Error::InvalidConfig("dedup.keep must be greater than 0".into()));
        }
        if self.keep >= self.capacity {
            return Err(Error::InvalidConfig(format!(
                "dedup.keep ({}) must be smaller than dedup.capacity ({})",
                self.keep, self.capacity
            )));
        }
        Ok(())
    }
}

fn default_poll_interval_in_ms() -> u64 {
    30_000
}
fn default_batch_size() -> usize {
    33
}
fn default_dedup_capacity() -> usize {
    1000
}
fn default_dedup_keep() -> usize {
    500
}
