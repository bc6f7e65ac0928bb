use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Location of the document store the bridge reads from.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory of the embedded store (acts as the connection string)
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Flush interval for the embedded store in milliseconds
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            flush_every_ms: default_flush_every_ms(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("store.path cannot be empty".into()));
        }
        if self.flush_every_ms == 0 {
            return Err(Error::InvalidConfig("store.flush_every_ms must be greater than 0".into()));
        }
        Ok(())
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./db/port-feed")
}

fn default_flush_every_ms() -> u64 {
    500
}
