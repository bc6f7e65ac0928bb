//! Configuration management for the change-feed bridge.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base (standalone operation against a local store)
//! - Configuration file support
//! - Environment variable overrides
//! - Section-wise validation
mod metadata;
mod monitoring;
mod poller;
mod server;
mod store;
pub use metadata::*;
pub use monitoring::*;
pub use poller::*;
pub use server::*;
pub use store::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix, e.g. `FEED__POLLER__INTERVAL_IN_MS`
pub const ENV_PREFIX: &str = "FEED";

/// Main configuration container for the change-feed bridge
///
/// Combines all section configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct FeedConfig {
    /// Document store location
    #[serde(default)]
    pub store: StoreConfig,
    /// Watermark poll cycle
    #[serde(default)]
    pub poller: PollerConfig,
    /// Recently-forwarded id window
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Device roster cache
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// HTTP / WebSocket surface
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Debug for FeedConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FeedConfig")
            .field("store", &self.store)
            .field("poller", &self.poller)
            .field("dedup", &self.dedup)
            .field("metadata", &self.metadata)
            .field("server", &self.server)
            .finish()
    }
}

impl FeedConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `FEED__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so further overrides can be layered via
    /// `with_override_config()`. Callers MUST call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("FEED__POLLER__INTERVAL_IN_MS", "5000");
    /// let cfg = FeedConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` describing the first violated rule.
    pub fn validate(self) -> Result<Self> {
        self.store.validate()?;
        self.poller.validate()?;
        self.dedup.validate()?;
        self.metadata.validate()?;
        self.server.validate()?;
        self.log.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("server.cors_allowed_origins")
}
