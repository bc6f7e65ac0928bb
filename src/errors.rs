//! Change-feed Error Hierarchy
//!
//! Errors are grouped by the layer that produces them: configuration, the
//! document store, and the feed pipeline itself. Only startup failures are
//! allowed to terminate the process; every per-tick error is contained to the
//! tick that raised it.

use std::path::PathBuf;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading/parsing failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration loaded but rejected by validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Document store failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Change-feed pipeline failures
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),

    #[error("{0}")]
    SignalSenderClosed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Embedded database errors
    #[error(transparent)]
    Db(#[from] sled::Error),

    /// Document (de)serialization failures
    #[error(transparent)]
    Codec(#[from] serde_json::Error),

    /// Store opened at path could not be initialized
    #[error("Failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    /// Store reachable but refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Reading query failed during a poll tick. Logged, watermark untouched,
    /// retried by the next tick.
    #[error("Reading query failed: {0}")]
    TransientQuery(#[source] StoreError),

    /// The designated producer has no document in the store
    #[error("Producer {producer_id} not found")]
    ProducerNotFound { producer_id: String },

    /// Roster fetch failed; the previously installed mapping stays in effect
    #[error("Roster fetch for producer {producer_id} failed: {source}")]
    MetadataFetch {
        producer_id: String,
        #[source]
        source: StoreError,
    },

    /// Send to a single subscriber failed. Never aborts delivery to others.
    #[error("Publish to subscriber {subscriber_id} failed")]
    Publish { subscriber_id: String },

    /// Subscriber left `capacity` frames undrained; it is dropped
    #[error("Subscriber {subscriber_id} fell {capacity} frames behind")]
    SubscriberLagging { subscriber_id: String, capacity: usize },
}

impl Error {
    /// Whether this error must abort process start.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Fatal(_) | Error::Store(StoreError::Open { .. })
        )
    }
}
