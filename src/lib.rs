//! Change-feed bridge for sensor readings.
//!
//! Polls a document store for readings newer than a watermark, drops ids
//! already forwarded, attaches device names and owners from a periodically
//! refreshed roster, and pushes each batch to every connected subscriber as a
//! single `db_update` frame.

mod broadcast;
mod config;
mod dedup;
mod errors;
mod feed;
mod metadata;
pub mod metrics;
mod model;
mod node;
mod poller;
pub mod server;
mod storage;
pub mod utils;

pub use broadcast::*;
pub use config::*;
pub use dedup::*;
pub use errors::*;
pub use feed::*;
pub use metadata::*;
pub use model::*;
pub use node::*;
pub use poller::*;
pub use server::ServerState;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
