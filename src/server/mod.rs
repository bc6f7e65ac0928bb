//! HTTP and push-channel surface.
//!
//! `/ws` is the push channel: subscribers receive every `db_update` frame
//! published while they are connected and nothing they send is read. The
//! remaining routes are operational (`/health`, `/status`, `/metrics`) or
//! feed the local store (`/api/...`).

mod handlers;
mod subscriber;
pub use handlers::*;
pub use subscriber::*;


use std::convert::Infallible;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::CycleGuard;
use crate::DocumentSink;
use crate::Error;
use crate::FeedStatus;
use crate::MetadataCache;
use crate::Result;
use crate::ServerConfig;
use crate::SubscriberHub;

/// Request body cap for the ingest routes
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Everything the routes read from or write to
pub struct ServerState {
    pub hub: Arc<SubscriberHub>,
    pub feed_status: Arc<FeedStatus>,
    pub cycle_guard: Arc<CycleGuard>,
    pub metadata: Arc<MetadataCache>,
    /// Write side for the ingest routes. Without one they stay disabled.
    pub sink: Option<Arc<dyn DocumentSink>>,
    pub metrics_enabled: bool,
    pub ingest_enabled: bool,
}

impl ServerState {
    fn ingest_available(&self) -> bool {
        self.ingest_enabled && self.sink.is_some()
    }
}

pub fn routes(
    state: Arc<ServerState>,
    config: &ServerConfig,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let ws = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_state(state.clone()))
        .map(|ws: warp::ws::Ws, state: Arc<ServerState>| {
            let hub = state.hub.clone();
            ws.on_upgrade(move |socket| serve_subscriber(socket, hub))
        });

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(health_handler);

    let status = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(status_handler);

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(enabled(state.metrics_enabled))
        .map(metrics_handler);

    let ingest_readings = warp::path!("api" / "readings")
        .and(warp::post())
        .and(enabled(state.ingest_available()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(ingest_readings_handler);

    let upsert_producer = warp::path!("api" / "producers" / String)
        .and(warp::put())
        .and(enabled(state.ingest_available()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(upsert_producer_handler);

    ws.or(health)
        .or(status)
        .or(metrics)
        .or(ingest_readings)
        .or(upsert_producer)
        .with(cors(config))
}

/// Binds `listen_address` and serves until the shutdown signal fires.
///
/// # Errors
/// `Error::Fatal` when the address cannot be bound.
pub async fn serve(
    state: Arc<ServerState>,
    config: ServerConfig,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<()> {
    let routes = routes(state, &config);
    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(config.listen_address, async move {
            let _ = shutdown_rx.changed().await;
        })
        .map_err(|e| Error::Fatal(format!("failed to bind {}: {}", config.listen_address, e)))?;

    info!(%addr, "push channel listening");
    server.await;
    info!("server stopped");
    Ok(())
}

fn with_state(state: Arc<ServerState>) -> impl Filter<Extract = (Arc<ServerState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Rejects with 404 when the route is switched off.
fn enabled(flag: bool) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::any()
        .and_then(move || async move {
            if flag {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
}

fn cors(config: &ServerConfig) -> warp::cors::Builder {
    let builder = warp::cors()
        .allow_methods(vec!["GET", "POST", "PUT"])
        .allow_headers(vec!["content-type"]);
    if config.allows_any_origin() {
        builder.allow_any_origin()
    } else {
        builder.allow_origins(config.cors_allowed_origins.iter().map(String::as_str))
    }
}
