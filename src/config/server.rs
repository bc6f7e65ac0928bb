use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;
use warp::http::Uri;

use crate::Error;
use crate::Result;

/// Wildcard entry in `cors_allowed_origins`
pub const ANY_ORIGIN: &str = "*";

/// HTTP / WebSocket surface
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_address: SocketAddr,

    /// Origins allowed to open the push channel. `"*"` allows any origin.
    #[serde(default = "default_cors_allowed_origins")]
    pub cors_allowed_origins: Vec<String>,

    /// Expose the local ingest routes (`POST /api/readings`, `PUT /api/producers/{id}`)
    #[serde(default = "default_ingest_enabled")]
    pub ingest_enabled: bool,

    /// Frames queued per subscriber before a stalled one is disconnected
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_addr(),
            cors_allowed_origins: default_cors_allowed_origins(),
            ingest_enabled: default_ingest_enabled(),
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
        }
    }
}

impl ServerConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.cors_allowed_origins.iter().any(|o| o == ANY_ORIGIN)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cors_allowed_origins.is_empty() {
            return Err(Error::InvalidConfig(
                "server.cors_allowed_origins must contain at least one origin".into(),
            ));
        }
        if self.subscriber_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "server.subscriber_queue_capacity must be greater than 0".into(),
            ));
        }
        for origin in &self.cors_allowed_origins {
            if origin != ANY_ORIGIN && !is_valid_origin(origin) {
                return Err(Error::InvalidConfig(format!(
                    "server.cors_allowed_origins entry '{}' must be '*' or an http(s) origin",
                    origin
                )));
            }
        }
        Ok(())
    }
}

/// `scheme://host[:port]`, as the CORS filter will parse it.
fn is_valid_origin(origin: &str) -> bool {
    let Ok(uri) = origin.parse::<Uri>() else {
        return false;
    };
    matches!(uri.scheme_str(), Some("http") | Some("https"))
        && uri.authority().is_some_and(|a| !a.host().is_empty())
        && matches!(uri.path_and_query().map(|p| p.as_str()), None | Some("") | Some("/"))
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4000))
}

fn default_cors_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_ingest_enabled() -> bool {
    true
}

fn default_subscriber_queue_capacity() -> usize {
    256
}
