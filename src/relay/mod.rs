//! Server-side relay between clients and the realtime speech API.
//!
//! Two flows are supported behind [`SessionInitiator`]:
//! - [`RelayMode::WebSocket`]: the relay opens the upstream socket with its own
//!   credential and bridges frames ([`bridge::RelayLink`]).
//! - [`RelayMode::EphemeralToken`]: the relay mints a short-lived token and the
//!   client connects to the provider directly.

pub mod base;
pub mod bridge;
pub mod token;
pub mod upstream;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::core::realtime::CoachSessionSettings;

pub use base::{
    Credentials, EphemeralSession, RelayError, RelayResult, SessionHandle, SessionInitiator,
    UpstreamConnection,
};
pub use bridge::{CLOSE_TIMEOUT, LinkStats, LinkTermination, MAX_IDLE_TIMEOUT, RelayLink};
pub use token::EphemeralTokenIssuer;
pub use upstream::{WebSocketUpstream, connect_upstream, upstream_request};

/// Which session flow the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    #[default]
    #[serde(rename = "websocket")]
    WebSocket,
    EphemeralToken,
}

impl RelayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMode::WebSocket => "websocket",
            RelayMode::EphemeralToken => "ephemeral_token",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "websocket" | "ws" | "relay" => Some(RelayMode::WebSocket),
            "ephemeral_token" | "token" | "ephemeral" => Some(RelayMode::EphemeralToken),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the initiator for the configured mode.
pub fn create_session_initiator(
    config: &ServerConfig,
    settings: Arc<CoachSessionSettings>,
    http_client: reqwest::Client,
) -> Arc<dyn SessionInitiator> {
    let timeout = Duration::from_secs(config.upstream_connect_timeout_seconds);
    match config.relay_mode {
        RelayMode::WebSocket => Arc::new(WebSocketUpstream::new(
            config.upstream_realtime_url.clone(),
            settings.model.clone(),
            timeout,
        )),
        RelayMode::EphemeralToken => Arc::new(EphemeralTokenIssuer::new(
            http_client,
            config.upstream_sessions_url.clone(),
            settings,
            timeout,
        )),
    }
}
