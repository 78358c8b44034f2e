//! Shared relay types: credentials, the session-initiation seam and errors.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::RelayMode;

/// Upstream WebSocket connection as produced by `connect_async`.
pub type UpstreamConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay-layer errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Upstream API key is not configured")]
    MissingCredential,

    #[error("Failed to connect upstream: {0}")]
    ConnectionFailed(String),

    #[error("Upstream rejected the request with status {status}: {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("Upstream did not answer within {0}s")]
    Timeout(u64),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid relay configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::WebSocket(err.to_string())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

/// The upstream API key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Rejects blank keys.
    pub fn new(api_key: impl Into<String>) -> RelayResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RelayError::MissingCredential);
        }
        Ok(Self { api_key })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials([REDACTED])")
    }
}

/// Provider response to a session-creation request.
#[derive(Debug, Clone)]
pub struct EphemeralSession {
    /// Provider JSON, returned to the caller verbatim
    pub payload: Value,
}

impl EphemeralSession {
    /// The short-lived token a client uses to connect directly.
    pub fn client_secret(&self) -> Option<&str> {
        self.payload
            .get("client_secret")
            .and_then(|secret| secret.get("value"))
            .and_then(Value::as_str)
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.payload
            .get("client_secret")
            .and_then(|secret| secret.get("expires_at"))
            .or_else(|| self.payload.get("expires_at"))
            .and_then(Value::as_u64)
    }
}

/// Result of starting an upstream session.
pub enum SessionHandle {
    /// An open upstream socket the relay bridges to the client
    Relay(UpstreamConnection),
    /// A token the client uses to reach the provider itself
    Token(EphemeralSession),
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionHandle::Relay(_) => f.write_str("SessionHandle::Relay"),
            SessionHandle::Token(session) => f.debug_tuple("SessionHandle::Token").field(session).finish(),
        }
    }
}

/// Starts an upstream session with the stored credential.
///
/// The WebSocket relay and the ephemeral-token issuer both implement this;
/// configuration decides which one the router exposes.
#[async_trait]
pub trait SessionInitiator: Send + Sync {
    fn mode(&self) -> RelayMode;

    async fn initiate_session(&self, credentials: &Credentials) -> RelayResult<SessionHandle>;
}
