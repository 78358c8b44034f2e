//! Upstream WebSocket connector used by the relay flow.

use std::time::Duration;

use async_trait::async_trait;
use http::HeaderValue;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tracing::{debug, info, warn};
use url::Url;

use super::RelayMode;
use super::base::{
    Credentials, RelayError, RelayResult, SessionHandle, SessionInitiator, UpstreamConnection,
};

/// Builds the upgrade request for the realtime endpoint.
///
/// `token` is either the long-lived API key or an ephemeral client secret;
/// both are sent as a bearer token.
pub fn upstream_request(base_url: &str, model: &str, token: &str) -> RelayResult<Request> {
    let mut url = Url::parse(base_url)
        .map_err(|e| RelayError::InvalidConfiguration(format!("upstream URL {base_url}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(RelayError::InvalidConfiguration(format!(
                "upstream URL must use ws or wss, got {other}"
            )));
        }
    }
    url.query_pairs_mut().append_pair("model", model);

    let mut request = url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert(
        http::header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| RelayError::InvalidConfiguration("API key contains invalid characters".into()))?,
    );
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
    Ok(request)
}

/// Opens the upstream socket, bounded by `timeout`.
pub async fn connect_upstream(request: Request, timeout: Duration) -> RelayResult<UpstreamConnection> {
    let uri = request.uri().clone();
    debug!(%uri, "Connecting to realtime upstream");

    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request)).await {
        Ok(Ok((stream, response))) => {
            info!(status = %response.status(), "Connected to realtime upstream");
            Ok(stream)
        }
        Ok(Err(tokio_tungstenite::tungstenite::Error::Http(response))) => {
            let status = response.status().as_u16();
            let body = response
                .body()
                .as_ref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            warn!(status, "Realtime upstream rejected the connection");
            Err(RelayError::UpstreamRejected { status, body })
        }
        Ok(Err(e)) => Err(RelayError::ConnectionFailed(e.to_string())),
        Err(_) => Err(RelayError::Timeout(timeout.as_secs())),
    }
}

/// Canonical flow: the relay holds the credential and bridges the socket.
#[derive(Debug, Clone)]
pub struct WebSocketUpstream {
    url: String,
    model: String,
    connect_timeout: Duration,
}

impl WebSocketUpstream {
    pub fn new(url: impl Into<String>, model: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl SessionInitiator for WebSocketUpstream {
    fn mode(&self) -> RelayMode {
        RelayMode::WebSocket
    }

    async fn initiate_session(&self, credentials: &Credentials) -> RelayResult<SessionHandle> {
        let request = upstream_request(&self.url, &self.model, credentials.api_key())?;
        let connection = connect_upstream(request, self.connect_timeout).await?;
        Ok(SessionHandle::Relay(connection))
    }
}
