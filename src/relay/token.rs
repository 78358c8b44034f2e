//! Ephemeral-token flow: the relay only mints a short-lived session token and
//! stays out of the audio path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};

use crate::core::realtime::CoachSessionSettings;

use super::RelayMode;
use super::base::{Credentials, EphemeralSession, RelayError, RelayResult, SessionHandle, SessionInitiator};

pub struct EphemeralTokenIssuer {
    client: reqwest::Client,
    sessions_url: String,
    settings: Arc<CoachSessionSettings>,
    timeout: Duration,
}

impl EphemeralTokenIssuer {
    pub fn new(
        client: reqwest::Client,
        sessions_url: impl Into<String>,
        settings: Arc<CoachSessionSettings>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            sessions_url: sessions_url.into(),
            settings,
            timeout,
        }
    }

    /// POSTs the coach session to the provider and returns its JSON verbatim.
    pub async fn issue(&self, credentials: &Credentials) -> RelayResult<EphemeralSession> {
        let response = self
            .client
            .post(&self.sessions_url)
            .bearer_auth(credentials.api_key())
            .timeout(self.timeout)
            .json(&self.settings.token_request())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout(self.timeout.as_secs())
                } else {
                    RelayError::ConnectionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Session creation rejected: {}", body);
            return Err(RelayError::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| RelayError::ConnectionFailed(format!("invalid session response: {e}")))?;

        info!(
            session_id = payload.get("id").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "Ephemeral session created"
        );
        Ok(EphemeralSession { payload })
    }
}

#[async_trait]
impl SessionInitiator for EphemeralTokenIssuer {
    fn mode(&self) -> RelayMode {
        RelayMode::EphemeralToken
    }

    async fn initiate_session(&self, credentials: &Credentials) -> RelayResult<SessionHandle> {
        self.issue(credentials).await.map(SessionHandle::Token)
    }
}
