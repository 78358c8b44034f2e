//! Ephemeral session-token handler
//!
//! Stateless alternative to the WebSocket relay: the server mints a
//! short-lived session with its own credential and returns the provider's
//! JSON untouched. The client then talks to the provider directly.

use axum::{Json, extract::State};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::errors::app_error::{AppError, AppResult};
use crate::relay::SessionHandle;
use crate::state::AppState;

/// `POST /session`
///
/// # Returns
/// * `200` - provider session JSON (`id`, `client_secret`, `expires_at`, ...)
/// * `500` - no upstream credential configured
/// * `502` - provider rejected the request; body carries its status and error
pub async fn session_token_handler(State(state): State<Arc<AppState>>) -> AppResult<Json<Value>> {
    let credentials = state.credentials()?;

    match state.initiator.initiate_session(&credentials).await? {
        SessionHandle::Token(session) => {
            info!(expires_at = ?session.expires_at(), "Issued ephemeral session token");
            Ok(Json(session.payload))
        }
        SessionHandle::Relay(_) => {
            error!("Session initiator opened a relay socket on the token path");
            Err(AppError::Configuration(
                "Server is not configured for ephemeral tokens".to_string(),
            ))
        }
    }
}
