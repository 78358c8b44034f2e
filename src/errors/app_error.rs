use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::relay::RelayError;

/// Errors returned by HTTP handlers.
///
/// Every variant renders as `{"error": ...}` with a matching status code.
#[derive(Debug, Error)]
pub enum AppError {
    /// Server-side misconfiguration, e.g. a missing upstream credential
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The upstream answered with a non-success status
    #[error("Upstream rejected the request ({status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UpstreamRejected { .. } | AppError::UpstreamUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn body(&self) -> Value {
        match self {
            AppError::UpstreamRejected { status, body } => {
                // Keep upstream JSON structured when it is JSON.
                let detail = serde_json::from_str::<Value>(body)
                    .unwrap_or_else(|_| Value::String(body.clone()));
                json!({
                    "error": format!("Upstream rejected the request with status {status}"),
                    "upstream_status": status,
                    "upstream_error": detail,
                })
            }
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::MissingCredential => {
                AppError::Configuration("OPENAI_API_KEY is not configured".to_string())
            }
            RelayError::UpstreamRejected { status, body } => AppError::UpstreamRejected { status, body },
            RelayError::Timeout(_) => AppError::UpstreamTimeout(err.to_string()),
            RelayError::ConnectionFailed(_) | RelayError::WebSocket(_) => {
                AppError::UpstreamUnavailable(err.to_string())
            }
            RelayError::InvalidConfiguration(_) => AppError::Configuration(err.to_string()),
            RelayError::Serialization(_) => AppError::Internal(err.to_string()),
        }
    }
}
