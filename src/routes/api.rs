use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, session_token_handler};
use crate::state::AppState;
use std::sync::Arc;

/// Public routes, always mounted.
pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(api::health_check))
}

/// Ephemeral-token route, mounted only in `ephemeral_token` mode.
///
/// `POST /session` takes no body and returns the provider's session JSON.
pub fn create_session_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", post(session_token_handler))
        .layer(TraceLayer::new_for_http())
}
