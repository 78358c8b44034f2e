use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::relay::RelayMode;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mode: RelayMode,
}

/// `GET /` liveness probe.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        mode: state.config.relay_mode,
    })
}
