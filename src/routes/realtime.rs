//! Relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /realtime` - WebSocket upgrade, bridged to the realtime speech API
///
/// # Protocol
///
/// Frames are the upstream's own JSON events and pass through unchanged:
///
/// ```json
/// // Client -> relay -> upstream
/// {"type": "input_audio_buffer.append", "audio": "<base64 pcm16 24kHz mono>"}
///
/// // Upstream -> relay -> client
/// {"type": "response.audio.delta", "delta": "<base64 pcm16>"}
/// {"type": "response.audio_transcript.delta", "delta": "Let's start"}
/// ```
///
/// The relay adds two things of its own: the `session.update` it sends
/// upstream after `session.created`, and synthetic `error` events when the
/// upstream fails or the link goes idle.
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(realtime_handler))
        .layer(TraceLayer::new_for_http())
}
