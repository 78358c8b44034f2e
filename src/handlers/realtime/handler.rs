//! Realtime relay WebSocket handler
//!
//! Upgrades `GET /realtime` and hands the socket to a [`RelayLink`], which
//! opens the upstream session with the server's credential and bridges the
//! two sockets until either side closes.

use axum::{
    Extension,
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::app_error::AppError;
use crate::middleware::ConnectionSlot;
use crate::relay::{Credentials, LinkTermination, RelayLink};
use crate::state::{AppState, ConnectionGuard};

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Realtime relay WebSocket handler
///
/// The credential is checked before upgrading: without one the request fails
/// with a 500 and no upstream connection is attempted.
///
/// # Arguments
/// * `ws` - The WebSocket upgrade request from Axum
/// * `state` - Application state holding the credential and session initiator
/// * `slot` - Set by the connection limit middleware when it took a slot
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    slot: Option<Extension<ConnectionSlot>>,
) -> Result<Response, AppError> {
    // Held by the link from here on; dropped with it on every early return.
    let guard = slot.and_then(|Extension(slot)| slot.take());

    let credentials = match state.credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            warn!("Refusing relay connection: {}", e);
            return Err(e);
        }
    };

    info!("Relay WebSocket connection upgrade requested");

    Ok(ws
        .max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state, credentials, guard)))
}

async fn handle_relay_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    credentials: Credentials,
    _guard: Option<ConnectionGuard>,
) {
    let link = RelayLink::new(state.session_settings.clone(), state.idle_timeout());
    let link_id = link.link_id().to_string();

    let (termination, stats) = link
        .run(socket, state.initiator.clone(), credentials)
        .await;

    if termination == LinkTermination::UpstreamFailed {
        warn!(link_id = %link_id, "Relay link ended on an upstream failure");
    }
    if stats.dropped_before_open > 0 {
        info!(
            link_id = %link_id,
            dropped = stats.dropped_before_open,
            "Client frames dropped before the upstream was open"
        );
    }
}
