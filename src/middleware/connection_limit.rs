//! Connection limit middleware for the relay WebSocket route
//!
//! Enforces a global maximum of concurrent relay links and a per-IP limit.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use auraq_voice_relay::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/realtime", get(realtime_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::{AppState, ConnectionGuard, ConnectionLimitError};

/// Connection slot reserved for one upgrade request.
///
/// The guard travels in the request extensions. The handler takes it for the
/// lifetime of the link; if the request is rejected before that (a bad
/// upgrade, a refused credential) the extensions are dropped with the
/// request and the slot is returned.
#[derive(Clone)]
pub struct ConnectionSlot {
    ip: IpAddr,
    guard: Arc<Mutex<Option<ConnectionGuard>>>,
}

impl ConnectionSlot {
    fn new(guard: ConnectionGuard) -> Self {
        Self {
            ip: guard.ip(),
            guard: Arc::new(Mutex::new(Some(guard))),
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Takes ownership of the slot. Only the first caller gets it.
    pub fn take(&self) -> Option<ConnectionGuard> {
        self.guard.lock().take()
    }
}

impl std::fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSlot").field("ip", &self.ip).finish()
    }
}

/// Rejects WebSocket upgrades over capacity.
///
/// - 503 Service Unavailable when the global limit is reached
/// - 429 Too Many Requests when the per-IP limit is reached
///
/// Requests without an `Upgrade: websocket` header pass through untouched.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            let slot = ConnectionSlot::new(ConnectionGuard::new(state.clone(), client_ip));
            request.extensions_mut().insert(slot);
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting relay connection: global limit reached");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting relay connection: per-IP limit reached");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}
