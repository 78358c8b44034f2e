//! Router assembly
//!
//! `create_app` builds the complete service: the public health route, the
//! mode-specific relay or token route, and the shared CORS, rate-limit and
//! security-header layers.

pub mod api;
pub mod realtime;

use std::sync::Arc;

use axum::{Router, middleware};
use http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

use crate::middleware::connection_limit_middleware;
use crate::relay::RelayMode;
use crate::state::AppState;

/// Build the full application router for the configured relay mode.
///
/// Only one of `/realtime` and `/session` is mounted. The relay route sits
/// behind the connection-limit middleware, so the service must be served
/// with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_app(state: Arc<AppState>) -> Router {
    let mode_routes = match state.config.relay_mode {
        RelayMode::WebSocket => {
            realtime::create_realtime_router().layer(middleware::from_fn_with_state(
                state.clone(),
                connection_limit_middleware,
            ))
        }
        RelayMode::EphemeralToken => api::create_session_router(),
    };

    let cors_layer = cors_layer(state.config.cors_allowed_origins.as_deref());

    let governor_layer = if state.config.is_rate_limit_disabled() {
        info!("Rate limiting disabled (rate >= 100000/s)");
        None
    } else {
        let governor_config = GovernorConfigBuilder::default()
            .per_second(state.config.rate_limit_requests_per_second as u64)
            .burst_size(state.config.rate_limit_burst_size)
            .key_extractor(SmartIpKeyExtractor)
            .finish();
        if governor_config.is_none() {
            warn!("Invalid rate limiter settings, rate limiting disabled");
        }
        governor_config.map(GovernorLayer::new)
    };

    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ));

    api::create_public_router()
        .merge(mode_routes)
        .with_state(state)
        .layer(cors_layer)
        .layer(tower::util::option_layer(governor_layer))
        .layer(security_headers)
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    match origins {
        Some("*") => base.allow_origin(Any).allow_credentials(false),
        Some(list) => {
            let origins: Vec<HeaderValue> = list
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            base.allow_origin(origins).allow_credentials(true)
        }
        None => {
            // No allow_origin: browsers block cross-origin requests
            info!(
                "CORS not configured, defaulting to same-origin only. \
                 Set CORS_ALLOWED_ORIGINS to enable cross-origin access."
            );
            base.allow_credentials(false)
        }
    }
}
