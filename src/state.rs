use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::config::ServerConfig;
use crate::core::realtime::CoachSessionSettings;
use crate::errors::app_error::AppError;
use crate::relay::{Credentials, SessionInitiator, create_session_initiator};

/// Why a WebSocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

/// Shared application state.
pub struct AppState {
    pub config: ServerConfig,
    pub session_settings: Arc<CoachSessionSettings>,
    pub initiator: Arc<dyn SessionInitiator>,
    active_connections: AtomicUsize,
    connections_per_ip: DashMap<IpAddr, u32>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, AppError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.upstream_connect_timeout_seconds))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let session_settings = Arc::new(config.coach.clone());
        let initiator = create_session_initiator(&config, session_settings.clone(), http_client);

        Ok(Arc::new(Self {
            config,
            session_settings,
            initiator,
            active_connections: AtomicUsize::new(0),
            connections_per_ip: DashMap::new(),
        }))
    }

    /// Upstream credential, or a configuration error when it is missing.
    pub fn credentials(&self) -> Result<Credentials, AppError> {
        self.config.credentials().ok_or_else(|| {
            AppError::Configuration("OPENAI_API_KEY is not configured".to_string())
        })
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.config.relay_idle_timeout_seconds)
    }

    /// Reserves a WebSocket slot for `ip`, enforcing global and per-IP limits.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections {
            let reserved = self
                .active_connections
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    (current < max).then_some(current + 1)
                });
            if reserved.is_err() {
                return Err(ConnectionLimitError::GlobalLimitReached);
            }
        } else {
            self.active_connections.fetch_add(1, Ordering::SeqCst);
        }

        let mut entry = self.connections_per_ip.entry(ip).or_insert(0);
        if *entry >= self.config.max_connections_per_ip {
            drop(entry);
            self.active_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *entry += 1;

        debug!(
            ip = %ip,
            per_ip = *entry,
            total = self.active_connections.load(Ordering::SeqCst),
            "Connection slot acquired"
        );
        Ok(())
    }

    /// Returns a slot taken by [`Self::try_acquire_connection`].
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| current.checked_sub(1));

        self.connections_per_ip
            .remove_if_mut(&ip, |_, count| {
                *count = count.saturating_sub(1);
                *count == 0
            });
    }

    pub fn ws_connection_count(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.connections_per_ip.get(ip).map(|count| *count).unwrap_or(0)
    }
}

/// Holds a connection slot and gives it back on drop.
pub struct ConnectionGuard {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl ConnectionGuard {
    pub fn new(state: Arc<AppState>, ip: IpAddr) -> Self {
        Self { state, ip }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
    }
}
