//! Bridges one client WebSocket to one upstream realtime session.
//!
//! The upstream is opened concurrently with reading the client. Until it is
//! open, client frames are dropped (counted, never queued). On the first
//! upstream `session.created` the relay sends the coach `session.update`
//! exactly once, then both directions are forwarded verbatim. When either
//! leg ends, the other is closed within [`CLOSE_TIMEOUT`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::{select, time::timeout};
use tokio_tungstenite::tungstenite::{self, Message as UpstreamMessage};
use tracing::{debug, error, info, warn};

use crate::core::realtime::{CoachSessionSettings, event_type};

use super::base::{Credentials, RelayError, SessionHandle, SessionInitiator, UpstreamConnection};

const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Upper bound for delivering a close frame to either leg.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest idle period a link accepts; keeps the idle deadline representable.
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

type UpstreamSink = SplitSink<UpstreamConnection, UpstreamMessage>;
type UpstreamStream = SplitStream<UpstreamConnection>;

/// Frames on their way to the client.
#[derive(Debug)]
enum ClientRoute {
    Text(String),
    Binary(Bytes),
    Close,
}

/// Why a link ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTermination {
    ClientClosed,
    UpstreamClosed,
    UpstreamFailed,
    IdleTimeout,
}

/// Per-link counters, returned when the link ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
    pub dropped_before_open: u64,
    pub session_configured: bool,
}

/// One client ⇄ upstream pair.
pub struct RelayLink {
    link_id: String,
    settings: Arc<CoachSessionSettings>,
    idle_timeout: Duration,
    stats: LinkStats,
}

impl RelayLink {
    pub fn new(settings: Arc<CoachSessionSettings>, idle_timeout: Duration) -> Self {
        Self {
            link_id: uuid::Uuid::new_v4().to_string(),
            settings,
            idle_timeout: idle_timeout.min(MAX_IDLE_TIMEOUT),
            stats: LinkStats::default(),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn link_id(&self) -> &str {
        &self.link_id
    }

    /// Runs the link until either side goes away.
    pub async fn run(
        mut self,
        socket: WebSocket,
        initiator: Arc<dyn SessionInitiator>,
        credentials: Credentials,
    ) -> (LinkTermination, LinkStats) {
        let link_id = self.link_id.clone();
        info!(link_id = %link_id, "Relay link established");

        let (mut client_sink, mut client_stream) = socket.split();
        let (client_tx, mut client_rx) = mpsc::channel::<ClientRoute>(CHANNEL_BUFFER_SIZE);

        let writer = tokio::spawn(async move {
            while let Some(route) = client_rx.recv().await {
                let should_close = matches!(route, ClientRoute::Close);

                let result = match route {
                    ClientRoute::Text(text) => client_sink.send(Message::Text(text.into())).await,
                    ClientRoute::Binary(data) => client_sink.send(Message::Binary(data)).await,
                    ClientRoute::Close => client_sink.send(Message::Close(None)).await,
                };

                if let Err(e) = result {
                    debug!("Client leg no longer writable: {}", e);
                    break;
                }
                if should_close {
                    break;
                }
            }
        });

        let mut connect = initiator.initiate_session(&credentials);
        let mut connecting = true;
        let mut upstream_sink: Option<UpstreamSink> = None;
        let mut upstream_stream: Option<UpstreamStream> = None;
        let mut last_activity = Instant::now();

        let termination = loop {
            select! {
                result = &mut connect, if connecting => {
                    connecting = false;
                    match result {
                        Ok(SessionHandle::Relay(connection)) => {
                            info!(link_id = %link_id, "Upstream session open");
                            let (sink, stream) = connection.split();
                            upstream_sink = Some(sink);
                            upstream_stream = Some(stream);
                        }
                        Ok(SessionHandle::Token(_)) => {
                            error!(link_id = %link_id, "Session initiator returned a token on the relay path");
                            send_error(&client_tx, "upstream_connection_error", "Relay is not configured for WebSocket sessions").await;
                            break LinkTermination::UpstreamFailed;
                        }
                        Err(e) => {
                            warn!(link_id = %link_id, "Upstream connection failed: {}", e);
                            send_error(&client_tx, "upstream_connection_error", &upstream_error_message(&e)).await;
                            break LinkTermination::UpstreamFailed;
                        }
                    }
                }

                msg = client_stream.next() => {
                    last_activity = Instant::now();
                    let frame = match msg {
                        Some(Ok(Message::Text(text))) => UpstreamMessage::Text(text.as_str().to_owned().into()),
                        Some(Ok(Message::Binary(data))) => UpstreamMessage::Binary(data),
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                        Some(Ok(Message::Close(_))) | None => {
                            info!(link_id = %link_id, "Client closed the connection");
                            break LinkTermination::ClientClosed;
                        }
                        Some(Err(e)) => {
                            warn!(link_id = %link_id, "Client WebSocket error: {}", e);
                            break LinkTermination::ClientClosed;
                        }
                    };

                    let Some(sink) = upstream_sink.as_mut() else {
                        self.stats.dropped_before_open += 1;
                        debug!(
                            link_id = %link_id,
                            dropped = self.stats.dropped_before_open,
                            "Upstream not open yet, dropping client frame"
                        );
                        continue;
                    };

                    if let Err(e) = sink.send(frame).await {
                        warn!(link_id = %link_id, "Failed to forward to upstream: {}", e);
                        send_error(&client_tx, "upstream_connection_error", &format!("Upstream connection error: {e}")).await;
                        break LinkTermination::UpstreamFailed;
                    }
                    self.stats.client_to_upstream += 1;
                }

                msg = next_upstream(&mut upstream_stream) => {
                    last_activity = Instant::now();
                    match msg {
                        Some(Ok(UpstreamMessage::Text(text))) => {
                            if !self.stats.session_configured
                                && event_type(text.as_str()).as_deref() == Some("session.created")
                            {
                                self.stats.session_configured = true;
                                if let Some(sink) = upstream_sink.as_mut()
                                    && let Err(e) = self.configure_session(sink).await
                                {
                                    warn!(link_id = %link_id, "Failed to configure session: {}", e);
                                    send_error(&client_tx, "upstream_connection_error", &upstream_error_message(&e)).await;
                                    break LinkTermination::UpstreamFailed;
                                }
                            }

                            if client_tx.send(ClientRoute::Text(text.as_str().to_owned())).await.is_err() {
                                break LinkTermination::ClientClosed;
                            }
                            self.stats.upstream_to_client += 1;
                        }
                        Some(Ok(UpstreamMessage::Binary(data))) => {
                            if client_tx.send(ClientRoute::Binary(data)).await.is_err() {
                                break LinkTermination::ClientClosed;
                            }
                            self.stats.upstream_to_client += 1;
                        }
                        Some(Ok(UpstreamMessage::Ping(payload))) => {
                            if let Some(sink) = upstream_sink.as_mut() {
                                let _ = sink.send(UpstreamMessage::Pong(payload)).await;
                            }
                        }
                        Some(Ok(UpstreamMessage::Pong(_) | UpstreamMessage::Frame(_))) => {}
                        Some(Ok(UpstreamMessage::Close(frame))) => {
                            info!(link_id = %link_id, ?frame, "Upstream closed the connection");
                            break LinkTermination::UpstreamClosed;
                        }
                        None => {
                            info!(link_id = %link_id, "Upstream stream ended");
                            break LinkTermination::UpstreamClosed;
                        }
                        Some(Err(e)) => {
                            warn!(link_id = %link_id, "Upstream WebSocket error: {}", e);
                            send_error(&client_tx, "upstream_connection_error", &format!("Upstream connection error: {e}")).await;
                            break LinkTermination::UpstreamFailed;
                        }
                    }
                }

                _ = tokio::time::sleep_until(last_activity + self.idle_timeout) => {
                    warn!(
                        link_id = %link_id,
                        idle_secs = self.idle_timeout.as_secs(),
                        "Relay link idle, closing"
                    );
                    send_error(&client_tx, "idle_timeout", "Connection closed due to inactivity").await;
                    break LinkTermination::IdleTimeout;
                }
            }
        };

        // Cancel a connect attempt that is still in flight.
        drop(connect);

        if let Some(mut sink) = upstream_sink.take() {
            match timeout(CLOSE_TIMEOUT, sink.close()).await {
                Ok(Ok(())) => debug!(link_id = %link_id, "Upstream leg closed"),
                Ok(Err(e)) => debug!(link_id = %link_id, "Upstream leg already gone: {}", e),
                Err(_) => warn!(link_id = %link_id, "Timed out closing upstream leg"),
            }
        }

        let _ = client_tx.send(ClientRoute::Close).await;
        drop(client_tx);
        if timeout(CLOSE_TIMEOUT, writer).await.is_err() {
            warn!(link_id = %link_id, "Timed out closing client leg");
        }

        info!(
            link_id = %link_id,
            ?termination,
            client_to_upstream = self.stats.client_to_upstream,
            upstream_to_client = self.stats.upstream_to_client,
            dropped_before_open = self.stats.dropped_before_open,
            "Relay link terminated"
        );

        (termination, self.stats)
    }

    /// Sends the one-time `session.update`, plus the greeting request if set.
    async fn configure_session(&self, sink: &mut UpstreamSink) -> Result<(), RelayError> {
        let update = self.settings.session_update().to_json()?;
        sink.send(UpstreamMessage::Text(update.into())).await?;
        info!(link_id = %self.link_id, "Session configuration sent upstream");

        if let Some(greeting) = self.settings.greeting_request() {
            sink.send(UpstreamMessage::Text(greeting.to_json()?.into())).await?;
            debug!(link_id = %self.link_id, "Greeting requested");
        }
        Ok(())
    }
}

async fn next_upstream(
    stream: &mut Option<UpstreamStream>,
) -> Option<Result<UpstreamMessage, tungstenite::Error>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

fn upstream_error_message(err: &RelayError) -> String {
    match err {
        RelayError::UpstreamRejected { status, body } if !body.is_empty() => {
            format!("Upstream rejected the connection ({status}): {body}")
        }
        other => other.to_string(),
    }
}

/// Delivers a synthetic `error` event shaped like the upstream's own.
async fn send_error(client_tx: &mpsc::Sender<ClientRoute>, code: &str, message: &str) {
    let event = json!({
        "type": "error",
        "error": {
            "type": code,
            "code": code,
            "message": message,
        }
    });
    let _ = client_tx.send(ClientRoute::Text(event.to_string())).await;
}
