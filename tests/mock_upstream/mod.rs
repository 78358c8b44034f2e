//! In-process stand-ins for the realtime API and the relay server
//!
//! `MockUpstream` accepts one WebSocket connection the way the provider does,
//! records what it sees and lets the test push frames or close the socket.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use auraq_voice_relay::{ServerConfig, routes, state::AppState};

/// How long a test waits for any single expected event.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    Connected {
        uri: String,
        authorization: Option<String>,
        openai_beta: Option<String>,
    },
    Text(String),
    Closed,
}

#[derive(Debug)]
pub enum UpstreamCommand {
    Send(String),
    Close,
    /// Drop the TCP connection without a close handshake
    Abort,
}

#[derive(Debug, Clone)]
pub struct MockUpstreamOptions {
    /// Delay between the TCP accept and the WebSocket handshake
    pub handshake_delay: Duration,
    /// Send `session.created` as soon as the socket is open
    pub send_session_created: bool,
}

impl Default for MockUpstreamOptions {
    fn default() -> Self {
        Self {
            handshake_delay: Duration::ZERO,
            send_session_created: true,
        }
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    events: mpsc::UnboundedReceiver<UpstreamEvent>,
    commands: mpsc::UnboundedSender<UpstreamCommand>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self::start_with(MockUpstreamOptions::default()).await
    }

    pub async fn start_with(options: MockUpstreamOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::time::sleep(options.handshake_delay).await;

            let mut connected = None;
            let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                let header = |name: &str| {
                    request
                        .headers()
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                };
                connected = Some(UpstreamEvent::Connected {
                    uri: request.uri().to_string(),
                    authorization: header("authorization"),
                    openai_beta: header("openai-beta"),
                });
                Ok(response)
            };

            let Ok(socket) = accept_hdr_async(stream, callback).await else {
                return;
            };
            if let Some(event) = connected {
                let _ = events_tx.send(event);
            }

            serve_connection(socket, options, events_tx, commands_rx).await;
        });

        Self {
            addr,
            events,
            commands,
        }
    }

    /// Realtime endpoint URL to hand to the relay.
    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }

    pub fn send(&self, text: impl Into<String>) {
        let _ = self.commands.send(UpstreamCommand::Send(text.into()));
    }

    pub fn close(&self) {
        let _ = self.commands.send(UpstreamCommand::Close);
    }

    pub fn abort(&self) {
        let _ = self.commands.send(UpstreamCommand::Abort);
    }

    pub async fn next_event(&mut self) -> UpstreamEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for upstream event")
            .expect("mock upstream stopped")
    }

    /// Next text frame, parsed as JSON.
    pub async fn next_json(&mut self) -> serde_json::Value {
        match self.next_event().await {
            UpstreamEvent::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    /// Asserts nothing reaches the upstream for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(event)) = tokio::time::timeout(window, self.events.recv()).await {
            panic!("unexpected upstream event: {event:?}");
        }
    }
}

async fn serve_connection(
    socket: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    options: MockUpstreamOptions,
    events: mpsc::UnboundedSender<UpstreamEvent>,
    mut commands: mpsc::UnboundedReceiver<UpstreamCommand>,
) {
    let (mut write, mut read) = socket.split();

    if options.send_session_created {
        let created = json!({
            "type": "session.created",
            "event_id": "event_mock_1",
            "session": {"id": "sess_mock", "model": "gpt-4o-realtime-preview-2024-10-01"}
        });
        let _ = write.send(Message::Text(created.to_string().into())).await;
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(UpstreamCommand::Send(text)) => {
                    let _ = write.send(Message::Text(text.into())).await;
                }
                Some(UpstreamCommand::Abort) => {
                    let _ = events.send(UpstreamEvent::Closed);
                    break;
                }
                Some(UpstreamCommand::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    // Wait for the peer to answer the close
                    while let Ok(Some(Ok(_))) = tokio::time::timeout(EVENT_TIMEOUT, read.next()).await {}
                    let _ = events.send(UpstreamEvent::Closed);
                    break;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(UpstreamEvent::Text(text.as_str().to_string()));
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    let _ = events.send(UpstreamEvent::Closed);
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Base relay configuration for tests: key set, rate limiting off.
pub fn relay_config(upstream_url: impl Into<String>) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.openai_api_key = Some("sk-test".to_string());
    config.upstream_realtime_url = upstream_url.into();
    config.upstream_connect_timeout_seconds = 5;
    config.rate_limit_requests_per_second = 100_000;
    config
}

/// Serves the full application on an ephemeral port.
pub async fn spawn_relay(config: ServerConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::create_app(AppState::new(config).unwrap());

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

/// Closed local port, for connect-failure cases.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
