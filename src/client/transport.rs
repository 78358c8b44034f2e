//! Client WebSocket transport
//!
//! One task owns the socket. Outgoing events arrive over a bounded channel
//! from [`TransportSender`], incoming frames are parsed into
//! [`ServerEvent`]s and handed to the session as [`TransportEvent`]s. The
//! `open` flag is cleared as soon as the socket goes away, and every send
//! checks it first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Message, client::IntoClientRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::TransportMode;
use crate::core::realtime::{ClientEvent, ServerEvent};
use crate::relay::{
    CLOSE_TIMEOUT, EphemeralSession, RelayError, UpstreamConnection, connect_upstream,
    upstream_request,
};

/// Outgoing events buffered ahead of the socket.
const SEND_BUFFER_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Connection rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Transport is closed")]
    Closed,
}

impl From<RelayError> for TransportError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::UpstreamRejected { status, body } => TransportError::Rejected { status, body },
            other => TransportError::Connect(other.to_string()),
        }
    }
}

/// What the transport task reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Server(ServerEvent),
    /// The socket is gone. `reason` is set when it failed rather than closed.
    Closed { reason: Option<String> },
}

/// Single-writer send handle shared by the capture and dispatch tasks.
#[derive(Debug, Clone)]
pub struct TransportSender {
    tx: mpsc::Sender<ClientEvent>,
    open: Arc<AtomicBool>,
}

impl TransportSender {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub async fn send(&self, event: ClientEvent) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx.send(event).await.map_err(|_| TransportError::Closed)
    }
}

/// Closes the socket. Safe to call any number of times.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    cancel: CancellationToken,
    open: Arc<AtomicBool>,
}

impl TransportHandle {
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.cancel.cancel();
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// A connected transport, split into its three handles.
#[derive(Debug)]
pub struct Transport {
    pub sender: TransportSender,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    pub handle: TransportHandle,
}

/// Opens the transport selected by `mode`.
///
/// Direct mode first fetches an ephemeral token from the relay, then
/// connects to the provider with it.
pub async fn connect(mode: &TransportMode, connect_timeout: Duration) -> Result<Transport, TransportError> {
    let request = match mode {
        TransportMode::Relay { url } => url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?,
        TransportMode::Direct {
            token_url,
            upstream_url,
            model,
        } => {
            let session = fetch_ephemeral_session(token_url, connect_timeout).await?;
            let token = session.client_secret().ok_or_else(|| {
                TransportError::TokenExchange("response has no client_secret".to_string())
            })?;
            upstream_request(upstream_url, model, token)?
        }
    };

    let socket = connect_upstream(request, connect_timeout).await?;
    info!("Transport connected");
    Ok(spawn_transport(socket))
}

async fn fetch_ephemeral_session(
    token_url: &str,
    timeout: Duration,
) -> Result<EphemeralSession, TransportError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TransportError::TokenExchange(e.to_string()))?;

    let response = client
        .post(token_url)
        .send()
        .await
        .map_err(|e| TransportError::TokenExchange(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let payload = response
        .json()
        .await
        .map_err(|e| TransportError::TokenExchange(e.to_string()))?;
    Ok(EphemeralSession { payload })
}

fn spawn_transport(socket: UpstreamConnection) -> Transport {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ClientEvent>(SEND_BUFFER_SIZE);
    let (events_tx, events) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(true));
    let cancel = CancellationToken::new();

    let task_open = open.clone();
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut reason = None;

        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => {
                    let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws_sink.send(Message::Close(None))).await;
                    break;
                }

                Some(event) = rx.recv() => {
                    let json = match event.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize client event");
                            continue;
                        }
                    };
                    if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                        reason = Some(e.to_string());
                        break;
                    }
                }

                msg = ws_stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => match ServerEvent::parse(text.as_str()) {
                        Ok(event) => {
                            let _ = events_tx.send(TransportEvent::Server(event));
                        }
                        Err(e) => warn!(error = %e, "Skipping unparseable server event"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Transport closed by peer");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        reason = Some(e.to_string());
                        break;
                    }
                    None => break,
                }
            }
        }

        task_open.store(false, Ordering::Release);
        if let Some(ref reason) = reason {
            warn!(%reason, "Transport failed");
        }
        let _ = events_tx.send(TransportEvent::Closed { reason });
    });

    Transport {
        sender: TransportSender {
            tx,
            open: open.clone(),
        },
        events,
        handle: TransportHandle { cancel, open },
    }
}
