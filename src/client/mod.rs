//! Client side of a coach call
//!
//! Captures microphone audio, streams it to the relay (or directly to the
//! provider with an ephemeral token), plays the coach's audio back in order
//! and publishes one UI-visible [`SessionView`].
//!
//! - `capture` - Microphone abstraction and capture constraints
//! - `devices` - WAV-file backed microphone and speaker
//! - `transport` - WebSocket transport with a single-writer send handle
//! - `transcript` - Running conversation transcript
//! - `session` - Call lifecycle and upstream event dispatch

pub mod capture;
pub mod devices;
pub mod session;
pub mod transcript;
pub mod transport;

use std::time::Duration;

pub use capture::{AudioCapture, CaptureConstraints, CaptureError, CaptureHandle, CaptureStream};
pub use devices::{WavFileCapture, WavFileSink};
pub use session::{CallState, SessionController, SessionError, SessionView};
pub use transcript::{Transcript, TranscriptMessage, TranscriptRole};
pub use transport::{TransportError, TransportEvent, TransportSender};

use crate::core::realtime::{DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_URL};

/// How the client reaches the realtime API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    /// Through the relay's `GET /realtime` WebSocket.
    Relay { url: String },
    /// Fetch an ephemeral token from the relay's `POST /session`, then
    /// connect to the provider directly.
    Direct {
        token_url: String,
        upstream_url: String,
        model: String,
    },
}

impl TransportMode {
    pub fn relay(url: impl Into<String>) -> Self {
        TransportMode::Relay { url: url.into() }
    }

    /// Direct mode against the default provider endpoint and model.
    pub fn direct(token_url: impl Into<String>) -> Self {
        TransportMode::Direct {
            token_url: token_url.into(),
            upstream_url: OPENAI_REALTIME_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: TransportMode,
    pub capture: CaptureConstraints,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(transport: TransportMode) -> Self {
        Self {
            transport,
            capture: CaptureConstraints::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(TransportMode::relay("ws://127.0.0.1:3001/realtime"))
    }
}
