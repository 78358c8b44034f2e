//! Call lifecycle and upstream event dispatch
//!
//! A [`SessionController`] owns everything a call acquires: the microphone,
//! the transport and the playback queue. They live in one
//! `SessionResources` value that is released exactly once, whichever of
//! `end_call`, a transport failure or `Drop` gets there first.
//!
//! # State machine
//!
//! ```text
//! idle -> connecting -> active -> ended
//!            |            |
//!            +--> idle <--+   (permission denied, connect failure, transport closed)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::capture::{AudioCapture, CaptureError, CaptureHandle, CaptureStream};
use super::transcript::Transcript;
use super::transport::{self, TransportError, TransportEvent, TransportHandle, TransportSender};
use super::ClientConfig;
use crate::core::audio::{AudioSink, PlaybackQueue, decode_from_wire, encode_for_wire};
use crate::core::realtime::{ClientEvent, ServerEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallState {
    #[default]
    Idle,
    Connecting,
    Active,
    Ended,
}

/// Everything the UI renders for a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub state: CallState,
    /// The coach is talking
    pub speaking: bool,
    pub transcript: Transcript,
    pub last_error: Option<String>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Microphone access was denied. Allow microphone access to talk to your coach.")]
    PermissionDenied,

    #[error("Microphone error: {0}")]
    Capture(CaptureError),

    #[error("Could not reach the coach: {0}")]
    Transport(#[from] TransportError),

    #[error("A call is already in progress")]
    AlreadyActive,

    #[error("The call was ended while connecting")]
    Cancelled,
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => SessionError::PermissionDenied,
            other => SessionError::Capture(other),
        }
    }
}

/// Handles acquired by one call.
struct SessionResources {
    released: AtomicBool,
    cancel: CancellationToken,
    capture: CaptureHandle,
    transport: TransportHandle,
    playback: PlaybackQueue,
}

impl SessionResources {
    /// Tears everything down. Returns `false` if it already happened.
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        self.capture.stop();
        self.transport.close();
        self.playback.clear();
        debug!("Session resources released");
        true
    }
}

/// Maps upstream events onto the session view and the playback queue.
struct EventDispatcher {
    view: Arc<watch::Sender<SessionView>>,
    playback: PlaybackQueue,
}

impl EventDispatcher {
    fn dispatch(&self, event: ServerEvent) {
        match event {
            ServerEvent::AudioDelta { delta, .. } => match decode_from_wire(&delta) {
                Ok(pcm) => {
                    self.playback.enqueue(pcm);
                    self.view.send_if_modified(|view| !std::mem::replace(&mut view.speaking, true));
                }
                Err(e) => warn!(error = %e, "Dropping undecodable audio delta"),
            },
            ServerEvent::AudioDone { .. } => {
                self.view.send_if_modified(|view| std::mem::replace(&mut view.speaking, false));
            }
            ServerEvent::TranscriptionCompleted { transcript, .. } => {
                self.view.send_modify(|view| view.transcript.push_user(transcript));
            }
            ServerEvent::AudioTranscriptDelta { delta, .. } => {
                self.view
                    .send_modify(|view| view.transcript.push_assistant_delta(&delta));
            }
            ServerEvent::AudioTranscriptDone { .. } | ServerEvent::ResponseDone { .. } => {
                self.view.send_modify(|view| view.transcript.end_assistant_turn());
            }
            ServerEvent::Error { error } => {
                warn!(message = error.message(), "Upstream reported an error");
                let message = error.message().to_string();
                self.view.send_modify(|view| view.last_error = Some(message));
            }
            ServerEvent::SpeechStarted { .. } => {
                // Barge-in: the user talks over the coach
                self.playback.clear();
            }
            ServerEvent::TranscriptionFailed { error, .. } => {
                debug!(message = %error.message, "Input transcription failed");
            }
            ServerEvent::SessionCreated { session } | ServerEvent::SessionUpdated { session } => {
                debug!(session_id = %session.id, "Session event");
            }
            event @ (ServerEvent::SpeechStopped { .. }
            | ServerEvent::InputAudioBufferCommitted { .. }
            | ServerEvent::ResponseCreated { .. }
            | ServerEvent::Unknown) => {
                trace!(?event, "Ignoring server event");
            }
        }
    }
}

/// A `start_call` that has not reached `Active` yet.
struct PendingCall {
    cancel: CancellationToken,
    capture: Option<CaptureHandle>,
}

impl PendingCall {
    fn abort(self) {
        self.cancel.cancel();
        if let Some(capture) = self.capture {
            capture.stop();
        }
    }
}

/// Drives one call at a time and publishes its [`SessionView`].
pub struct SessionController {
    config: ClientConfig,
    capture: Arc<dyn AudioCapture>,
    sink: Arc<dyn AudioSink>,
    view: Arc<watch::Sender<SessionView>>,
    pending: Mutex<Option<PendingCall>>,
    resources: Mutex<Option<Arc<SessionResources>>>,
}

impl SessionController {
    pub fn new(config: ClientConfig, capture: Arc<dyn AudioCapture>, sink: Arc<dyn AudioSink>) -> Self {
        let (view, _) = watch::channel(SessionView::default());
        Self {
            config,
            capture,
            sink,
            view: Arc::new(view),
            pending: Mutex::new(None),
            resources: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> CallState {
        self.view.borrow().state
    }

    /// Playback queue of the current call, if one was started.
    pub fn playback(&self) -> Option<PlaybackQueue> {
        self.resources.lock().as_ref().map(|r| r.playback.clone())
    }

    /// Opens the microphone and the transport, then streams audio until
    /// [`end_call`](Self::end_call).
    ///
    /// On failure every handle acquired so far is released and the state
    /// returns to `Idle`. If `end_call` runs first, the open steps are
    /// abandoned and this returns [`SessionError::Cancelled`].
    pub async fn start_call(&self) -> Result<(), SessionError> {
        let cancel = CancellationToken::new();
        let claimed = self.view.send_if_modified(|view| {
            if matches!(view.state, CallState::Connecting | CallState::Active) {
                return false;
            }
            *view = SessionView {
                state: CallState::Connecting,
                ..SessionView::default()
            };
            true
        });
        if !claimed {
            return Err(SessionError::AlreadyActive);
        }
        if let Some(stale) = self.pending.lock().replace(PendingCall {
            cancel: cancel.clone(),
            capture: None,
        }) {
            stale.abort();
        }
        if self.state() != CallState::Connecting {
            // end_call ran before the pending call was registered
            self.pending.lock().take();
            return Err(SessionError::Cancelled);
        }

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            opened = self.capture.open(&self.config.capture) => opened,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                let err = SessionError::from(e);
                warn!(error = %err, "Could not open microphone");
                self.fail_connecting(&err);
                return Err(err);
            }
        };

        // From here on end_call stops the microphone directly.
        let registered = match self.pending.lock().as_mut() {
            Some(pending) if !pending.cancel.is_cancelled() => {
                pending.capture = Some(stream.handle.clone());
                true
            }
            _ => false,
        };
        if !registered {
            stream.handle.stop();
            return Err(SessionError::Cancelled);
        }

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                stream.handle.stop();
                info!("Call ended while connecting");
                return Err(SessionError::Cancelled);
            }
            connected = transport::connect(&self.config.transport, self.config.connect_timeout) => connected,
        };
        let transport = match connected {
            Ok(transport) => transport,
            Err(e) => {
                stream.handle.stop();
                let err = SessionError::from(e);
                warn!(error = %err, "Could not connect transport");
                self.fail_connecting(&err);
                return Err(err);
            }
        };

        let resources = Arc::new(SessionResources {
            released: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            capture: stream.handle.clone(),
            transport: transport.handle.clone(),
            playback: PlaybackQueue::new(self.sink.clone()),
        });

        // Activation and storing the resources happen under one lock, so an
        // end_call either prevents activation or finds the resources.
        let activated = {
            let mut slot = self.resources.lock();
            let activated = self.view.send_if_modified(|view| {
                if view.state != CallState::Connecting {
                    return false;
                }
                view.state = CallState::Active;
                true
            });
            if activated {
                if let Some(previous) = slot.replace(resources.clone()) {
                    previous.release();
                }
            }
            activated
        };
        self.pending.lock().take();

        if !activated {
            resources.release();
            return Err(SessionError::Cancelled);
        }

        tokio::spawn(pump_capture(stream, transport.sender, resources.cancel.clone()));
        tokio::spawn(run_dispatch(
            transport.events,
            EventDispatcher {
                view: self.view.clone(),
                playback: resources.playback.clone(),
            },
            resources,
        ));

        info!("Call started");
        Ok(())
    }

    /// Stops capture, closes the transport and discards unplayed audio.
    ///
    /// Also abandons a call that is still connecting. Idempotent; only the
    /// first call after a start does anything.
    pub fn end_call(&self) {
        let ended = self.view.send_if_modified(|view| {
            if matches!(view.state, CallState::Connecting | CallState::Active) {
                view.state = CallState::Ended;
                view.speaking = false;
                true
            } else {
                false
            }
        });

        let pending = self.pending.lock().take();
        let aborted = pending.is_some();
        if let Some(pending) = pending {
            pending.abort();
        }

        let released = self
            .resources
            .lock()
            .as_ref()
            .map(|resources| resources.release())
            .unwrap_or(false);

        if ended || aborted || released {
            info!("Call ended");
        }
    }

    fn fail_connecting(&self, err: &SessionError) {
        self.pending.lock().take();
        let message = err.to_string();
        self.view.send_modify(|view| {
            if view.state == CallState::Connecting {
                view.state = CallState::Idle;
            }
            view.last_error = Some(message);
        });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.abort();
        }
        if let Some(resources) = self.resources.get_mut().take() {
            resources.release();
        }
    }
}

async fn pump_capture(mut stream: CaptureStream, sender: TransportSender, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = stream.frames.recv() => {
                let Some(frame) = frame else {
                    debug!("Microphone stream ended");
                    break;
                };
                let audio = encode_for_wire(&frame);
                if sender.send(ClientEvent::InputAudioBufferAppend { audio }).await.is_err() {
                    break;
                }
            }
        }
    }
    stream.handle.stop();
}

async fn run_dispatch(
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    dispatcher: EventDispatcher,
    resources: Arc<SessionResources>,
) {
    loop {
        tokio::select! {
            biased;
            _ = resources.cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(TransportEvent::Server(event)) => dispatcher.dispatch(event),
                Some(TransportEvent::Closed { reason }) => {
                    close_from_transport(&dispatcher.view, &resources, reason);
                    break;
                }
                None => {
                    close_from_transport(&dispatcher.view, &resources, None);
                    break;
                }
            }
        }
    }
}

fn close_from_transport(
    view: &watch::Sender<SessionView>,
    resources: &SessionResources,
    reason: Option<String>,
) {
    if !resources.release() {
        return;
    }
    info!(?reason, "Transport closed, call is back to idle");
    view.send_modify(|view| {
        if view.state == CallState::Active {
            view.state = CallState::Idle;
        }
        view.speaking = false;
        if reason.is_some() {
            view.last_error = reason;
        }
    });
}
