//! Serialized FIFO playback of assistant audio.
//!
//! The queue owns the pending PCM chunks and hands them one at a time to an
//! [`AudioSink`]. A sink reports the natural end of a chunk through the
//! [`PlaybackCompletion`] it was given, which starts the next chunk. Clearing
//! the queue bumps a generation counter so completions from audio that was
//! already playing cannot restart anything.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::codec::build_playable_container;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Output device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to schedule audio: {0}")]
    Scheduling(String),
}

/// Output device abstraction.
pub trait AudioSink: Send + Sync + 'static {
    /// Starts playing one WAV container.
    ///
    /// The sink must call [`PlaybackCompletion::finished`] when the audio
    /// ends naturally, and never from inside `play` itself: the queue holds
    /// its lock across this call. Returning an error skips the chunk.
    fn play(&self, container: Bytes, completion: PlaybackCompletion) -> Result<(), PlaybackError>;

    /// Stops whatever is currently audible. Best-effort. Called with the
    /// queue locked, so it must not call back into the queue.
    fn stop(&self) {}
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Bytes>,
    playing: bool,
    generation: u64,
}

struct QueueShared {
    state: Mutex<QueueState>,
    sink: Arc<dyn AudioSink>,
}

impl QueueShared {
    /// Hands the next decodable chunk to the sink.
    ///
    /// Runs with the state lock held, so a `clear` cannot land between
    /// picking a chunk and starting it.
    fn play_next(self: &Arc<Self>, state: &mut QueueState) {
        while let Some(chunk) = state.pending.pop_front() {
            let container = match build_playable_container(&chunk) {
                Ok(container) => Bytes::from(container),
                Err(e) => {
                    warn!("Skipping undecodable audio chunk ({} bytes): {}", chunk.len(), e);
                    continue;
                }
            };

            let completion = PlaybackCompletion {
                queue: Arc::downgrade(self),
                generation: state.generation,
            };

            match self.sink.play(container, completion) {
                Ok(()) => return,
                Err(e) => {
                    warn!("Failed to play audio chunk, advancing queue: {}", e);
                }
            }
        }
        state.playing = false;
    }

    fn on_finished(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation || !state.playing {
            debug!(
                generation,
                current = state.generation,
                "Ignoring completion from cleared playback"
            );
            return;
        }
        self.play_next(&mut state);
    }
}

/// Token handed to the sink with every chunk it plays.
#[derive(Debug)]
pub struct PlaybackCompletion {
    queue: Weak<QueueShared>,
    generation: u64,
}

impl PlaybackCompletion {
    /// Reports that the chunk finished playing on its own.
    pub fn finished(self) {
        if let Some(queue) = self.queue.upgrade() {
            queue.on_finished(self.generation);
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// FIFO queue of PCM chunks with at most one chunk playing at a time.
#[derive(Clone)]
pub struct PlaybackQueue {
    shared: Arc<QueueShared>,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState::default()),
                sink,
            }),
        }
    }

    /// Appends a chunk and starts playback if the queue was idle.
    pub fn enqueue(&self, chunk: Bytes) {
        if chunk.is_empty() {
            debug!("Ignoring empty audio chunk");
            return;
        }

        let mut state = self.shared.state.lock();
        state.pending.push_back(chunk);
        if !state.playing {
            state.playing = true;
            self.shared.play_next(&mut state);
        }
    }

    /// Drops everything pending and silences the sink.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        state.pending.clear();
        state.playing = false;
        state.generation = state.generation.wrapping_add(1);
        self.shared.sink.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.lock().playing
    }

    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }
}

impl std::fmt::Debug for PlaybackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackQueue")
            .field("playing", &self.is_playing())
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// One chunk delivered to a [`ChannelSink`] consumer.
#[derive(Debug)]
pub struct PlaybackItem {
    pub container: Bytes,
    pub completion: PlaybackCompletion,
}

/// Sink that forwards containers to an async consumer over a channel.
///
/// The consumer owns playback timing and calls `completion.finished()` once
/// the chunk has been rendered.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PlaybackItem>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlaybackItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AudioSink for ChannelSink {
    fn play(&self, container: Bytes, completion: PlaybackCompletion) -> Result<(), PlaybackError> {
        self.tx
            .send(PlaybackItem {
                container,
                completion,
            })
            .map_err(|_| PlaybackError::DeviceUnavailable("playback consumer dropped".to_string()))
    }
}
