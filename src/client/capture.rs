//! Microphone capture abstraction

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::audio::{CHANNELS, SAMPLE_RATE};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Unsupported capture format: {0}")]
    UnsupportedFormat(String),
}

/// What the call asks of the microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
        }
    }
}

/// Stops a running capture. Cloneable; stopping twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CaptureHandle {
    cancel: CancellationToken,
}

impl CaptureHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once `stop` has been called.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await
    }
}

/// An open microphone: float frames in [-1, 1] until stopped.
///
/// The frame channel closes when the device runs dry or the handle is stopped.
#[derive(Debug)]
pub struct CaptureStream {
    pub frames: mpsc::Receiver<Vec<f32>>,
    pub handle: CaptureHandle,
}

#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Opens the device. Suspends until the user grants or denies access.
    async fn open(&self, constraints: &CaptureConstraints) -> Result<CaptureStream, CaptureError>;
}
