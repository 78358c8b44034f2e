//! WAV-file devices for headless calls
//!
//! `WavFileCapture` plays a recording into the call as if it were a
//! microphone; `WavFileSink` collects everything the coach says so it can be
//! written out when the call ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::capture::{AudioCapture, CaptureConstraints, CaptureError, CaptureHandle, CaptureStream};
use crate::core::audio::{
    AudioSink, BITS_PER_SAMPLE, CHANNELS, PlaybackCompletion, PlaybackError, SAMPLE_RATE,
    decode_container, pcm16_to_float,
};

/// 100 ms of audio at the wire sample rate.
const FRAME_SAMPLES: usize = (SAMPLE_RATE / 10) as usize;

/// Microphone backed by a 24 kHz mono WAV file.
#[derive(Debug, Clone)]
pub struct WavFileCapture {
    path: PathBuf,
    frame_interval: Duration,
}

impl WavFileCapture {
    /// Frames are paced at real time.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame_interval: Duration::from_millis(100),
        }
    }

    /// Overrides the pacing between frames; zero sends as fast as possible.
    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }
}

fn read_samples(path: &Path) -> Result<Vec<f32>, CaptureError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {e}", path.display())))?;

    let spec = reader.spec();
    if spec.channels != CHANNELS || spec.sample_rate != SAMPLE_RATE {
        return Err(CaptureError::UnsupportedFormat(format!(
            "expected {SAMPLE_RATE} Hz mono, got {} Hz with {} channels",
            spec.sample_rate, spec.channels
        )));
    }

    match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(pcm16_to_float))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string())),
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string())),
        (format, bits) => Err(CaptureError::UnsupportedFormat(format!("{format:?} {bits}-bit"))),
    }
}

#[async_trait]
impl AudioCapture for WavFileCapture {
    async fn open(&self, constraints: &CaptureConstraints) -> Result<CaptureStream, CaptureError> {
        if constraints.sample_rate != SAMPLE_RATE || constraints.channels != CHANNELS {
            return Err(CaptureError::UnsupportedFormat(format!(
                "file capture only produces {SAMPLE_RATE} Hz mono"
            )));
        }

        let path = self.path.clone();
        let samples = tokio::task::spawn_blocking(move || read_samples(&path))
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))??;

        info!(path = %self.path.display(), samples = samples.len(), "Opened WAV capture");

        let (tx, frames) = mpsc::channel(16);
        let handle = CaptureHandle::new();
        let stopped = handle.clone();
        let frame_interval = self.frame_interval;

        tokio::spawn(async move {
            for frame in samples.chunks(FRAME_SAMPLES) {
                if stopped.is_stopped() || tx.send(frame.to_vec()).await.is_err() {
                    break;
                }
                if !frame_interval.is_zero() {
                    tokio::select! {
                        _ = stopped.stopped() => break,
                        _ = tokio::time::sleep(frame_interval) => {}
                    }
                }
            }
            debug!("WAV capture finished");
        });

        Ok(CaptureStream { frames, handle })
    }
}

/// Speaker that records every played chunk.
#[derive(Debug, Clone, Default)]
pub struct WavFileSink {
    samples: Arc<Mutex<Vec<i16>>>,
}

impl WavFileSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<i16> {
        self.samples.lock().clone()
    }

    /// Writes everything played so far as a 24 kHz mono WAV file.
    pub fn write_to(&self, path: &Path) -> Result<usize, hound::Error> {
        let spec = hound::WavSpec {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        };
        let samples = self.samples();
        let mut writer = hound::WavWriter::create(path, spec)?;
        for sample in &samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        Ok(samples.len())
    }
}

impl AudioSink for WavFileSink {
    fn play(&self, container: Bytes, completion: PlaybackCompletion) -> Result<(), PlaybackError> {
        let decoded =
            decode_container(&container).map_err(|e| PlaybackError::Scheduling(e.to_string()))?;
        self.samples.lock().extend_from_slice(&decoded);

        // Rendering is instantaneous. The queue is locked while we run, so
        // the end is reported from elsewhere.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { completion.finished() });
            }
            Err(_) => {
                std::thread::spawn(move || completion.finished());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::PlaybackQueue;
    use tempfile::tempdir;

    fn write_wav(path: &Path, spec: hound::WavSpec, samples: &[i16]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn wire_spec() -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate: 24_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[tokio::test]
    async fn test_capture_frames_cover_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mic.wav");
        write_wav(&path, wire_spec(), &vec![0i16; 5000]);

        let capture = WavFileCapture::new(&path).with_frame_interval(Duration::ZERO);
        let mut stream = capture.open(&CaptureConstraints::default()).await.unwrap();

        let mut lengths = Vec::new();
        while let Some(frame) = stream.frames.recv().await {
            lengths.push(frame.len());
        }
        assert_eq!(lengths, vec![2400, 2400, 200]);
    }

    #[tokio::test]
    async fn test_capture_rejects_wrong_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mic.wav");
        let mut spec = wire_spec();
        spec.sample_rate = 16_000;
        write_wav(&path, spec, &[0i16; 10]);

        let err = WavFileCapture::new(&path)
            .open(&CaptureConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_capture_missing_file() {
        let err = WavFileCapture::new("/nonexistent/mic.wav")
            .open(&CaptureConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_capture_stops_on_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mic.wav");
        write_wav(&path, wire_spec(), &vec![0i16; 24_000]);

        let capture = WavFileCapture::new(&path).with_frame_interval(Duration::from_secs(5));
        let mut stream = capture.open(&CaptureConstraints::default()).await.unwrap();

        assert!(stream.frames.recv().await.is_some());
        stream.handle.stop();
        assert!(stream.frames.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_sink_records_queue_in_order() {
        let sink = WavFileSink::new();
        let queue = PlaybackQueue::new(Arc::new(sink.clone()));

        queue.enqueue(Bytes::from_static(&[1, 0, 2, 0]));
        queue.enqueue(Bytes::from_static(&[3, 0]));

        for _ in 0..50 {
            if !queue.is_playing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!queue.is_playing());
        assert_eq!(sink.samples(), vec![1, 2, 3]);

        let dir = tempdir().unwrap();
        let out = dir.path().join("coach.wav");
        assert_eq!(sink.write_to(&out).unwrap(), 3);
        let reader = hound::WavReader::open(&out).unwrap();
        assert_eq!(reader.len(), 3);
    }
}
