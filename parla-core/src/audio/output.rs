//! Speaker output via cpal, fed by a FIFO sample queue.
//!
//! The playback pipeline appends device-rate samples to [`OutputQueue`] in
//! arrival order; the output callback drains it. FIFO ordering is what makes
//! scheduled chunks play back-to-back with no gaps or overlaps. Clearing the
//! queue is the interruption primitive: everything not yet rendered is gone.

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
#[cfg(feature = "audio-cpal")]
use tracing::{error, info};

use crate::audio::OutputStream;
#[cfg(feature = "audio-cpal")]
use crate::error::ParlaError;
use crate::error::Result;

/// Shared FIFO of mono device-rate samples awaiting playout.
///
/// Cloneable handle; the producer side is the pipeline thread, the consumer
/// side is the output callback (via `try_lock`, silence on contention). The
/// played-frame counter is the session's output clock source.
#[derive(Debug, Clone)]
pub struct OutputQueue {
    samples: Arc<Mutex<VecDeque<f32>>>,
    played_frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl OutputQueue {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::new())),
            played_frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Device sample rate this queue feeds (Hz).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Append samples behind everything already queued.
    pub fn push_slice(&self, samples: &[f32]) {
        self.samples.lock().extend(samples.iter().copied());
    }

    /// Drop everything not yet rendered. Does not reset the output clock —
    /// time keeps advancing while the queue plays silence.
    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    /// Samples currently queued.
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// Current output time in seconds: total frames rendered / sample rate.
    pub fn position_secs(&self) -> f64 {
        self.played_frames.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    /// Advance the output clock. Called by the output callback once per
    /// rendered frame batch (and directly by tests standing in for one).
    pub fn mark_played(&self, frames: u64) {
        self.played_frames.fetch_add(frames, Ordering::Relaxed);
    }

    /// Pop up to `frames` samples into `out`, zero-filling any shortfall.
    /// Returns `false` when the queue lock was contended (silence emitted).
    fn render_into(&self, out: &mut [f32]) -> bool {
        match self.samples.try_lock() {
            Some(mut queue) => {
                for slot in out.iter_mut() {
                    *slot = queue.pop_front().unwrap_or(0.0);
                }
                true
            }
            None => {
                out.fill(0.0);
                false
            }
        }
    }
}

/// Handle to an active speaker stream.
///
/// **Not `Send`** — same thread-affinity rules as capture.
pub struct SpeakerOutput {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
}

impl SpeakerOutput {
    /// Open the system default output device.
    ///
    /// Returns the stream handle plus the [`OutputQueue`] that feeds it,
    /// created at the device's native rate (callers resample into it).
    ///
    /// # Errors
    /// `ParlaError::NoDefaultOutputDevice` when no speaker is available, or
    /// `ParlaError::AudioStream` if cpal fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(running: Arc<AtomicBool>) -> Result<(Self, OutputQueue)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(ParlaError::NoDefaultOutputDevice)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening output device"
        );

        let supported = device
            .default_output_config()
            .map_err(|e| ParlaError::AudioDevice(e.to_string()))?;

        if supported.sample_format() != SampleFormat::F32 {
            return Err(ParlaError::AudioStream(format!(
                "unsupported output sample format: {:?}",
                supported.sample_format()
            )));
        }

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "output config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = OutputQueue::new(sample_rate);
        let callback_queue = queue.clone();
        let callback_running = Arc::clone(&running);
        let ch = channels as usize;
        let mut mono_buf: Vec<f32> = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info| {
                    let frames = data.len() / ch;
                    if !callback_running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    mono_buf.resize(frames, 0.0);
                    callback_queue.render_into(&mut mono_buf);
                    for (f, sample) in mono_buf.iter().enumerate() {
                        data[f * ch..(f + 1) * ch].fill(*sample);
                    }
                    // The device consumed these frames whether they were
                    // audio or silence — the output clock advances either way.
                    callback_queue.mark_played(frames as u64);
                },
                |err| error!("output stream error: {err}"),
                None,
            )
            .map_err(|e| ParlaError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ParlaError::AudioStream(e.to_string()))?;

        Ok((
            Self {
                _stream: stream,
                running,
            },
            queue,
        ))
    }

    /// Stub when the `audio-cpal` feature is disabled.
    #[cfg(not(feature = "audio-cpal"))]
    pub fn open_default(_running: Arc<AtomicBool>) -> Result<(Self, OutputQueue)> {
        Err(crate::error::ParlaError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl OutputStream for SpeakerOutput {
    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_preserves_fifo_order() {
        let queue = OutputQueue::new(24_000);
        queue.push_slice(&[0.1, 0.2]);
        queue.push_slice(&[0.3]);

        let mut out = [0.0f32; 4];
        assert!(queue.render_into(&mut out));
        assert_eq!(out, [0.1, 0.2, 0.3, 0.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_flushes_pending_audio_but_keeps_the_clock() {
        let queue = OutputQueue::new(24_000);
        queue.push_slice(&[0.5; 480]);
        queue.mark_played(12_000);
        queue.clear();

        assert!(queue.is_empty());
        assert!((queue.position_secs() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn position_tracks_played_frames() {
        let queue = OutputQueue::new(48_000);
        assert_eq!(queue.position_secs(), 0.0);
        queue.mark_played(24_000);
        assert!((queue.position_secs() - 0.5).abs() < 1e-9);
    }
}
