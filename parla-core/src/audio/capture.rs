//! Microphone capture via cpal.

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::{
    audio::CaptureStream,
    buffering::AudioProducer,
    error::{ParlaError, Result},
};

/// Handle to an active microphone stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct MicCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — cleared to signal the callback to no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    sample_rate: u32,
}

impl MicCapture {
    /// Open the system default microphone and push mono f32 frames into
    /// `producer`.
    ///
    /// Multi-channel input is downmixed by averaging. Each callback hands off
    /// fire-and-forget: a full ring drops samples with a warning rather than
    /// blocking the audio thread.
    ///
    /// # Errors
    /// `ParlaError::NoDefaultInputDevice` when no microphone is available
    /// (covers both absence and denied permission on platforms that hide
    /// denied devices), or `ParlaError::AudioStream` if cpal fails to build
    /// or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(mut producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(ParlaError::NoDefaultInputDevice)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| ParlaError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels as usize;
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let running = Arc::clone(&running);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        let frames = data.len() / ch;
                        let written = if ch == 1 {
                            producer.push_slice(data)
                        } else {
                            mix_buf.resize(frames, 0.0);
                            for (f, out) in mix_buf.iter_mut().enumerate() {
                                let base = f * ch;
                                *out = data[base..base + ch].iter().sum::<f32>() / ch as f32;
                            }
                            producer.push_slice(&mix_buf)
                        };
                        if written < frames {
                            warn!("capture ring full: dropped {} frames", frames - written);
                        }
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I16 => {
                let running = Arc::clone(&running);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        let frames = data.len() / ch;
                        mix_buf.resize(frames, 0.0);
                        for (f, out) in mix_buf.iter_mut().enumerate() {
                            let base = f * ch;
                            *out = data[base..base + ch]
                                .iter()
                                .map(|s| *s as f32 / 32768.0)
                                .sum::<f32>()
                                / ch as f32;
                        }
                        let written = producer.push_slice(&mix_buf);
                        if written < frames {
                            warn!("capture ring full: dropped {} frames", frames - written);
                        }
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(ParlaError::AudioStream(format!(
                    "unsupported capture sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| ParlaError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ParlaError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Stub when the `audio-cpal` feature is disabled.
    #[cfg(not(feature = "audio-cpal"))]
    pub fn open_default(_producer: AudioProducer, _running: Arc<AtomicBool>) -> Result<Self> {
        Err(ParlaError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl CaptureStream for MicCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
