//! Host audio capability surface.
//!
//! # Design constraints
//!
//! The cpal callbacks run on OS audio threads at elevated priority. They
//! **must not** allocate, block on a contended lock, or perform I/O. Capture
//! writes into a lock-free SPSC ring; output drains a `parking_lot` queue via
//! `try_lock` and falls back to silence on contention.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). Stream handles are therefore created *and dropped* on the pipeline
//! thread — [`AudioHost`] is called from inside `spawn_blocking` and the
//! returned boxes never cross a thread boundary.
//!
//! The trait seam exists for the same reason the session connector is
//! injected: engine lifecycle tests run against a fake host with no devices.

pub mod capture;
pub mod output;
pub mod resample;

use std::sync::{atomic::AtomicBool, Arc};

use crate::buffering::AudioProducer;
use crate::error::Result;

pub use output::OutputQueue;

/// An open microphone stream. Dropping it releases the device.
pub trait CaptureStream {
    /// Actual capture sample rate reported by the device (Hz).
    fn sample_rate(&self) -> u32;

    /// Signal the capture callback to no-op; further frames cease.
    fn stop(&self);
}

/// An open speaker stream. Dropping it halts any in-flight playback.
pub trait OutputStream {
    /// Signal the output callback to emit silence from now on.
    fn stop(&self);
}

/// Acquisition of the host's microphone and speaker.
///
/// Injected into the engine so the whole lifecycle is testable headless.
/// A permission or availability failure surfaces as an error from the open
/// call and aborts session startup.
pub trait AudioHost: Send + Sync + 'static {
    /// Open the default microphone; mono f32 frames at the device rate are
    /// pushed into `producer` until `running` clears.
    fn open_capture(
        &self,
        producer: AudioProducer,
        running: Arc<AtomicBool>,
    ) -> Result<Box<dyn CaptureStream>>;

    /// Open the default speaker; the returned [`OutputQueue`] feeds it.
    fn open_output(
        &self,
        running: Arc<AtomicBool>,
    ) -> Result<(Box<dyn OutputStream>, OutputQueue)>;
}

/// The real cpal-backed host.
#[cfg(feature = "audio-cpal")]
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalAudioHost;

#[cfg(feature = "audio-cpal")]
impl AudioHost for CpalAudioHost {
    fn open_capture(
        &self,
        producer: AudioProducer,
        running: Arc<AtomicBool>,
    ) -> Result<Box<dyn CaptureStream>> {
        Ok(Box::new(capture::MicCapture::open_default(
            producer, running,
        )?))
    }

    fn open_output(
        &self,
        running: Arc<AtomicBool>,
    ) -> Result<(Box<dyn OutputStream>, OutputQueue)> {
        let (stream, queue) = output::SpeakerOutput::open_default(running)?;
        Ok((Box::new(stream), queue))
    }
}
