//! Inbound model-speech handling: decode, schedule, enqueue.
//!
//! ```text
//! ModelAudio payload → PCM16 @ 24 kHz → PlaybackUnit on the virtual clock
//!                                     → resample to device rate → OutputQueue
//! ```
//!
//! A malformed payload is a per-chunk fault: the caller logs it and drops
//! the chunk without tearing down the session.

pub mod scheduler;

use tracing::debug;

use crate::audio::OutputQueue;
use crate::audio::resample::RateConverter;
use crate::error::Result;
use crate::wire::{self, EncodedAudio};

pub use scheduler::{PlaybackScheduler, PlaybackUnit};

/// Input chunk count per rubato call on the playback path.
const PLAYBACK_RESAMPLE_CHUNK: usize = 480;

/// Decodes inbound chunks and feeds the output queue in arrival order.
pub struct PlaybackPipeline {
    scheduler: PlaybackScheduler,
    converter: RateConverter,
    queue: OutputQueue,
}

impl PlaybackPipeline {
    /// Build the pipeline for a given output queue; inbound audio at the
    /// wire's 24 kHz is converted to the queue's device rate.
    pub fn new(queue: OutputQueue) -> Result<Self> {
        let converter = RateConverter::new(
            wire::PLAYBACK_SAMPLE_RATE,
            queue.sample_rate(),
            PLAYBACK_RESAMPLE_CHUNK,
        )?;
        Ok(Self {
            scheduler: PlaybackScheduler::new(),
            converter,
            queue,
        })
    }

    /// Handle one inbound model-audio payload.
    ///
    /// Decodes to PCM, schedules a [`PlaybackUnit`] at
    /// `max(virtual clock, current output time)`, advances the clock by the
    /// chunk duration, and appends the device-rate samples to the queue.
    ///
    /// # Errors
    /// `ParlaError::Decode` for a malformed payload; nothing is scheduled.
    pub fn on_model_audio(&mut self, payload: &EncodedAudio) -> Result<PlaybackUnit> {
        let pcm = wire::decode_payload(payload)?;
        let samples = wire::i16_to_f32(&pcm);
        let duration = samples.len() as f64 / wire::PLAYBACK_SAMPLE_RATE as f64;

        let now = self.queue.position_secs();
        self.scheduler.prune(now);
        let unit = self.scheduler.schedule(duration, now);

        let out = self.converter.process(&samples);
        self.queue.push_slice(&out);

        debug!(
            unit = unit.id,
            start = unit.start,
            duration = unit.duration,
            queued = self.queue.len(),
            "scheduled model audio"
        );
        Ok(unit)
    }

    /// Barge-in: stop every scheduled unit and reset the virtual clock.
    ///
    /// Returns how many units were stopped.
    pub fn on_interrupted(&mut self) -> usize {
        self.queue.clear();
        self.scheduler.interrupt()
    }

    /// Drop units that finished playing from the active set.
    pub fn maintain(&mut self) {
        let now = self.queue.position_secs();
        self.scheduler.prune(now);
    }

    /// Scheduler state, for observability and tests.
    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }
}
