//! Loudness metering for the live session.
//!
//! The pipeline computes an RMS level per capture frame and publishes it to
//! a [`LevelProbe`] — a single shared scalar with last-write-wins semantics.
//! The visualizer reads whatever value is current on each render tick; there
//! is deliberately no ordering or delivery guarantee between the two.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

/// Root-mean-square of a sample slice, normalized to [0, ~1+].
///
/// Zero for an all-silence frame, strictly positive for any frame containing
/// a non-zero sample.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Shared most-recent-loudness cell.
///
/// Written only by the capture pipeline, read only by the visualizer. The
/// f32 is stored as its bit pattern in an `AtomicU32`; a missed update is
/// fine — the reader always sees some complete recent value.
#[derive(Debug, Clone, Default)]
pub struct LevelProbe(Arc<AtomicU32>);

impl LevelProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the latest level. Relaxed ordering: last write wins.
    pub fn store(&self, level: f32) {
        self.0.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Read the most recently published level.
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0.0; 4096]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn rms_is_positive_for_any_nonzero_sample() {
        let mut samples = vec![0.0f32; 4096];
        samples[1234] = 0.001;
        assert!(rms(&samples) > 0.0);
    }

    #[test]
    fn rms_of_half_amplitude_square_wave() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert_relative_eq!(rms(&samples), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn probe_returns_the_latest_write() {
        let probe = LevelProbe::new();
        assert_eq!(probe.load(), 0.0);

        let writer = probe.clone();
        writer.store(0.25);
        writer.store(0.75);
        assert_eq!(probe.load(), 0.75);
    }
}
