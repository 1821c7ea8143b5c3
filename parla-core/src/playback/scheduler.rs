//! Virtual-clock scheduling of inbound speech chunks.
//!
//! Chunks arrive asynchronously and vary in size; scheduling each at
//! `max(clock, now)` and advancing the clock by the chunk's duration chains
//! them back-to-back with no gaps and no overlaps. The clock is a logical
//! cursor (seconds on the output timeline), not wall-clock time.
//!
//! Single-writer: only the pipeline thread, from the inbound-event handler,
//! ever touches this state — no locking required.

/// One scheduled chunk on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackUnit {
    /// Identity within the active set.
    pub id: u64,
    /// Scheduled start on the virtual clock (seconds).
    pub start: f64,
    /// Chunk duration at its source rate (seconds).
    pub duration: f64,
}

impl PlaybackUnit {
    /// Completion time on the virtual clock.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Owns the virtual output clock and the active playback set.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    /// Next permissible start time (seconds). Monotonically non-decreasing
    /// except for the reset on interruption or session stop.
    clock: f64,
    next_id: u64,
    active: Vec<PlaybackUnit>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a chunk of `duration` seconds given the current output time.
    ///
    /// `start = max(clock, now)`: a backlog plays seamlessly after the
    /// previous chunk; after an idle gap the chunk starts immediately.
    pub fn schedule(&mut self, duration: f64, now: f64) -> PlaybackUnit {
        let start = self.clock.max(now);
        let unit = PlaybackUnit {
            id: self.next_id,
            start,
            duration,
        };
        self.next_id += 1;
        self.clock = start + duration;
        self.active.push(unit);
        unit
    }

    /// Barge-in: drop every active unit and reset the clock to zero so the
    /// next chunk schedules fresh rather than at a stale future offset.
    ///
    /// Returns how many units were stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();
        self.active.clear();
        self.clock = 0.0;
        stopped
    }

    /// Remove units that completed naturally (ended at or before `now`).
    /// Returns how many were removed.
    pub fn prune(&mut self, now: f64) -> usize {
        let before = self.active.len();
        self.active.retain(|unit| unit.end() > now);
        before - self.active.len()
    }

    /// Next permissible start time (seconds).
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Units currently scheduled or playing.
    pub fn active(&self) -> &[PlaybackUnit] {
        &self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn chunks_chain_back_to_back() {
        let mut scheduler = PlaybackScheduler::new();
        let first = scheduler.schedule(0.5, 0.0);
        let second = scheduler.schedule(0.3, 0.0);

        assert_relative_eq!(first.start, 0.0);
        assert_relative_eq!(second.start, 0.5);
        assert_relative_eq!(second.start, first.start + 0.5);
        assert_relative_eq!(scheduler.clock(), 0.8);
    }

    #[test]
    fn no_sequence_of_chunks_ever_overlaps() {
        let mut scheduler = PlaybackScheduler::new();
        let durations = [0.08, 0.5, 0.013, 1.7, 0.2, 0.0417, 0.96];

        let mut previous: Option<PlaybackUnit> = None;
        for (i, d) in durations.iter().enumerate() {
            // A drifting "now" must never break the chaining invariant.
            let now = i as f64 * 0.05;
            let unit = scheduler.schedule(*d, now);
            if let Some(prev) = previous {
                assert!(
                    unit.start >= prev.end() - 1e-12,
                    "unit {} starts at {} before previous ends at {}",
                    unit.id,
                    unit.start,
                    prev.end()
                );
            }
            previous = Some(unit);
        }
        assert_eq!(scheduler.active().len(), durations.len());
    }

    #[test]
    fn late_chunk_starts_at_current_output_time() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(0.2, 0.0);
        // Output has played past the backlog — next chunk starts "now".
        let unit = scheduler.schedule(0.4, 1.5);
        assert_relative_eq!(unit.start, 1.5);
        assert_relative_eq!(scheduler.clock(), 1.9);
    }

    #[test]
    fn interruption_clears_the_set_and_resets_the_clock() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(0.5, 0.0);
        scheduler.schedule(0.3, 0.0);

        assert_eq!(scheduler.interrupt(), 2);
        assert!(scheduler.active().is_empty());
        assert_relative_eq!(scheduler.clock(), 0.0);

        // Post-interruption chunks schedule relative to zero, not the stale
        // pre-interruption cursor.
        let unit = scheduler.schedule(0.25, 0.0);
        assert_relative_eq!(unit.start, 0.0);
    }

    #[test]
    fn prune_removes_only_completed_units() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(0.5, 0.0); // ends 0.5
        scheduler.schedule(0.3, 0.0); // ends 0.8

        assert_eq!(scheduler.prune(0.6), 1);
        assert_eq!(scheduler.active().len(), 1);
        assert_eq!(scheduler.prune(0.6), 0);
        assert_eq!(scheduler.prune(0.8), 1);
        assert!(scheduler.active().is_empty());
    }
}
