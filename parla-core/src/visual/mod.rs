//! Free-running loudness visualizer.
//!
//! Decoupled from audio timing: the loop ticks at a display-ish rate, reads
//! whatever level is current in the [`LevelProbe`], and hands it to a
//! renderer. There is no backpressure with the capture pipeline — missed
//! updates are fine, the latest value always wins.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::meter::LevelProbe;

/// Default tick rate, approximating a display refresh signal.
pub const DEFAULT_FPS: u32 = 60;

/// Something that can draw one meter frame.
pub trait MeterRenderer: Send + 'static {
    fn render(&mut self, level: f32);
}

/// Map a loudness level to a bar size in `[0, max]`.
///
/// Monotonic in `level` and clamped to the canvas bounds, so a hot signal
/// never overflows the meter.
pub fn bar_width(level: f32, max: usize) -> usize {
    let clamped = level.clamp(0.0, 1.0);
    (clamped * max as f32).round() as usize
}

/// The render loop. Runs until the owning view clears `running`.
pub struct Visualizer;

impl Visualizer {
    /// Tick at `fps`, rendering the probe's latest value each time.
    pub fn run(
        probe: LevelProbe,
        mut renderer: impl MeterRenderer,
        running: Arc<AtomicBool>,
        fps: u32,
    ) {
        let tick = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        debug!(fps, "visualizer started");
        while running.load(Ordering::Relaxed) {
            renderer.render(probe.load());
            thread::sleep(tick);
        }
        debug!("visualizer stopped");
    }

    /// Convenience: run on a dedicated thread.
    pub fn spawn(
        probe: LevelProbe,
        renderer: impl MeterRenderer,
        running: Arc<AtomicBool>,
        fps: u32,
    ) -> JoinHandle<()> {
        thread::spawn(move || Self::run(probe, renderer, running, fps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn bar_width_is_monotonic_and_clamped() {
        let max = 40;
        assert_eq!(bar_width(0.0, max), 0);
        assert_eq!(bar_width(-0.5, max), 0);
        assert_eq!(bar_width(1.0, max), max);
        assert_eq!(bar_width(2.5, max), max); // hot signal stays in bounds

        let mut previous = 0;
        for step in 0..=20 {
            let width = bar_width(step as f32 / 20.0, max);
            assert!(width >= previous, "bar shrank as level rose");
            previous = width;
        }
    }

    struct RecordingRenderer {
        frames: Arc<Mutex<Vec<f32>>>,
    }

    impl MeterRenderer for RecordingRenderer {
        fn render(&mut self, level: f32) {
            self.frames.lock().push(level);
        }
    }

    fn wait_for_level(frames: &Arc<Mutex<Vec<f32>>>, level: f32) {
        let start = std::time::Instant::now();
        while !frames.lock().contains(&level) {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "renderer never recorded level {level}"
            );
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn loop_renders_the_latest_level_until_stopped() {
        let probe = LevelProbe::new();
        probe.store(0.4);

        let frames = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let handle = Visualizer::spawn(
            probe.clone(),
            RecordingRenderer {
                frames: Arc::clone(&frames),
            },
            Arc::clone(&running),
            240,
        );

        wait_for_level(&frames, 0.4);
        probe.store(0.9);
        wait_for_level(&frames, 0.9);

        running.store(false, Ordering::Relaxed);
        handle.join().expect("visualizer thread panicked");

        let recorded = frames.lock();
        assert!(recorded.len() >= 2, "expected multiple render ticks");
        assert!(recorded.contains(&0.4));
        assert!(recorded.contains(&0.9));
    }
}
