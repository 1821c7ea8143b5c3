//! Hardware loopback check: mic → engine → echo transport → speaker.
//!
//! Speaks your own voice back (upsampled through the full wire path) and
//! draws an ASCII level meter. Useful for verifying devices and latency
//! without a remote endpoint.
//!
//! ```sh
//! cargo run --bin loopback -- [seconds]
//! ```

use std::io::Write;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use parla_core::audio::CpalAudioHost;
use parla_core::session::echo::EchoConnector;
use parla_core::visual::{bar_width, MeterRenderer, Visualizer, DEFAULT_FPS};
use parla_core::{EngineConfig, LiveSessionEngine, SessionStatus};

const METER_WIDTH: usize = 48;

struct AsciiMeter;

impl MeterRenderer for AsciiMeter {
    fn render(&mut self, level: f32) {
        let filled = bar_width(level, METER_WIDTH);
        let mut line = String::with_capacity(METER_WIDTH + 16);
        line.push_str("\r[");
        for i in 0..METER_WIDTH {
            line.push(if i < filled { '#' } else { ' ' });
        }
        line.push_str(&format!("] {level:.3}"));
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(10);

    let engine = LiveSessionEngine::new(
        EngineConfig::default(),
        Arc::new(EchoConnector::new()),
        Arc::new(CpalAudioHost),
    );

    tracing::info!("starting loopback session for {seconds}s, speak into the microphone");
    engine.start()?;
    assert_eq!(engine.status(), SessionStatus::Connected);

    let meter_running = Arc::new(AtomicBool::new(true));
    let meter = Visualizer::spawn(
        engine.level_probe(),
        AsciiMeter,
        Arc::clone(&meter_running),
        DEFAULT_FPS,
    );

    tokio::time::sleep(Duration::from_secs(seconds)).await;

    meter_running.store(false, Ordering::Relaxed);
    let _ = meter.join();
    eprintln!();

    engine.stop()?;

    let diag = engine.diagnostics_snapshot();
    tracing::info!(
        frames_sent = diag.frames_sent,
        chunks_received = diag.chunks_received,
        chunks_dropped = diag.chunks_dropped,
        "loopback finished"
    );
    Ok(())
}
