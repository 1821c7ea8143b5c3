//! Blocking duplex loop.
//!
//! ## Per-iteration stages
//!
//! ```text
//! 1. Drain inbound session events (model audio, barge-in, lifecycle)
//! 2. Drain capture ring → Vec<f32> at the device rate
//! 3. Resample to 16 kHz, accumulate fixed-size outbound frames
//! 4. Per frame: RMS → LevelProbe + activity event, PCM16 + base64 → send
//! 5. Prune naturally-completed playback units
//! ```
//!
//! The loop runs in `spawn_blocking`, keeping the async executor free. It is
//! the single logical thread of the session: capture handoff, inbound
//! handling, and the virtual clock all interleave here, so the playback
//! state is single-writer by construction.
//!
//! Sends are fire-and-forget: a failed send drops the frame with a warning
//! and a counter bump — no retry, no backpressure. A malformed inbound chunk
//! is dropped the same way; only transport `Error` events end the session.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, OnceLock,
};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    audio::resample::RateConverter,
    buffering::{AudioConsumer, Consumer},
    engine::EngineConfig,
    ipc::events::{AudioActivityEvent, SessionStatus, SessionStatusEvent},
    meter::{self, LevelProbe},
    playback::PlaybackPipeline,
    session::{ConversationSession, SessionEvent},
    wire,
};

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub samples_in: AtomicUsize,
    pub frames_sent: AtomicUsize,
    pub send_failures: AtomicUsize,
    pub chunks_received: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub interruptions: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.samples_in.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
        self.send_failures.store(0, Ordering::Relaxed);
        self.chunks_received.store(0, Ordering::Relaxed);
        self.chunks_dropped.store(0, Ordering::Relaxed);
        self.interruptions.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            samples_in: self.samples_in.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            interruptions: self.interruptions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub samples_in: usize,
    pub frames_sent: usize,
    pub send_failures: usize,
    pub chunks_received: usize,
    pub chunks_dropped: usize,
    pub interruptions: usize,
}

/// All context the pipeline needs, passed as one owned struct so the
/// per-session mutable state has a single home.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub session: Box<dyn ConversationSession>,
    pub events: Receiver<SessionEvent>,
    pub consumer: AudioConsumer,
    pub capture_sample_rate: u32,
    pub playback: PlaybackPipeline,
    pub running: Arc<AtomicBool>,
    pub status: Arc<Mutex<SessionStatus>>,
    pub status_tx: broadcast::Sender<SessionStatusEvent>,
    pub activity_tx: broadcast::Sender<AudioActivityEvent>,
    pub level: LevelProbe,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Chunk size drained from the capture ring per iteration.
/// 20 ms at 48 kHz = 960 samples — a reasonable stride for most device rates.
const DRAIN_CHUNK: usize = 960;

/// Minimum sleep when nothing arrived (avoids busy-wait burning a core).
const DEFAULT_SLEEP_EMPTY_MS: u64 = 5;

/// Run the blocking duplex loop until `ctx.running` becomes false.
pub fn run(mut ctx: PipelineContext) {
    info!("duplex pipeline started");

    let mut resampler = match RateConverter::new(
        ctx.capture_sample_rate,
        wire::CAPTURE_SAMPLE_RATE,
        DRAIN_CHUNK,
    ) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create capture resampler: {e}");
            set_status(&mut ctx, SessionStatus::Error, Some(e.to_string()));
            ctx.running.store(false, Ordering::SeqCst);
            return;
        }
    };

    // Scratch buffer reused each iteration.
    let mut raw = vec![0f32; DRAIN_CHUNK];
    // Resampled 16 kHz samples accumulating toward a full outbound frame.
    let mut frame_buf: Vec<f32> = Vec::with_capacity(ctx.config.frame_samples);

    loop {
        // ── 0. Check running flag ─────────────────────────────────────────
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        // ── 1. Inbound events first — keeps barge-in latency low ─────────
        let mut inbound_handled = 0usize;
        while let Ok(event) = ctx.events.try_recv() {
            inbound_handled += 1;
            handle_session_event(&mut ctx, event);
            if !ctx.running.load(Ordering::Relaxed) {
                break;
            }
        }

        // ── 2. Drain capture ring ─────────────────────────────────────────
        let drained = ctx.consumer.pop_slice(&mut raw);

        if drained == 0 {
            if inbound_handled == 0 {
                // Nothing on either direction — yield.
                std::thread::sleep(std::time::Duration::from_millis(empty_sleep_ms()));
            }
            ctx.playback.maintain();
            continue;
        }

        ctx.diagnostics
            .samples_in
            .fetch_add(drained, Ordering::Relaxed);

        // ── 3. Resample to the wire rate, frame, and send ────────────────
        frame_buf.extend(resampler.process(&raw[..drained]));

        while frame_buf.len() >= ctx.config.frame_samples {
            let frame: Vec<f32> = frame_buf.drain(..ctx.config.frame_samples).collect();
            forward_frame(&mut ctx, &frame);
        }

        // ── 4. Retire naturally-completed playback units ─────────────────
        ctx.playback.maintain();
    }

    // Explicit close on every teardown path — the remote side sees a clean
    // end of session instead of a timeout.
    ctx.session.close();

    let snap = ctx.diagnostics.snapshot();
    info!(
        samples_in = snap.samples_in,
        frames_sent = snap.frames_sent,
        send_failures = snap.send_failures,
        chunks_received = snap.chunks_received,
        chunks_dropped = snap.chunks_dropped,
        interruptions = snap.interruptions,
        "pipeline stopped — diagnostics"
    );
}

/// Tag one outbound frame with its loudness and send it, fire-and-forget.
fn forward_frame(ctx: &mut PipelineContext, frame: &[f32]) {
    let rms = meter::rms(frame);
    ctx.level.store(rms);

    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    let _ = ctx.activity_tx.send(AudioActivityEvent { seq, rms });

    let payload = wire::encode_frame(&wire::f32_to_i16(frame));
    match ctx.session.send_audio(payload) {
        Ok(()) => {
            ctx.diagnostics.frames_sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            // Best-effort stream: the frame is lost, the session lives on.
            ctx.diagnostics
                .send_failures
                .fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "dropped capture frame, send failed");
        }
    }
}

fn handle_session_event(ctx: &mut PipelineContext, event: SessionEvent) {
    match event {
        SessionEvent::Opened => debug!("session opened"),

        SessionEvent::ModelAudio(payload) => {
            ctx.diagnostics
                .chunks_received
                .fetch_add(1, Ordering::Relaxed);
            match ctx.playback.on_model_audio(&payload) {
                Ok(unit) => {
                    debug!(
                        unit = unit.id,
                        start = unit.start,
                        duration = unit.duration,
                        "model audio scheduled"
                    );
                }
                Err(e) => {
                    // Per-chunk fault: drop it, keep the conversation alive.
                    ctx.diagnostics
                        .chunks_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "dropped malformed model audio chunk");
                }
            }
        }

        SessionEvent::Interrupted => {
            let stopped = ctx.playback.on_interrupted();
            ctx.diagnostics
                .interruptions
                .fetch_add(1, Ordering::Relaxed);
            info!(stopped, "barge-in: scheduled playback flushed");
        }

        SessionEvent::Closed => {
            info!("remote side closed the session");
            set_status(ctx, SessionStatus::Idle, None);
            ctx.running.store(false, Ordering::SeqCst);
        }

        SessionEvent::Error(cause) => {
            warn!(cause = %cause, "session transport error");
            set_status(ctx, SessionStatus::Error, Some(cause));
            ctx.running.store(false, Ordering::SeqCst);
        }
    }
}

fn set_status(ctx: &mut PipelineContext, status: SessionStatus, detail: Option<String>) {
    *ctx.status.lock() = status;
    let _ = ctx.status_tx.send(SessionStatusEvent { status, detail });
}

fn empty_sleep_ms() -> u64 {
    static EMPTY_SLEEP_MS: OnceLock<u64> = OnceLock::new();
    *EMPTY_SLEEP_MS.get_or_init(|| {
        std::env::var("PARLA_PIPELINE_EMPTY_SLEEP_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(1, 20))
            .unwrap_or(DEFAULT_SLEEP_EMPTY_MS)
    })
}
