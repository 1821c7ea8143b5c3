//! `LiveSessionEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! idle --start()--------------------► connecting
//! connecting --connect ok-----------► connected
//! connecting/connected --failure----► error      (partial resources released)
//! connected --remote Closed---------► idle
//! any --stop()----------------------► idle
//! ```
//!
//! Restartable from `idle` or `error`; `start()`/`stop()` in the wrong state
//! return an error rather than panicking.
//!
//! ## Threading
//!
//! Audio stream handles are `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). Capture and output are therefore opened *inside* the
//! `spawn_blocking` closure so they never cross a thread boundary; transport
//! establishment — the only long-latency operation — happens on that same
//! thread, after which the duplex loop takes over. A sync oneshot channel
//! propagates open/connect errors back to the `start()` caller.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    audio::AudioHost,
    buffering::create_audio_ring,
    error::{ParlaError, Result},
    ipc::events::{AudioActivityEvent, SessionStatus, SessionStatusEvent},
    meter::LevelProbe,
    playback::PlaybackPipeline,
    session::{SessionConfig, SessionConnector},
};

/// Broadcast channel capacity for status/activity fan-out.
const BROADCAST_CAP: usize = 256;

/// Configuration for `LiveSessionEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Samples per outbound frame at the 16 kHz wire rate. Default: 4096
    /// (256 ms per frame).
    pub frame_samples: usize,
    /// Transport-level configuration handed to the connector.
    pub session: SessionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_samples: 4096,
            session: SessionConfig::default(),
        }
    }
}

/// Handle to one running session's background thread.
///
/// Each session gets its *own* `running` flag, created in `start()` — a
/// stale pipeline from a previous session can never be revived by a later
/// `start()` flipping a shared flag back to `true`.
struct ActiveSession {
    running: Arc<AtomicBool>,
    /// Disconnects when the session thread exits; the thread owns the
    /// sender and drops it on every exit path.
    done_rx: std::sync::mpsc::Receiver<()>,
}

impl ActiveSession {
    fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the pipeline to stop and block until its thread has exited.
    /// When this returns, the transport is closed and both devices are
    /// released.
    fn shutdown(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.done_rx.recv();
    }
}

/// The top-level session handle.
///
/// `Send + Sync` — all fields use interior mutability. Wrap in an `Arc` to
/// share between a UI layer and event-forwarding tasks. The transport
/// connector and the audio host are injected so both can be faked in tests.
pub struct LiveSessionEngine {
    config: EngineConfig,
    connector: Arc<dyn SessionConnector>,
    host: Arc<dyn AudioHost>,
    /// The session currently holding devices, if any.
    session: Mutex<Option<ActiveSession>>,
    /// Canonical status (written under Mutex, read from UI commands).
    status: Arc<Mutex<SessionStatus>>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    activity_tx: broadcast::Sender<AudioActivityEvent>,
    /// Latest capture loudness, consumed by the visualizer.
    level: LevelProbe,
    /// Monotonically increasing activity sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl LiveSessionEngine {
    /// Create an engine. Does not touch any device — call `start()`.
    pub fn new(
        config: EngineConfig,
        connector: Arc<dyn SessionConnector>,
        host: Arc<dyn AudioHost>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            connector,
            host,
            session: Mutex::new(None),
            status: Arc::new(Mutex::new(SessionStatus::Idle)),
            status_tx,
            activity_tx,
            level: LevelProbe::new(),
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        }
    }

    /// Start a live session: acquire microphone and speaker, establish the
    /// transport, then stream duplex audio on a background blocking thread.
    ///
    /// Blocks until the session is confirmed connected (or fails).
    ///
    /// # Errors
    /// - `ParlaError::AlreadyRunning` if a session is active.
    /// - Device errors (`NoDefaultInputDevice`, …) or `Transport` on
    ///   establishment failure; the engine lands in the error state with
    ///   everything acquired so far released.
    pub fn start(&self) -> Result<()> {
        // Held across establishment so a concurrent start()/stop() waits for
        // a consistent outcome rather than racing the slot.
        let mut slot = self.session.lock();
        if let Some(active) = slot.take() {
            if active.is_live() {
                *slot = Some(active);
                return Err(ParlaError::AlreadyRunning);
            }
            // The previous session ended on its own (remote close or
            // transport error); reap its thread before starting fresh.
            active.shutdown();
        }

        self.diagnostics.reset();
        let session_running = Arc::new(AtomicBool::new(true));
        self.set_status(SessionStatus::Connecting, None);

        let (producer, consumer) = create_audio_ring();

        // Clone all shared state before moving into the closure.
        let config = self.config.clone();
        let connector = Arc::clone(&self.connector);
        let host = Arc::clone(&self.host);
        let running = Arc::clone(&session_running);
        let status = Arc::clone(&self.status);
        let status_tx = self.status_tx.clone();
        let activity_tx = self.activity_tx.clone();
        let level = self.level.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        // Sync oneshot: the session thread signals open success/failure.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        tokio::task::spawn_blocking(move || {
            // Dropped on every exit path, unblocking a joining shutdown().
            let _done_tx = done_tx;

            // ── Acquire devices (on THIS thread — streams are !Send) ─────
            let capture = match host.open_capture(producer, Arc::clone(&running)) {
                Ok(c) => c,
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let (output, queue) = match host.open_output(Arc::clone(&running)) {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    // `capture` drops here, releasing the microphone.
                    return;
                }
            };

            let playback = match PlaybackPipeline::new(queue) {
                Ok(p) => p,
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            // ── Establish the transport (the one long-latency wait) ──────
            // Frames captured meanwhile accumulate in the bounded ring.
            let (session, events) = match connector.connect(&config.session) {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            // Connected — publish before unblocking start() so callers
            // observe a consistent state.
            *status.lock() = SessionStatus::Connected;
            let _ = status_tx.send(SessionStatusEvent {
                status: SessionStatus::Connected,
                detail: None,
            });
            let _ = open_tx.send(Ok(()));

            let capture_sample_rate = capture.sample_rate();

            pipeline::run(pipeline::PipelineContext {
                config,
                session,
                events,
                consumer,
                capture_sample_rate,
                playback,
                running,
                status,
                status_tx,
                activity_tx,
                level,
                seq,
                diagnostics,
            });

            capture.stop();
            output.stop();
            // Streams drop here, releasing both devices on this thread.
        });

        // Block until the session thread confirms establishment.
        match open_rx.recv() {
            Ok(Ok(())) => {
                *slot = Some(ActiveSession {
                    running: session_running,
                    done_rx,
                });
                info!("live session connected");
                Ok(())
            }
            Ok(Err(e)) => {
                // The session thread exited right after reporting; reap it.
                let _ = done_rx.recv();
                self.set_status(SessionStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent.
                let _ = done_rx.recv();
                self.set_status(SessionStatus::Error, Some("session failed to start".into()));
                Err(ParlaError::Other(anyhow::anyhow!(
                    "session task died unexpectedly"
                )))
            }
        }
    }

    /// Stop the live session: capture ceases, queued playback halts, the
    /// transport is closed explicitly by the session thread.
    ///
    /// Blocks until the session thread has exited, so the devices are free
    /// and the engine is restartable the moment this returns.
    ///
    /// Also acknowledges a failed session, resetting `error` back to `idle`.
    ///
    /// # Errors
    /// - `ParlaError::NotRunning` if there is nothing to stop.
    pub fn stop(&self) -> Result<()> {
        let mut slot = self.session.lock();
        match slot.take() {
            Some(active) => {
                active.shutdown();
                self.set_status(SessionStatus::Idle, None);
                info!("session stopped");
                Ok(())
            }
            None => {
                if self.status() == SessionStatus::Error {
                    self.set_status(SessionStatus::Idle, None);
                    return Ok(());
                }
                Err(ParlaError::NotRunning)
            }
        }
    }

    /// Current session status (snapshot).
    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    /// Subscribe to status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to per-frame loudness events.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<AudioActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Handle to the latest-loudness cell, for driving a visualizer.
    pub fn level_probe(&self) -> LevelProbe {
        self.level.clone()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn set_status(&self, new_status: SessionStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(SessionStatusEvent {
            status: new_status,
            detail,
        });
    }
}
