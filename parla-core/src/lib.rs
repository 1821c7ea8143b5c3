//! # parla-core
//!
//! Duplex audio streaming engine for a live voice-tutor session.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → MicCapture → SPSC RingBuffer → Pipeline(spawn_blocking)
//!                                                  │
//!                                 resample 16 kHz, RMS → LevelProbe
//!                                                  │
//!                                 PCM16 + base64 → ConversationSession
//!                                                  │ (inbound events)
//!                              PlaybackPipeline → OutputQueue → Speaker
//! ```
//!
//! The audio callbacks are lock-light and allocation-free. All heap work
//! happens on the pipeline thread, which also owns the virtual output clock
//! and the active playback set — single-writer, no locking needed.
//!
//! Barge-in: an `Interrupted` session event stops everything scheduled and
//! resets the virtual clock to zero so the next reply starts fresh.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod meter;
pub mod playback;
pub mod session;
pub mod visual;
pub mod wire;

// Convenience re-exports for downstream crates
pub use engine::{EngineConfig, LiveSessionEngine};
pub use error::ParlaError;
pub use ipc::events::{AudioActivityEvent, SessionStatus, SessionStatusEvent};
pub use session::{ConversationSession, SessionConfig, SessionConnector, SessionEvent};

#[cfg(feature = "audio-cpal")]
pub use audio::CpalAudioHost;
