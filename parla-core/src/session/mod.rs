//! Session transport abstraction.
//!
//! The remote conversational engine is a boundary collaborator: the engine
//! consumes it through the [`SessionConnector`] / [`ConversationSession`]
//! traits and never constructs a concrete client itself. The connector is an
//! injected dependency (constructor parameter) so tests and the demo binary
//! can substitute fakes — no module-global client state.
//!
//! Establishment happens exactly once per session lifecycle: `connect`
//! blocks (it is called on the pipeline's blocking thread, never on an async
//! executor) until the remote side accepts, then hands back the outbound
//! half plus a multiplexed inbound event stream.

pub mod echo;

use crossbeam_channel::Receiver;

use crate::error::Result;
use crate::wire::{self, EncodedAudio};

/// Configuration passed to the connector at establishment time.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote model identifier (versions the otherwise opaque wire protocol).
    pub model: String,
    /// MIME tag declared on outbound microphone audio.
    pub capture_mime: String,
    /// MIME tag expected on inbound model audio.
    pub playback_mime: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "realtime-tutor-001".to_string(),
            capture_mime: wire::CAPTURE_MIME.to_string(),
            playback_mime: wire::PLAYBACK_MIME.to_string(),
        }
    }
}

/// One inbound event from the remote engine.
///
/// Delivered in arrival order on the receiver returned by
/// [`SessionConnector::connect`]. Arrival order is what gives the playback
/// pipeline seamless chunk chaining.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The remote side confirmed the session (first event after connect).
    Opened,
    /// A chunk of synthesized speech.
    ModelAudio(EncodedAudio),
    /// Barge-in: the user started talking, stop all scheduled playback.
    Interrupted,
    /// The remote side ended the session.
    Closed,
    /// Transport failure — fatal to the session, no automatic reconnect.
    Error(String),
}

/// The outbound half of an established session.
pub trait ConversationSession: Send + 'static {
    /// Forward one encoded capture frame, fire-and-forget.
    ///
    /// # Errors
    /// A failed send is reported so the caller can count and drop the frame;
    /// it is not retried.
    fn send_audio(&mut self, payload: EncodedAudio) -> Result<()>;

    /// Explicitly end the session.
    ///
    /// Called on every teardown path (user stop, remote close, error) so the
    /// remote engine sees a clean close instead of a timeout.
    fn close(&mut self);
}

/// Factory for establishing sessions — the injectable seam.
pub trait SessionConnector: Send + Sync + 'static {
    /// Establish a session, blocking until the remote engine accepts.
    ///
    /// On success returns the outbound session handle and the inbound event
    /// stream. Implementations deliver [`SessionEvent::Opened`] as the first
    /// event on the stream.
    ///
    /// # Errors
    /// Establishment failure aborts session startup; the caller transitions
    /// to the error state and releases partially-acquired resources.
    fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn ConversationSession>, Receiver<SessionEvent>)>;
}
