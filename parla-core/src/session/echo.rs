//! `EchoConnector` — in-process fake remote engine.
//!
//! Plays the role of the conversational service during development and in
//! tests: every capture frame it receives is resampled to the playback rate
//! and handed straight back as model audio. Exercises the full duplex path
//! (encode → send → receive → decode → schedule) without any network.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::error::Result;
use crate::session::{ConversationSession, SessionConfig, SessionConnector, SessionEvent};
use crate::wire::{self, EncodedAudio};

/// Connector that loops outbound audio back as inbound model speech.
#[derive(Debug, Default)]
pub struct EchoConnector {
    /// When `true`, `connect` fails — used to test the error path.
    pub fail_connect: bool,
}

impl EchoConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionConnector for EchoConnector {
    fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn ConversationSession>, Receiver<SessionEvent>)> {
        if self.fail_connect {
            return Err(crate::error::ParlaError::Transport(
                "echo connector configured to refuse".into(),
            ));
        }

        debug!(model = %config.model, "echo session established");
        let (tx, rx) = unbounded();
        let _ = tx.send(SessionEvent::Opened);

        Ok((
            Box::new(EchoSession {
                events: tx,
                playback_mime: config.playback_mime.clone(),
            }),
            rx,
        ))
    }
}

struct EchoSession {
    events: Sender<SessionEvent>,
    playback_mime: String,
}

impl ConversationSession for EchoSession {
    fn send_audio(&mut self, payload: EncodedAudio) -> Result<()> {
        let pcm = wire::decode_payload(&payload)?;
        let upsampled = upsample_capture_to_playback(&wire::i16_to_f32(&pcm));
        let reply = wire::encode_pcm(&wire::f32_to_i16(&upsampled), &self.playback_mime);

        self.events
            .send(SessionEvent::ModelAudio(reply))
            .map_err(|_| crate::error::ParlaError::Transport("echo session closed".into()))
    }

    fn close(&mut self) {
        let _ = self.events.send(SessionEvent::Closed);
    }
}

/// Linear interpolation from the 16 kHz capture rate to 24 kHz playback.
fn upsample_capture_to_playback(input: &[f32]) -> Vec<f32> {
    if input.is_empty() {
        return Vec::new();
    }
    let out_len = input.len() * wire::PLAYBACK_SAMPLE_RATE as usize
        / wire::CAPTURE_SAMPLE_RATE as usize;
    let step = wire::CAPTURE_SAMPLE_RATE as f32 / wire::PLAYBACK_SAMPLE_RATE as f32;

    (0..out_len)
        .map(|i| {
            let pos = i as f32 * step;
            let idx = pos as usize;
            let frac = pos - idx as f32;
            let a = input[idx.min(input.len() - 1)];
            let b = input[(idx + 1).min(input.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_delivers_opened_first() {
        let connector = EchoConnector::new();
        let (_session, rx) = connector.connect(&SessionConfig::default()).unwrap();
        assert!(matches!(rx.recv().unwrap(), SessionEvent::Opened));
    }

    #[test]
    fn echoes_frames_at_the_playback_rate() {
        let connector = EchoConnector::new();
        let (mut session, rx) = connector.connect(&SessionConfig::default()).unwrap();
        let _ = rx.recv().unwrap(); // Opened

        let frame = wire::encode_frame(&vec![1000i16; 1600]);
        session.send_audio(frame).unwrap();

        match rx.recv().unwrap() {
            SessionEvent::ModelAudio(payload) => {
                assert_eq!(payload.mime_type, wire::PLAYBACK_MIME);
                let pcm = wire::decode_payload(&payload).unwrap();
                // 100 ms at 16 kHz echoes back as 100 ms at 24 kHz.
                assert_eq!(pcm.len(), 2400);
            }
            other => panic!("expected model audio, got {other:?}"),
        }
    }

    #[test]
    fn close_emits_closed_event() {
        let connector = EchoConnector::new();
        let (mut session, rx) = connector.connect(&SessionConfig::default()).unwrap();
        let _ = rx.recv().unwrap();
        session.close();
        assert!(matches!(rx.recv().unwrap(), SessionEvent::Closed));
    }

    #[test]
    fn refusing_connector_errors() {
        let connector = EchoConnector { fail_connect: true };
        assert!(connector.connect(&SessionConfig::default()).is_err());
    }
}
