//! Events the engine broadcasts to its UI/IPC consumers.
//!
//! | Event | Channel |
//! |-------|---------|
//! | `SessionStatusEvent` | `"parla://status"` |
//! | `AudioActivityEvent` | `"parla://activity"` |

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session status
// ---------------------------------------------------------------------------

/// Lifecycle state of the live session.
///
/// Owned exclusively by the lifecycle controller; transitions only through
/// the events described on [`crate::engine::LiveSessionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No session active; `start()` may be called.
    Idle,
    /// Resources acquired, transport establishment in flight.
    Connecting,
    /// Duplex streaming active.
    Connected,
    /// Session failed — restart required.
    Error,
}

/// Emitted on channel `"parla://status"` when the session state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: SessionStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Audio activity
// ---------------------------------------------------------------------------

/// Emitted on channel `"parla://activity"` once per outbound capture frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the frame in [0.0, ~1.0].
    pub rms: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = SessionStatusEvent {
            status: SessionStatus::Connecting,
            detail: Some("establishing session".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "connecting");
        assert_eq!(json["detail"], "establishing session");

        let round_trip: SessionStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, SessionStatus::Connecting);
        assert_eq!(round_trip.detail.as_deref(), Some("establishing session"));
    }

    #[test]
    fn status_rejects_non_lowercase_values() {
        let err = serde_json::from_str::<SessionStatus>(r#""Connected""#);
        assert!(err.is_err(), "expected invalid casing to fail");
    }

    #[test]
    fn activity_event_serializes_with_camel_case_fields() {
        let event = AudioActivityEvent { seq: 3, rms: 0.18 };

        let json = serde_json::to_value(&event).expect("serialize activity event");
        assert_eq!(json["seq"], 3);
        let rms = json["rms"].as_f64().expect("rms should serialize as number");
        assert!((rms - 0.18).abs() < 1e-5);

        let round_trip: AudioActivityEvent =
            serde_json::from_value(json).expect("deserialize activity event");
        assert_eq!(round_trip.seq, 3);
    }
}
