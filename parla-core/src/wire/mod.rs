//! Wire format for audio exchanged with the remote conversational engine.
//!
//! Outbound: mono f32 frames at 16 kHz → PCM16 little-endian → base64, tagged
//! `audio/pcm;rate=16000`. Inbound: the reverse at 24 kHz. The remote side's
//! protocol is otherwise opaque; this module owns only the payload encoding.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{ParlaError, Result};

/// Sample rate of outbound (microphone) audio on the wire.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of inbound (model speech) audio on the wire.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// MIME tag declared on every outbound payload.
pub const CAPTURE_MIME: &str = "audio/pcm;rate=16000";

/// MIME tag the remote engine declares on model audio.
pub const PLAYBACK_MIME: &str = "audio/pcm;rate=24000";

/// A transport-safe encoding of raw PCM16 bytes plus its declared format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedAudio {
    /// Format/rate declaration, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
    /// Base64 of little-endian PCM16 bytes.
    pub data: String,
}

/// Convert f32 samples in [-1, 1] to PCM16 by scaling with 32768.
///
/// The cast saturates, so out-of-range input (a clipping microphone) clamps
/// to the i16 range instead of wrapping.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|s| (s * 32768.0) as i16).collect()
}

/// Convert PCM16 back to f32 in [-1, 1).
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|s| *s as f32 / 32768.0).collect()
}

/// Encode PCM16 samples under an explicit MIME tag.
pub fn encode_pcm(samples: &[i16], mime_type: &str) -> EncodedAudio {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    EncodedAudio {
        mime_type: mime_type.to_string(),
        data: BASE64.encode(&bytes),
    }
}

/// Encode one capture frame for the transport.
pub fn encode_frame(samples: &[i16]) -> EncodedAudio {
    encode_pcm(samples, CAPTURE_MIME)
}

/// Decode an inbound payload to PCM16 samples.
///
/// # Errors
/// Returns `ParlaError::Decode` when the base64 is malformed or the byte
/// count is not a whole number of PCM16 samples.
pub fn decode_payload(payload: &EncodedAudio) -> Result<Vec<i16>> {
    let bytes = BASE64
        .decode(&payload.data)
        .map_err(|e| ParlaError::Decode(format!("base64: {e}")))?;

    if bytes.len() % 2 != 0 {
        return Err(ParlaError::Decode(format!(
            "odd byte count {} for {}",
            bytes.len(),
            payload.mime_type
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_bit_for_bit() {
        let samples: Vec<i16> = (0..4096)
            .map(|i| ((i * 37) % 65536) as i32 as i16)
            .chain([i16::MIN, -1, 0, 1, i16::MAX])
            .collect();

        let payload = encode_frame(&samples);
        assert_eq!(payload.mime_type, CAPTURE_MIME);

        let decoded = decode_payload(&payload).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn f32_conversion_saturates_out_of_range_input() {
        let converted = f32_to_i16(&[0.0, 0.5, -0.5, 1.5, -1.5]);
        assert_eq!(converted[0], 0);
        assert_eq!(converted[1], 16384);
        assert_eq!(converted[2], -16384);
        assert_eq!(converted[3], i16::MAX);
        assert_eq!(converted[4], i16::MIN);
    }

    #[test]
    fn i16_to_f32_stays_in_unit_range() {
        let restored = i16_to_f32(&[i16::MIN, 0, i16::MAX]);
        assert!((restored[0] + 1.0).abs() < 1e-6);
        assert_eq!(restored[1], 0.0);
        assert!(restored[2] < 1.0 && restored[2] > 0.999);
    }

    #[test]
    fn decode_rejects_bad_base64() {
        let payload = EncodedAudio {
            mime_type: PLAYBACK_MIME.into(),
            data: "not base64!!".into(),
        };
        assert!(matches!(
            decode_payload(&payload),
            Err(ParlaError::Decode(_))
        ));
    }

    #[test]
    fn decode_rejects_odd_byte_count() {
        let payload = EncodedAudio {
            mime_type: PLAYBACK_MIME.into(),
            data: BASE64.encode([1u8, 2, 3]),
        };
        assert!(matches!(
            decode_payload(&payload),
            Err(ParlaError::Decode(_))
        ));
    }

    #[test]
    fn encoded_audio_serializes_with_camel_case() {
        let payload = encode_frame(&[0, 1]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["mimeType"], CAPTURE_MIME);
        assert!(json["data"].is_string());
    }
}
