//! Lock-free SPSC ring buffer between the mic callback and the pipeline.
//!
//! Uses `ringbuf::HeapRb<f32>` whose `push_slice` is wait-free and
//! allocation-free, safe to call from the real-time audio callback.
//!
//! The ring doubles as the "queue during connect" policy: frames captured
//! while the session transport is still establishing sit here (bounded) and
//! are drained once the pipeline loop starts. When it overflows, the newest
//! samples are dropped at the producer — losing a frame is preferable to
//! blocking the audio thread or buffering unboundedly.

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Type alias for the producer half — held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half — held by the pipeline thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^20 = 1 048 576 f32 samples ≈ 21.8 s at 48 kHz.
/// More than enough to cover transport establishment latency.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_round_trips_samples_in_order() {
        let (mut producer, mut consumer) = create_audio_ring();
        let input: Vec<f32> = (0..512).map(|i| i as f32 * 1e-3).collect();
        assert_eq!(producer.push_slice(&input), input.len());

        let mut out = vec![0f32; 512];
        assert_eq!(consumer.pop_slice(&mut out), input.len());
        assert_eq!(out, input);
    }
}
