//! End-to-end session flow against the echo transport, with no audio devices:
//! frames pushed into a fake microphone come back as model speech and land in
//! the output queue, with loudness events published along the way.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use parla_core::audio::{AudioHost, CaptureStream, OutputQueue, OutputStream};
use parla_core::buffering::{AudioProducer, Producer};
use parla_core::session::echo::EchoConnector;
use parla_core::wire;
use parla_core::{EngineConfig, LiveSessionEngine, SessionStatus};

struct TestCapture {
    running: Arc<AtomicBool>,
}

impl CaptureStream for TestCapture {
    fn sample_rate(&self) -> u32 {
        wire::CAPTURE_SAMPLE_RATE
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

struct TestOutput;

impl OutputStream for TestOutput {
    fn stop(&self) {}
}

/// Deviceless host: the test feeds the capture ring directly and inspects
/// the output queue, which nothing ever drains.
struct TestAudioHost {
    producer_slot: Arc<Mutex<Option<AudioProducer>>>,
    queue_slot: Arc<Mutex<Option<OutputQueue>>>,
}

impl AudioHost for TestAudioHost {
    fn open_capture(
        &self,
        producer: AudioProducer,
        running: Arc<AtomicBool>,
    ) -> parla_core::error::Result<Box<dyn CaptureStream>> {
        *self.producer_slot.lock() = Some(producer);
        Ok(Box::new(TestCapture { running }))
    }

    fn open_output(
        &self,
        _running: Arc<AtomicBool>,
    ) -> parla_core::error::Result<(Box<dyn OutputStream>, OutputQueue)> {
        let queue = OutputQueue::new(wire::PLAYBACK_SAMPLE_RATE);
        *self.queue_slot.lock() = Some(queue.clone());
        Ok((Box::new(TestOutput), queue))
    }
}

fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) {
    let start = Instant::now();
    while !predicate() {
        if start.elapsed() >= timeout {
            panic!("timed out waiting for session condition");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn spoken_audio_echoes_back_into_the_output_queue() {
    let producer_slot = Arc::new(Mutex::new(None));
    let queue_slot = Arc::new(Mutex::new(None));

    let engine = LiveSessionEngine::new(
        EngineConfig::default(),
        Arc::new(EchoConnector::new()),
        Arc::new(TestAudioHost {
            producer_slot: Arc::clone(&producer_slot),
            queue_slot: Arc::clone(&queue_slot),
        }),
    );

    let mut activity_rx = engine.subscribe_activity();

    engine.start().expect("start should succeed");
    assert_eq!(engine.status(), SessionStatus::Connected);

    let mut producer = producer_slot
        .lock()
        .take()
        .expect("host stashed the capture producer");
    let queue = queue_slot
        .lock()
        .take()
        .expect("host stashed the output queue");

    // One full outbound frame of a steady tone-ish level.
    let frame_samples = EngineConfig::default().frame_samples;
    producer.push_slice(&vec![0.3f32; frame_samples]);

    // 16 kHz capture echoes back at 24 kHz: 1.5x the sample count.
    let expected = frame_samples * 3 / 2;
    wait_until(Duration::from_secs(2), || queue.len() == expected);

    let activity = activity_rx.recv().await.expect("activity event");
    assert!(activity.rms > 0.2, "rms was {}", activity.rms);

    let diag = engine.diagnostics_snapshot();
    assert_eq!(diag.frames_sent, 1);
    assert_eq!(diag.chunks_received, 1);

    engine.stop().expect("stop should succeed");
    assert_eq!(engine.status(), SessionStatus::Idle);
}
