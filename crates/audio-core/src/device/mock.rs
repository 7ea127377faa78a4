//! Deterministic in-memory device used by tests
//!
//! Capture produces a recognizable ramp pattern; playback records every
//! buffer it is handed so tests can assert on the exact playout sequence.

use tokio::sync::mpsc;

use voicelink_media_core::playout::PlayoutSink;
use voicelink_media_core::Sample;

/// Generates capture frames with a deterministic ramp pattern
pub struct MockCapture {
    frame_size: usize,
    next_value: Sample,
}

impl MockCapture {
    /// Create a mock capture source
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            next_value: 0,
        }
    }

    /// Produce the next capture frame
    pub fn next_frame(&mut self) -> Vec<Sample> {
        let value = self.next_value;
        self.next_value = self.next_value.wrapping_add(1);
        vec![value; self.frame_size]
    }

    /// Produce `count` frames into a channel, the same surface the cpal
    /// capture backend exposes
    pub fn stream(mut self, count: usize) -> mpsc::UnboundedReceiver<Vec<Sample>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for _ in 0..count {
            let _ = tx.send(self.next_frame());
        }
        rx
    }
}

/// Records every buffer the playout loop emits
#[derive(Default)]
pub struct MockPlayback {
    /// Buffers in playout order
    pub played: Vec<Vec<Sample>>,
}

impl MockPlayback {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlayoutSink for MockPlayback {
    fn play(&mut self, samples: &[Sample]) -> voicelink_media_core::Result<()> {
        self.played.push(samples.to_vec());
        Ok(())
    }
}
