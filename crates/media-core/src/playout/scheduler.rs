//! Playout scheduling over the frame store
//!
//! Each tick consults the store once: a buffered frame at the cursor is
//! played and the cursor advances; a miss substitutes silence without ever
//! blocking the tick. After enough consecutive misses the cursor jumps to
//! the next buffered frame, trading strict ordering for bounded latency
//! under loss.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::buffer::FrameStore;
use crate::error::{Error, Result};
use crate::Sample;

/// Configuration for the playout scheduler
#[derive(Debug, Clone)]
pub struct PlayoutConfig {
    /// Tick interval; also the duration of one frame
    pub frame_duration: Duration,

    /// Samples per output buffer, across all channels
    pub samples_per_frame: usize,

    /// Silence duration after which the store is reset
    pub stale_timeout: Duration,

    /// Consecutive misses tolerated before a skip-ahead is attempted
    pub miss_threshold: u32,

    /// How many sequence numbers ahead to search when skipping
    pub search_window: u16,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            frame_duration: Duration::from_millis(20),
            samples_per_frame: 960, // 20ms mono at 48kHz
            stale_timeout: Duration::from_secs(2),
            miss_threshold: 10,
            search_window: 50,
        }
    }
}

/// Playout state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayoutState {
    /// No frame has ever arrived
    Uninitialized,
    /// Consuming buffered frames
    Streaming,
    /// Post-reset, waiting for the stream to come back
    Stalled,
}

/// What a single tick emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A buffered frame was copied out
    Played(u16),
    /// Silence was substituted for a missing or not-yet-arrived frame
    Silence,
    /// Silence was substituted and the cursor jumped past a run of losses
    Skipped { from: u16, to: u16 },
    /// The store reset on this tick; silence was substituted
    Reset,
}

/// Counters exposed by the scheduler
#[derive(Debug, Clone, Default)]
pub struct PlayoutStats {
    /// Ticks that played a buffered frame
    pub frames_played: u64,
    /// Ticks that substituted silence
    pub silence_ticks: u64,
    /// Cursor jumps past runs of losses
    pub skips: u64,
    /// Store resets observed
    pub resets: u64,
}

/// Destination for the buffer produced on every tick.
///
/// Playing must never block; a sink that cannot keep up should drop instead.
pub trait PlayoutSink {
    /// Render one buffer of samples
    fn play(&mut self, samples: &[Sample]) -> Result<()>;
}

/// Channel-backed sink used to feed a playback device task
impl PlayoutSink for mpsc::UnboundedSender<Vec<Sample>> {
    fn play(&mut self, samples: &[Sample]) -> Result<()> {
        self.send(samples.to_vec()).map_err(|_| Error::SinkClosed)
    }
}

/// Fixed-tick consumer of the frame store
pub struct PlayoutScheduler {
    store: Arc<FrameStore>,
    config: PlayoutConfig,
    state: PlayoutState,
    consecutive_misses: u32,
    stats: PlayoutStats,
}

impl PlayoutScheduler {
    /// Create a scheduler reading from `store`
    pub fn new(store: Arc<FrameStore>, config: PlayoutConfig) -> Self {
        Self {
            store,
            config,
            state: PlayoutState::Uninitialized,
            consecutive_misses: 0,
            stats: PlayoutStats::default(),
        }
    }

    /// Current state machine position
    pub fn state(&self) -> PlayoutState {
        self.state
    }

    /// Snapshot of the scheduler counters
    pub fn stats(&self) -> PlayoutStats {
        self.stats.clone()
    }

    /// Sequence number the next tick will consult, if the store is live
    pub fn cursor(&self) -> Option<u16> {
        self.store.cursor()
    }

    /// Perform one playout tick, filling `out` with a frame or silence.
    ///
    /// Never blocks on the store beyond a bounded lock hold and never fails;
    /// every recoverable condition is an internal state transition.
    pub fn tick(&mut self, now: Instant, out: &mut [Sample]) -> TickOutcome {
        if self.store.check_and_reset(now, self.config.stale_timeout) {
            out.fill(0);
            self.consecutive_misses = 0;
            self.state = PlayoutState::Stalled;
            self.stats.silence_ticks += 1;
            self.stats.resets += 1;
            return TickOutcome::Reset;
        }

        let Some(cursor) = self.store.cursor() else {
            // Nothing has arrived yet; no counter logic applies.
            out.fill(0);
            self.stats.silence_ticks += 1;
            return TickOutcome::Silence;
        };

        match self.store.lookup(cursor) {
            Some(frame) => {
                let n = frame.samples.len().min(out.len());
                out[..n].copy_from_slice(&frame.samples[..n]);
                out[n..].fill(0);

                self.store.evict(cursor);
                self.store.advance_cursor();
                self.consecutive_misses = 0;
                self.state = PlayoutState::Streaming;
                self.stats.frames_played += 1;
                TickOutcome::Played(cursor)
            }
            None => {
                out.fill(0);
                self.consecutive_misses += 1;
                self.stats.silence_ticks += 1;
                trace!(cursor, misses = self.consecutive_misses, "missing frame");

                if self.consecutive_misses >= self.config.miss_threshold {
                    if let Some(next) =
                        self.store.find_next_available(cursor, self.config.search_window)
                    {
                        debug!(from = cursor, to = next, "skipping past lost frames");
                        self.store.jump_cursor(next);
                        self.consecutive_misses = 0;
                        self.state = PlayoutState::Streaming;
                        self.stats.skips += 1;
                        return TickOutcome::Skipped {
                            from: cursor,
                            to: next,
                        };
                    }
                }

                TickOutcome::Silence
            }
        }
    }

    /// Drive the tick loop forever, handing one buffer per tick to `sink`.
    ///
    /// Ticks that fall behind are skipped rather than bursted, so the sink
    /// never sees a double emission. Returns when the sink goes away.
    pub async fn run<S: PlayoutSink>(mut self, mut sink: S) -> Result<()> {
        let mut ticker = time::interval(self.config.frame_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut buf = vec![0; self.config.samples_per_frame];
        info!(
            frame_ms = self.config.frame_duration.as_millis() as u64,
            samples = self.config.samples_per_frame,
            "playout loop started"
        );

        loop {
            ticker.tick().await;
            let outcome = self.tick(Instant::now(), &mut buf);
            trace!(?outcome, "tick");

            if let Err(e) = sink.play(&buf) {
                warn!(error = %e, "playout sink closed, stopping");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameStoreConfig;
    use crate::AudioFrame;

    const FRAME_LEN: usize = 4;

    fn frame(value: i16) -> AudioFrame {
        AudioFrame::new(vec![value; FRAME_LEN])
    }

    fn scheduler(store: Arc<FrameStore>, miss_threshold: u32) -> PlayoutScheduler {
        PlayoutScheduler::new(
            store,
            PlayoutConfig {
                samples_per_frame: FRAME_LEN,
                miss_threshold,
                ..Default::default()
            },
        )
    }

    #[test]
    fn silence_before_first_frame() {
        let store = Arc::new(FrameStore::new_default());
        let mut sched = scheduler(store, 10);
        let mut out = [1i16; FRAME_LEN];

        assert_eq!(sched.tick(Instant::now(), &mut out), TickOutcome::Silence);
        assert_eq!(out, [0; FRAME_LEN]);
        assert_eq!(sched.state(), PlayoutState::Uninitialized);
    }

    #[test]
    fn gap_emits_silence_then_later_frame() {
        let store = Arc::new(FrameStore::new_default());
        // Miss threshold of one: a single silent slot, then skip to the next
        // buffered frame.
        let mut sched = scheduler(store.clone(), 1);
        let mut out = [0i16; FRAME_LEN];

        store.insert(5, frame(5));
        store.insert(7, frame(7));

        let now = Instant::now();
        assert_eq!(sched.tick(now, &mut out), TickOutcome::Played(5));
        assert_eq!(out, [5; FRAME_LEN]);

        // Sequence 6 never arrives: its slot is silence, never frame 7 early.
        assert_eq!(
            sched.tick(now, &mut out),
            TickOutcome::Skipped { from: 6, to: 7 }
        );
        assert_eq!(out, [0; FRAME_LEN]);

        assert_eq!(sched.tick(now, &mut out), TickOutcome::Played(7));
        assert_eq!(out, [7; FRAME_LEN]);
    }

    #[test]
    fn skip_ahead_after_sustained_loss() {
        let store = Arc::new(FrameStore::new_default());
        let mut sched = scheduler(store.clone(), 10);
        let mut out = [0i16; FRAME_LEN];
        let now = Instant::now();

        store.insert(20, frame(1));
        store.insert(50, frame(2));
        assert_eq!(sched.tick(now, &mut out), TickOutcome::Played(20));

        // Nine silent ticks while nothing past 21 but 50 is buffered.
        for _ in 0..9 {
            assert_eq!(sched.tick(now, &mut out), TickOutcome::Silence);
        }

        // The tenth consecutive miss crosses the threshold and jumps.
        assert_eq!(
            sched.tick(now, &mut out),
            TickOutcome::Skipped { from: 21, to: 50 }
        );
        assert_eq!(sched.state(), PlayoutState::Streaming);
        assert_eq!(sched.cursor(), Some(50));

        assert_eq!(sched.tick(now, &mut out), TickOutcome::Played(50));
        assert_eq!(out, [2; FRAME_LEN]);
    }

    #[test]
    fn stalls_in_place_when_nothing_is_within_the_window() {
        let store = Arc::new(FrameStore::new_default());
        let mut sched = PlayoutScheduler::new(
            store.clone(),
            PlayoutConfig {
                samples_per_frame: FRAME_LEN,
                miss_threshold: 2,
                search_window: 5,
                ..Default::default()
            },
        );
        let mut out = [0i16; FRAME_LEN];
        let now = Instant::now();

        store.insert(10, frame(1));
        store.insert(100, frame(2)); // far outside the search window
        assert_eq!(sched.tick(now, &mut out), TickOutcome::Played(10));

        for _ in 0..6 {
            assert_eq!(sched.tick(now, &mut out), TickOutcome::Silence);
        }
        assert_eq!(sched.cursor(), Some(11));
    }

    #[test]
    fn stale_stream_resets_and_emits_silence() {
        let store = Arc::new(FrameStore::new_default());
        let mut sched = scheduler(store.clone(), 10);
        let mut out = [9i16; FRAME_LEN];

        store.insert(3, frame(3));
        let now = Instant::now();
        assert_eq!(sched.tick(now, &mut out), TickOutcome::Played(3));

        let later = now + Duration::from_secs(3);
        assert_eq!(sched.tick(later, &mut out), TickOutcome::Reset);
        assert_eq!(out, [0; FRAME_LEN]);
        assert_eq!(sched.state(), PlayoutState::Stalled);
        assert!(!store.is_initialized());

        // The stream coming back re-establishes the baseline.
        store.insert(1000, frame(4));
        assert_eq!(
            sched.tick(Instant::now(), &mut out),
            TickOutcome::Played(1000)
        );
        assert_eq!(sched.state(), PlayoutState::Streaming);
    }

    #[test]
    fn short_frame_is_zero_padded() {
        let store = Arc::new(FrameStore::new_default());
        let mut sched = scheduler(store.clone(), 10);
        let mut out = [9i16; FRAME_LEN];

        store.insert(1, AudioFrame::new(vec![5, 5]));
        sched.tick(Instant::now(), &mut out);
        assert_eq!(out, [5, 5, 0, 0]);
    }

    #[test]
    fn eviction_runs_on_hit() {
        let store = Arc::new(FrameStore::new(FrameStoreConfig {
            buffer_span: 20,
            overflow_threshold: 100,
        }));
        let mut sched = scheduler(store.clone(), 10);
        let mut out = [0i16; FRAME_LEN];

        store.insert(100, frame(1));
        store.insert(130, frame(2)); // more than span/2 ahead of the cursor
        sched.tick(Instant::now(), &mut out);

        assert!(store.lookup(130).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_emits_one_buffer_per_tick() {
        let store = Arc::new(FrameStore::new_default());
        store.insert(1, frame(1));
        store.insert(2, frame(2));

        let sched = scheduler(store, 10);
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Sample>>();
        let handle = tokio::spawn(sched.run(tx));

        // Buffers keep arriving whether or not frames are buffered.
        for expected in [vec![1i16; FRAME_LEN], vec![2; FRAME_LEN], vec![0; FRAME_LEN]] {
            let buf = rx.recv().await.expect("playout loop stopped");
            assert_eq!(buf, expected);
        }

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn loop_stops_when_sink_closes() {
        let store = Arc::new(FrameStore::new_default());
        let sched = scheduler(store, 10);
        let (tx, rx) = mpsc::unbounded_channel::<Vec<Sample>>();
        drop(rx);

        sched.run(tx).await.expect("run should end cleanly");
    }
}
