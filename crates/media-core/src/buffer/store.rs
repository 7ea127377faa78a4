//! Sequence-indexed frame store with reset and overflow detection
//!
//! Frames arrive out of order and at irregular intervals from the network;
//! the playout loop reads them back strictly by sequence number. The store
//! keeps at most one frame per sequence, evicts frames the cursor has left
//! behind, and performs a full reset when the sender wraps its counter,
//! restarts, or goes silent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::seq;
use crate::AudioFrame;

/// Configuration for the frame store
#[derive(Debug, Clone)]
pub struct FrameStoreConfig {
    /// Maximum sequence-number span retained around the cursor. Frames
    /// farther than half this span from the cursor are evicted.
    pub buffer_span: u16,

    /// Numeric sequence distance beyond which a packet behind the cursor is
    /// taken as a counter wraparound or stream restart rather than a late
    /// arrival.
    pub overflow_threshold: u16,
}

impl Default for FrameStoreConfig {
    fn default() -> Self {
        Self {
            buffer_span: 300,
            overflow_threshold: 100,
        }
    }
}

/// Counters exposed by the frame store
#[derive(Debug, Clone, Default)]
pub struct FrameStoreStats {
    /// Frames accepted into the store
    pub frames_inserted: u64,
    /// Frames discarded by overflow/restart detection
    pub frames_discarded: u64,
    /// Frames removed by eviction
    pub frames_evicted: u64,
    /// Full resets performed
    pub resets: u64,
}

struct StoreInner {
    frames: HashMap<u16, Arc<AudioFrame>>,
    expected_seq: u16,
    last_arrival: Option<Instant>,
    initialized: bool,
    reset_required: bool,
    stats: FrameStoreStats,
}

impl StoreInner {
    fn reset(&mut self) {
        self.frames.clear();
        self.expected_seq = 0;
        self.last_arrival = None;
        self.initialized = false;
        self.reset_required = false;
        self.stats.resets += 1;
        debug!("frame store reset");
    }
}

/// Jitter buffer shared between the receive path and the playout loop.
///
/// Mutating operations take the write lock; [`lookup`](Self::lookup) and
/// [`find_next_available`](Self::find_next_available) run under the read lock
/// and may overlap with each other. No lock is ever held across a socket or
/// device call.
pub struct FrameStore {
    config: FrameStoreConfig,
    inner: RwLock<StoreInner>,
}

impl FrameStore {
    /// Create an empty, uninitialized store
    pub fn new(config: FrameStoreConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(StoreInner {
                frames: HashMap::new(),
                expected_seq: 0,
                last_arrival: None,
                initialized: false,
                reset_required: false,
                stats: FrameStoreStats::default(),
            }),
        }
    }

    /// Create a store with the default configuration
    pub fn new_default() -> Self {
        Self::new(FrameStoreConfig::default())
    }

    /// Insert or overwrite the frame at `sequence`.
    ///
    /// The first insertion establishes the cursor baseline. A sequence that
    /// sorts behind the cursor and sits numerically farther away than the
    /// overflow threshold means the sender wrapped its counter or restarted:
    /// the store resets, rebaselines at the incoming sequence, and the
    /// payload itself is discarded.
    pub fn insert(&self, sequence: u16, frame: AudioFrame) {
        let mut inner = self.inner.write();

        if !inner.initialized {
            inner.expected_seq = sequence;
            inner.initialized = true;
            info!(sequence, "initializing frame store");
        } else if seq::seq_before(sequence, inner.expected_seq)
            && seq::numeric_distance(inner.expected_seq, sequence) > self.config.overflow_threshold
        {
            warn!(
                expected = inner.expected_seq,
                sequence, "sequence overflow detected, resetting"
            );
            inner.reset();
            inner.expected_seq = sequence;
            inner.initialized = true;
            inner.stats.frames_discarded += 1;
            return;
        }

        inner.frames.insert(sequence, Arc::new(frame));
        inner.last_arrival = Some(Instant::now());
        inner.stats.frames_inserted += 1;
    }

    /// Get the frame at `sequence` without mutating state
    pub fn lookup(&self, sequence: u16) -> Option<Arc<AudioFrame>> {
        self.inner.read().frames.get(&sequence).cloned()
    }

    /// Remove every frame farther than half the buffer span from `cursor`
    /// (modular distance). Bounds store size under sustained reordering or
    /// loss; the slot at `cursor` itself is always retained.
    pub fn evict(&self, cursor: u16) {
        let half_span = self.config.buffer_span / 2;
        let mut inner = self.inner.write();

        let before = inner.frames.len();
        inner
            .frames
            .retain(|&s, _| seq::modular_distance(s, cursor) <= half_span);
        inner.stats.frames_evicted += (before - inner.frames.len()) as u64;
    }

    /// Reset the store if the stream has gone stale or a reset was requested.
    ///
    /// A stream is stale when no frame has arrived within `stale_timeout` of
    /// `now`. Returns whether a reset occurred.
    pub fn check_and_reset(&self, now: Instant, stale_timeout: Duration) -> bool {
        let mut inner = self.inner.write();

        let stale = inner
            .last_arrival
            .is_some_and(|at| now.duration_since(at) > stale_timeout);

        if stale || inner.reset_required {
            if stale {
                info!("no frames within stale timeout, resetting");
            }
            inner.reset();
            true
        } else {
            false
        }
    }

    /// Scan forward from `from + 1` within `window` sequence numbers for the
    /// first buffered frame. Used to skip past an unrecoverable run of
    /// losses.
    pub fn find_next_available(&self, from: u16, window: u16) -> Option<u16> {
        let inner = self.inner.read();
        (1..=window)
            .map(|offset| from.wrapping_add(offset))
            .find(|s| inner.frames.contains_key(s))
    }

    /// The next sequence number the playout loop intends to consume, or
    /// `None` before the first frame has arrived.
    pub fn cursor(&self) -> Option<u16> {
        let inner = self.inner.read();
        inner.initialized.then_some(inner.expected_seq)
    }

    /// Advance the cursor by one sequence number (mod 2^16)
    pub fn advance_cursor(&self) {
        let mut inner = self.inner.write();
        if inner.initialized {
            inner.expected_seq = inner.expected_seq.wrapping_add(1);
        }
    }

    /// Move the cursor to `sequence`, trading strict ordering for bounded
    /// latency after a run of losses
    pub fn jump_cursor(&self, sequence: u16) {
        let mut inner = self.inner.write();
        if inner.initialized {
            debug!(from = inner.expected_seq, to = sequence, "cursor jump");
            inner.expected_seq = sequence;
        }
    }

    /// Force a full reset on the next [`check_and_reset`](Self::check_and_reset)
    pub fn request_reset(&self) {
        self.inner.write().reset_required = true;
    }

    /// Whether the store has seen its first frame since the last reset
    pub fn is_initialized(&self) -> bool {
        self.inner.read().initialized
    }

    /// Number of frames currently buffered
    pub fn len(&self) -> usize {
        self.inner.read().frames.len()
    }

    /// Whether the store holds no frames
    pub fn is_empty(&self) -> bool {
        self.inner.read().frames.is_empty()
    }

    /// Snapshot of the store counters
    pub fn stats(&self) -> FrameStoreStats {
        self.inner.read().stats.clone()
    }
}
