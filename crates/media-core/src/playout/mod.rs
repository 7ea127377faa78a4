//! Fixed-cadence playout
//!
//! The playout scheduler ticks once per frame duration, independent of
//! arrival timing, and always produces exactly one buffer per tick: a
//! buffered frame when one is ready, silence otherwise.

pub mod scheduler;
pub use scheduler::{
    PlayoutConfig, PlayoutScheduler, PlayoutSink, PlayoutState, PlayoutStats, TickOutcome,
};
