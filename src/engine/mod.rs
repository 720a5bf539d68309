// src/engine/mod.rs

pub mod clock;
pub mod graph;
pub mod mic;
pub mod output;
pub mod timers;

pub use clock::{AudioClock, ManualClock, SampleClock};
pub use graph::{MixingGraph, SharedGraph};
pub use mic::{CpalMic, MicFeed, MicSource, NoMic};
pub use timers::{TimerHandle, TimerQueue, TimerSet};

/// Clock seconds to the frame index the graph renders at.
#[inline]
pub fn frame_at(seconds: f64, sample_rate: u32) -> u64 {
    (seconds.max(0.0) * sample_rate as f64).round() as u64
}
