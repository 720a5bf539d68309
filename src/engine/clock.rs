// src/engine/clock.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic audio time in seconds. Playback positions are always derived from
/// `now()` and an anchor, never from a counter the controller increments itself.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock driven by the output callback: seconds = rendered frames / sample rate.
#[derive(Clone)]
pub struct SampleClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl SampleClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// First frame of the next block to render.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Called by the output callback once a block has been rendered.
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }
}

impl AudioClock for SampleClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Hand-driven clock for deterministic tests and offline drivers.
#[derive(Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_clock_tracks_rendered_frames() {
        let clock = SampleClock::new(48_000);
        let shared = clock.clone();
        shared.advance(24_000);
        shared.advance(24_000);
        assert_eq!(clock.frames(), 48_000);
        assert_eq!(clock.now(), 1.0);
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);
        clock.advance(1.5);
        clock.advance(0.25);
        assert_eq!(clock.now(), 1.75);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }
}
