// src/beeps.rs

use crate::buffer::{frames_for, PcmBuffer};
use crate::config::RunConfiguration;
use crate::decoder::dsp::fade_samples_ms;

pub const STARTER_BEEP_COUNT: usize = 3;
pub const STARTER_SPACING_SECS: f64 = 1.0;
/// Longest intro tail that gets ducked under the starter beeps.
pub const DUCK_WINDOW_SECS: f64 = 3.0;

/// Turns "seconds remaining" marks into run times, ascending.
/// Marks beyond the run length would land before the start and are dropped.
pub fn compute_absolute_beep_times(beep_marks: &[f64], total_duration: f64) -> Vec<f64> {
    let mut times: Vec<f64> = beep_marks
        .iter()
        .filter(|m| m.is_finite())
        .map(|sec_remaining| total_duration - sec_remaining)
        .filter(|t| *t >= 0.0)
        .collect();
    times.sort_by(|a, b| a.total_cmp(b));
    times
}

/// Session times of the three starter beeps.
///
/// With an intro the last beep lands on the intro end; intros shorter than two
/// seconds squeeze the beeps evenly into `[0, intro]`. Without an intro the beeps
/// sit at 0, 1, 2 inside the pre-roll.
pub fn starter_beep_times(intro_duration: Option<f64>) -> Vec<f64> {
    let span = STARTER_SPACING_SECS * (STARTER_BEEP_COUNT - 1) as f64;
    match intro_duration {
        Some(intro) if intro >= span => (0..STARTER_BEEP_COUNT)
            .map(|i| intro - span + i as f64 * STARTER_SPACING_SECS)
            .collect(),
        Some(intro) => {
            let step = intro.max(0.0) / (STARTER_BEEP_COUNT - 1) as f64;
            (0..STARTER_BEEP_COUNT).map(|i| i as f64 * step).collect()
        }
        None => (0..STARTER_BEEP_COUNT)
            .map(|i| i as f64 * STARTER_SPACING_SECS)
            .collect(),
    }
}

/// Timing shared by the live session and the export.
///
/// Session time 0 is when the intro (or pre-roll) starts; the run buffer starts at
/// `lead_in`.
#[derive(Debug, Clone, PartialEq)]
pub struct BeepPlan {
    pub lead_in: f64,
    pub run_duration: f64,
    /// Session times.
    pub starter: Vec<f64>,
    /// Run times (relative to run start), only those inside the run.
    pub timing: Vec<f64>,
    /// Session time where the intro tail starts ducking.
    pub intro_duck_start: Option<f64>,
}

impl BeepPlan {
    pub fn new(config: &RunConfiguration, intro_duration: Option<f64>, pre_roll_secs: f64) -> Self {
        let run_duration = config.total_duration_seconds;
        let timing = compute_absolute_beep_times(&config.beep_marks, run_duration)
            .into_iter()
            .filter(|t| *t <= run_duration)
            .collect();

        let starter_on = config.starter_beep_enabled;
        let starter = if starter_on {
            starter_beep_times(intro_duration)
        } else {
            Vec::new()
        };
        let lead_in = match intro_duration {
            Some(intro) => intro,
            None if starter_on => pre_roll_secs,
            None => 0.0,
        };
        let intro_duck_start = match intro_duration {
            Some(intro) if starter_on => Some(intro - DUCK_WINDOW_SECS.min(intro)),
            _ => None,
        };

        Self {
            lead_in,
            run_duration,
            starter,
            timing,
            intro_duck_start,
        }
    }

    /// Every beep of the session (starter + timing) in session time, ascending.
    pub fn session_beep_times(&self) -> Vec<f64> {
        let mut all: Vec<f64> = self
            .starter
            .iter()
            .copied()
            .chain(self.timing.iter().map(|t| t + self.lead_in))
            .collect();
        all.sort_by(|a, b| a.total_cmp(b));
        all
    }

    /// Delays of the timing beeps still ahead of `run_position`.
    pub fn pending_from(&self, run_position: f64) -> Vec<f64> {
        self.timing
            .iter()
            .map(|t| t - run_position)
            .filter(|delay| *delay > 0.0)
            .collect()
    }

    /// Beep markers as fractions of the run length, for drawing over the run waveform.
    pub fn marker_fractions(&self) -> Vec<f64> {
        if self.run_duration <= 0.0 {
            return Vec::new();
        }
        self.timing.iter().map(|t| t / self.run_duration).collect()
    }
}

/// Default beep: 880 Hz, 150 ms, 5 ms fades, mono.
pub fn synth_beep(sample_rate: u32) -> PcmBuffer {
    let frames = frames_for(0.150, sample_rate);
    let fade = fade_samples_ms(sample_rate, 5).max(1);
    let data = (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let edge = i.min(frames - 1 - i);
            let env = (edge as f32 / fade as f32).min(1.0);
            (2.0 * std::f32::consts::PI * 880.0 * t).sin() * 0.8 * env
        })
        .collect();
    PcmBuffer::from_planar(vec![data], sample_rate)
}
