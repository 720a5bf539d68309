// src/config.rs

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::effects::compressor::CompressorParams;
use crate::error::TimerResult;

/// Where the coach mic lands in the stereo output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MicRouting {
    /// Voice on the right channel only; the left ear keeps the music untouched.
    #[default]
    RightOnly,
    Both,
}

/// Engine tuning shared by every mode instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rate of the run buffer, the live graph and the export.
    pub sample_rate: u32,
    /// Right channel gain while the coach mic is live.
    pub duck_amount: f32,
    pub mic_routing: MicRouting,
    /// Length of the linear gain ramps used for ducking.
    pub duck_ramp_ms: u32,
    /// Gain of the intro tail under the starter beeps.
    pub intro_duck_gain: f32,
    /// Silence before the run when starter beeps play without an intro.
    pub starter_pre_roll_secs: f64,
    /// How far ahead of the clock deferred events are handed to the graph.
    pub schedule_ahead_secs: f64,
    pub mic_compressor: CompressorParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            duck_amount: 0.5,
            mic_routing: MicRouting::RightOnly,
            duck_ramp_ms: 30,
            intro_duck_gain: 0.75,
            starter_pre_roll_secs: 3.0,
            schedule_ahead_secs: 0.05,
            mic_compressor: CompressorParams::voice(),
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config; a missing file yields the defaults.
    pub fn load_from_disk(path: &Path) -> TimerResult<Self> {
        if !path.exists() {
            log::info!("engine config {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader).map_err(std::io::Error::from)?;
        log::info!(
            "engine config loaded: {} Hz, duck {:.2}, mic {:?}",
            config.sample_rate,
            config.duck_amount,
            config.mic_routing
        );
        Ok(config)
    }

    pub fn save_to_disk(&self, path: &Path) -> TimerResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self).map_err(std::io::Error::from)?;
        Ok(())
    }
}

/// Per-mode run settings, persisted as `settings/"main"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfiguration {
    #[serde(rename = "timeLimit")]
    pub total_duration_seconds: f64,
    /// "Seconds remaining" marks. Duplicates are kept and fire together.
    #[serde(rename = "beepTimes")]
    pub beep_marks: Vec<f64>,
    #[serde(rename = "starterBeep")]
    pub starter_beep_enabled: bool,
    pub dark_mode: bool,
}

/// Mark used by the "add beep" control.
pub const NEW_BEEP_MARK_SECS: f64 = 60.0;

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            total_duration_seconds: 240.0,
            beep_marks: vec![180.0, 120.0, 60.0, 30.0, 10.0],
            starter_beep_enabled: false,
            dark_mode: false,
        }
    }
}

impl RunConfiguration {
    /// Non-positive or non-finite values are ignored.
    pub fn set_time_limit_minutes(&mut self, minutes: f64) -> bool {
        if !minutes.is_finite() || minutes <= 0.0 {
            return false;
        }
        self.total_duration_seconds = minutes * 60.0;
        true
    }

    pub fn time_limit_minutes(&self) -> f64 {
        self.total_duration_seconds / 60.0
    }

    pub fn add_beep_mark(&mut self) {
        self.beep_marks.push(NEW_BEEP_MARK_SECS);
    }

    pub fn remove_beep_mark(&mut self, index: usize) -> Option<f64> {
        (index < self.beep_marks.len()).then(|| self.beep_marks.remove(index))
    }

    pub fn set_beep_marks(&mut self, marks: impl IntoIterator<Item = f64>) {
        self.beep_marks = marks.into_iter().filter(|m| m.is_finite()).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_configuration_uses_stored_field_names() {
        let cfg = RunConfiguration::default();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["timeLimit"], 240.0);
        assert_eq!(json["beepTimes"][0], 180.0);
        assert_eq!(json["starterBeep"], false);
        assert_eq!(json["darkMode"], false);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: RunConfiguration = serde_json::from_str(r#"{"timeLimit": 90}"#).unwrap();
        assert_eq!(cfg.total_duration_seconds, 90.0);
        assert_eq!(cfg.beep_marks, RunConfiguration::default().beep_marks);
    }

    #[test]
    fn beep_mark_editing() {
        let mut cfg = RunConfiguration::default();
        cfg.add_beep_mark();
        assert_eq!(cfg.beep_marks.last(), Some(&60.0));
        assert_eq!(cfg.remove_beep_mark(0), Some(180.0));
        assert_eq!(cfg.remove_beep_mark(40), None);
        assert!(!cfg.set_time_limit_minutes(0.0));
        assert!(cfg.set_time_limit_minutes(2.5));
        assert_eq!(cfg.total_duration_seconds, 150.0);
        assert_eq!(cfg.time_limit_minutes(), 2.5);

        cfg.set_beep_marks([45.0, f64::NAN, 5.0]);
        assert_eq!(cfg.beep_marks, vec![45.0, 5.0]);
    }

    #[test]
    fn engine_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let mut cfg = EngineConfig::default();
        cfg.mic_routing = MicRouting::Both;
        cfg.save_to_disk(&path).unwrap();
        let loaded = EngineConfig::load_from_disk(&path).unwrap();
        assert_eq!(loaded.mic_routing, MicRouting::Both);
        assert_eq!(loaded.sample_rate, 44_100);

        let missing = EngineConfig::load_from_disk(&dir.path().join("nope.json")).unwrap();
        assert_eq!(missing.duck_amount, 0.5);
    }
}
