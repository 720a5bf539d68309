// src/session/mod.rs

pub mod bundle;
pub mod records;
pub mod store;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::beeps::{synth_beep, BeepPlan};
use crate::buffer::PcmBuffer;
use crate::clip::{Clip, ClipId, IntroSlot, Playlist};
use crate::config::{EngineConfig, RunConfiguration};
use crate::decoder;
use crate::engine::{AudioClock, MicSource, MixingGraph, SharedGraph};
use crate::error::{TimerError, TimerResult};
use crate::export::{encode_wav, export_file_name, render_export};
use crate::playback::{PlaybackController, PlaybackState};
use crate::timeline;

use bundle::SetupBundle;
use records::ClipRecord;
use store::{RecordKey, Store, CLIPS, SETTINGS};

const MAIN_KEY: &str = "main";
const INTRO_KEY: &str = "intro";

/// The three isolated training modes. Each owns its own store namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Hybrid,
    Speed,
    Burnout,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Hybrid, Mode::Speed, Mode::Burnout];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Hybrid => "hybrid",
            Mode::Speed => "speed",
            Mode::Burnout => "burnout",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown mode '{s}'"))
    }
}

/// WAV bytes plus the suggested file name.
pub struct ExportedWav {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Everything one mode owns: playlist, intro, settings, the built run buffer,
/// its store and its live session. Instances share nothing.
pub struct AppInstance {
    mode: Mode,
    config: EngineConfig,
    settings: RunConfiguration,
    playlist: Playlist,
    intro: IntroSlot,
    run_buffer: Option<Arc<PcmBuffer>>,
    beep: Arc<PcmBuffer>,
    store: Box<dyn Store>,
    controller: PlaybackController,
    storage_warning: Option<String>,
}

impl AppInstance {
    /// Fresh, empty instance. Nothing is read from `store` until [`AppInstance::load`].
    pub fn new(
        mode: Mode,
        config: EngineConfig,
        store: Box<dyn Store>,
        clock: Arc<dyn AudioClock>,
        mic: Box<dyn MicSource>,
    ) -> Self {
        let beep = Arc::new(synth_beep(config.sample_rate));
        let graph = MixingGraph::new(&config, beep.clone(), mic);
        let controller = PlaybackController::new(&config, graph, clock);
        Self {
            mode,
            config,
            settings: RunConfiguration::default(),
            playlist: Playlist::new(),
            intro: IntroSlot::default(),
            run_buffer: None,
            beep,
            store,
            controller,
            storage_warning: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn settings(&self) -> &RunConfiguration {
        &self.settings
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn intro(&self) -> Option<&Clip> {
        self.intro.get()
    }

    pub fn run_buffer(&self) -> Option<&Arc<PcmBuffer>> {
        self.run_buffer.as_ref()
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PlaybackController {
        &mut self.controller
    }

    pub fn graph_handle(&self) -> SharedGraph {
        self.controller.graph().shared()
    }

    /// Set when a store write failed: in-memory state is still authoritative, but
    /// changes may not survive a restart.
    pub fn storage_warning(&self) -> Option<&str> {
        self.storage_warning.as_deref()
    }

    // ---- persistence (best effort) ----

    fn persisted<T>(&mut self, what: &str, result: TimerResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("⚠️ [{}] could not persist {}: {}", self.mode, what, e);
                self.storage_warning = Some(format!("{what}: {e}"));
                None
            }
        }
    }

    fn save_settings(&mut self) {
        let result = serde_json::to_value(&self.settings)
            .map_err(|e| TimerError::Storage(e.to_string()))
            .and_then(|v| self.store.put(SETTINGS, Some(MAIN_KEY.into()), v));
        self.persisted("settings", result);
    }

    fn save_intro(&mut self) {
        let result = match self.intro.get() {
            Some(clip) => serde_json::to_value(ClipRecord::from_clip(clip))
                .map_err(|e| TimerError::Storage(e.to_string()))
                .and_then(|v| self.store.put(SETTINGS, Some(INTRO_KEY.into()), v))
                .map(|_| ()),
            None => self.store.delete(SETTINGS, &INTRO_KEY.into()),
        };
        self.persisted("intro", result);
    }

    fn save_clip(&mut self, id: ClipId) {
        let Some(clip) = self.playlist.get(id) else {
            return;
        };
        let key = clip.store_key.map(RecordKey::Int);
        let result = serde_json::to_value(ClipRecord::from_clip(clip))
            .map_err(|e| TimerError::Storage(e.to_string()))
            .and_then(|v| self.store.put(CLIPS, key, v));
        if let Some(RecordKey::Int(k)) = self.persisted("song", result) {
            if let Some(clip) = self.playlist.get_mut(id) {
                clip.store_key = Some(k);
            }
        }
    }

    /// Rewrites `clips` in playlist order in one batch, so key order stays playlist order.
    fn save_playlist(&mut self) {
        let ids = self.playlist.ids();
        let records: TimerResult<Vec<serde_json::Value>> = self
            .playlist
            .iter()
            .map(|clip| {
                serde_json::to_value(ClipRecord::from_clip(clip))
                    .map_err(|e| TimerError::Storage(e.to_string()))
            })
            .collect();
        let result = records.and_then(|records| self.store.replace_all(CLIPS, records));
        let Some(keys) = self.persisted("playlist", result) else {
            return;
        };
        for (id, key) in ids.into_iter().zip(keys) {
            if let (Some(clip), RecordKey::Int(k)) = (self.playlist.get_mut(id), key) {
                clip.store_key = Some(k);
            }
        }
    }

    /// Restores settings, intro and songs from the store. Records that no longer
    /// decode are skipped with a warning.
    pub fn load(&mut self) {
        let sr = self.config.sample_rate;

        let main = self.store.get(SETTINGS, &MAIN_KEY.into());
        if let Some(Some(value)) = self.persisted("settings", main) {
            match serde_json::from_value::<RunConfiguration>(value) {
                Ok(settings) => self.settings = settings,
                Err(e) => log::warn!("[{}] ignoring stored settings: {}", self.mode, e),
            }
        }

        let intro = self.store.get(SETTINGS, &INTRO_KEY.into());
        if let Some(Some(value)) = self.persisted("intro", intro) {
            let id = self.playlist.allocate_id();
            match serde_json::from_value::<ClipRecord>(value)
                .map_err(|e| TimerError::Storage(e.to_string()))
                .and_then(|rec| rec.to_clip(id, sr))
            {
                Ok(clip) => {
                    self.intro.replace(clip);
                }
                Err(e) => log::warn!("[{}] ignoring stored intro: {}", self.mode, e),
            }
        }

        let clips = self.store.get_all(CLIPS);
        for (key, value) in self.persisted("songs", clips).unwrap_or_default() {
            let id = self.playlist.allocate_id();
            let restored = serde_json::from_value::<ClipRecord>(value)
                .map_err(|e| TimerError::Storage(e.to_string()))
                .and_then(|rec| rec.to_clip(id, sr));
            match restored {
                Ok(mut clip) => {
                    if let RecordKey::Int(k) = key {
                        clip.store_key = Some(k);
                    }
                    self.playlist.push(clip);
                }
                Err(e) => log::warn!("[{}] skipping stored song {:?}: {}", self.mode, key, e),
            }
        }

        log::info!(
            "📂 [{}] restored {} song(s){}",
            self.mode,
            self.playlist.len(),
            if self.intro.is_present() { " + intro" } else { "" }
        );
    }

    fn invalidate(&mut self) {
        if self.run_buffer.take().is_some() {
            log::debug!("[{}] run buffer invalidated", self.mode);
        }
    }

    // ---- playlist ----

    pub fn add_song(&mut self, name: String, mime_type: String, raw: Vec<u8>) -> TimerResult<ClipId> {
        let id = self.playlist.allocate_id();
        let clip = Clip::load(id, name, mime_type, raw, self.config.sample_rate)?;
        self.playlist.push(clip);
        self.save_clip(id);
        self.invalidate();
        Ok(id)
    }

    pub fn delete_song(&mut self, id: ClipId) -> bool {
        if self.playlist.remove(id).is_none() {
            return false;
        }
        self.save_playlist();
        self.invalidate();
        true
    }

    pub fn reorder_songs(&mut self, order: &[ClipId]) -> bool {
        if !self.playlist.reorder(order) {
            return false;
        }
        self.save_playlist();
        self.invalidate();
        true
    }

    pub fn move_song(&mut self, id: ClipId, to_index: usize) -> bool {
        if !self.playlist.move_clip(id, to_index) {
            return false;
        }
        self.save_playlist();
        self.invalidate();
        true
    }

    /// Trim-changed notification from the handle widget.
    pub fn set_song_trim(&mut self, id: ClipId, start: f64, end: f64) -> bool {
        let Some(clip) = self.playlist.get_mut(id) else {
            return false;
        };
        clip.set_trim(start, end);
        self.save_clip(id);
        self.invalidate();
        true
    }

    pub fn rename_song(&mut self, id: ClipId, title: String) -> bool {
        let Some(clip) = self.playlist.get_mut(id) else {
            return false;
        };
        clip.title = title;
        self.save_clip(id);
        true
    }

    // ---- intro ----

    /// Installs (or replaces) the intro. A failed decode leaves the old intro in place.
    pub fn set_intro(&mut self, name: String, mime_type: String, raw: Vec<u8>) -> TimerResult<()> {
        let id = self.playlist.allocate_id();
        let clip = Clip::load(id, name, mime_type, raw, self.config.sample_rate)?;
        self.intro.replace(clip);
        self.save_intro();
        Ok(())
    }

    pub fn clear_intro(&mut self) -> bool {
        if self.intro.clear().is_none() {
            return false;
        }
        self.save_intro();
        true
    }

    pub fn set_intro_trim(&mut self, start: f64, end: f64) -> bool {
        let Some(clip) = self.intro.get_mut() else {
            return false;
        };
        clip.set_trim(start, end);
        self.save_intro();
        true
    }

    fn intro_segment(&mut self) -> TimerResult<Option<Arc<PcmBuffer>>> {
        let sr = self.config.sample_rate;
        match self.intro.get_mut() {
            Some(clip) => Ok(Some(Arc::new(clip.trimmed_segment(sr)?))),
            None => Ok(None),
        }
    }

    // ---- settings ----

    /// Applies `edit` to the run settings and persists them. Changing the run
    /// length invalidates the built track.
    pub fn update_settings(&mut self, edit: impl FnOnce(&mut RunConfiguration)) {
        let before = self.settings.total_duration_seconds;
        edit(&mut self.settings);
        if self.settings.total_duration_seconds != before {
            self.invalidate();
        }
        self.save_settings();
    }

    /// Replaces the synthesized beep with decoded audio.
    pub fn set_custom_beep(&mut self, raw: &[u8], hint: Option<&str>) -> TimerResult<()> {
        let beep = Arc::new(decoder::decode_at_rate(raw, hint, self.config.sample_rate)?);
        self.controller.graph().set_beep(beep.clone());
        self.beep = beep;
        Ok(())
    }

    pub fn reset_beep(&mut self) {
        self.beep = Arc::new(synth_beep(self.config.sample_rate));
        self.controller.graph().set_beep(self.beep.clone());
    }

    // ---- build / play / export ----

    /// Assembles the run buffer. On failure the previous buffer (if any) stays.
    pub fn build_track(&mut self) -> TimerResult<Arc<PcmBuffer>> {
        let run = Arc::new(timeline::assemble(
            &mut self.playlist,
            self.settings.total_duration_seconds,
            self.config.sample_rate,
        )?);
        self.run_buffer = Some(run.clone());
        log::info!(
            "🧱 [{}] run track built: {:.2}s from {} song(s)",
            self.mode,
            run.duration_secs(),
            self.playlist.len()
        );
        Ok(run)
    }

    fn intro_duration(&self) -> Option<f64> {
        self.intro.get().map(|c| c.trimmed_duration())
    }

    fn plan_for(&self, intro: Option<&PcmBuffer>) -> BeepPlan {
        let intro_duration = intro.map(|b| b.duration_secs()).or_else(|| self.intro_duration());
        BeepPlan::new(&self.settings, intro_duration, self.config.starter_pre_roll_secs)
    }

    /// Beep marker positions over the run waveform, as fractions of the run length.
    pub fn beep_markers(&self) -> Vec<f64> {
        self.plan_for(None).marker_fractions()
    }

    pub fn start_run(&mut self) -> TimerResult<()> {
        let run = self.run_buffer.clone().ok_or(TimerError::NotBuilt)?;
        let intro = self.intro_segment()?;
        let plan = self.plan_for(intro.as_deref());
        self.controller.start(Some(run), intro, plan)
    }

    pub fn pause(&mut self) {
        self.controller.pause();
    }

    pub fn resume(&mut self) {
        self.controller.resume();
    }

    pub fn restart(&mut self) {
        self.controller.restart();
    }

    pub fn stop(&mut self) {
        self.controller.stop();
    }

    pub fn tick(&mut self) {
        self.controller.tick();
    }

    pub fn toggle_coach(&mut self) -> TimerResult<bool> {
        self.controller.toggle_coach()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.controller.state()
    }

    /// Renders the same session the live path plays and encodes it as WAV.
    pub fn export_wav(&mut self) -> TimerResult<ExportedWav> {
        let run = self.run_buffer.clone().ok_or(TimerError::NotBuilt)?;
        let intro = self.intro_segment()?;
        let plan = self.plan_for(intro.as_deref());
        let mixed = render_export(&run, intro.as_deref(), &self.beep, &plan, &self.config);
        let bytes = encode_wav(&mixed)?;
        let file_name = export_file_name(self.mode.as_str(), &chrono::Local::now());
        log::info!("💾 [{}] exported {} ({} bytes)", self.mode, file_name, bytes.len());
        Ok(ExportedWav { file_name, bytes })
    }

    // ---- bundle ----

    pub fn export_bundle(&self) -> TimerResult<String> {
        let bundle = SetupBundle::new(
            self.mode.as_str(),
            chrono::Utc::now().to_rfc3339(),
            self.settings.clone(),
            self.intro.get().map(ClipRecord::from_clip),
            self.playlist.iter().map(ClipRecord::from_clip).collect(),
        );
        bundle.to_json()
    }

    /// Replaces this mode's playlist, intro and settings with the bundle's.
    ///
    /// Everything is parsed and decoded first; the wipe happens only once the
    /// whole bundle is known to be good.
    pub fn import_bundle(&mut self, text: &str) -> TimerResult<()> {
        let bundle = SetupBundle::parse(text)?;
        if bundle.mode != self.mode.as_str() {
            log::warn!(
                "[{}] importing a bundle exported from '{}'",
                self.mode,
                bundle.mode
            );
        }

        let sr = self.config.sample_rate;
        let mut playlist = Playlist::new();
        for rec in &bundle.songs {
            let id = playlist.allocate_id();
            let clip = rec
                .to_clip(id, sr)
                .map_err(|e| TimerError::BundleFormat(format!("song '{}': {}", rec.name, e)))?;
            playlist.push(clip);
        }
        let mut intro = IntroSlot::default();
        if let Some(rec) = &bundle.intro {
            let id = playlist.allocate_id();
            let clip = rec
                .to_clip(id, sr)
                .map_err(|e| TimerError::BundleFormat(format!("intro '{}': {}", rec.name, e)))?;
            intro.replace(clip);
        }

        self.controller.stop();
        self.playlist = playlist;
        self.intro = intro;
        self.settings = bundle.settings;
        self.run_buffer = None;

        let wiped = self
            .store
            .clear(CLIPS)
            .and_then(|_| self.store.clear(SETTINGS));
        if self.persisted("bundle import", wiped).is_some() {
            self.save_settings();
            self.save_intro();
            self.save_playlist();
        }
        log::info!(
            "📥 [{}] imported bundle: {} song(s)",
            self.mode,
            self.playlist.len()
        );
        Ok(())
    }
}

/// Owns one [`AppInstance`] per mode and tracks which one is in front.
pub struct SessionManager {
    instances: Vec<AppInstance>,
    active: Mode,
}

impl SessionManager {
    pub fn new(
        config: &EngineConfig,
        clock: Arc<dyn AudioClock>,
        mut store_for: impl FnMut(Mode) -> Box<dyn Store>,
        mut mic_for: impl FnMut(Mode) -> Box<dyn MicSource>,
    ) -> Self {
        let instances = Mode::ALL
            .into_iter()
            .map(|mode| {
                let mut app = AppInstance::new(
                    mode,
                    config.clone(),
                    store_for(mode),
                    clock.clone(),
                    mic_for(mode),
                );
                app.load();
                app
            })
            .collect();
        Self {
            instances,
            active: Mode::Hybrid,
        }
    }

    fn index(mode: Mode) -> usize {
        Mode::ALL.iter().position(|m| *m == mode).unwrap_or(0)
    }

    pub fn active_mode(&self) -> Mode {
        self.active
    }

    pub fn get(&self, mode: Mode) -> &AppInstance {
        &self.instances[Self::index(mode)]
    }

    pub fn get_mut(&mut self, mode: Mode) -> &mut AppInstance {
        &mut self.instances[Self::index(mode)]
    }

    pub fn active(&self) -> &AppInstance {
        self.get(self.active)
    }

    pub fn active_mut(&mut self) -> &mut AppInstance {
        self.get_mut(self.active)
    }

    /// Brings `mode` to the front; the previous mode's session is stopped.
    pub fn switch_to(&mut self, mode: Mode) {
        if mode == self.active {
            return;
        }
        self.active_mut().stop();
        self.active = mode;
        log::info!("🔀 Switched to {} mode", mode);
    }

    pub fn graphs(&self) -> Vec<SharedGraph> {
        self.instances.iter().map(|a| a.graph_handle()).collect()
    }

    pub fn tick(&mut self) {
        for app in &mut self.instances {
            app.tick();
        }
    }
}
