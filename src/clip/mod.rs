// src/clip/mod.rs

pub mod playlist;

pub use playlist::{IntroSlot, Playlist};

use std::sync::Arc;

use crate::buffer::PcmBuffer;
use crate::decoder;
use crate::error::TimerResult;

/// Stable identity of a clip inside one `AppInstance`. The UI maps ids to widgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub u64);

/// Width of each default trim handle region on a freshly loaded clip.
pub const DEFAULT_HANDLE_SECS: f64 = 0.4;

/// Smallest distance the two handles keep between each other.
pub const MIN_TRIM_GAP_SECS: f64 = 0.01;

/// A user supplied audio file plus its trim boundaries.
///
/// `trim_end` is an absolute position from clip start, not a length.
pub struct Clip {
    pub id: ClipId,
    /// Key in the `clips` collection, absent until persisted.
    pub store_key: Option<u64>,
    pub name: String,
    pub mime_type: String,
    pub title: String,
    raw: Vec<u8>,
    duration: f64,
    trim_start: f64,
    trim_end: f64,
    decoded: Option<Arc<PcmBuffer>>,
}

impl Clip {
    /// Decodes `raw` at `sample_rate` and applies the default 0.4 s handles.
    pub fn load(
        id: ClipId,
        name: String,
        mime_type: String,
        raw: Vec<u8>,
        sample_rate: u32,
    ) -> TimerResult<Self> {
        let decoded = decoder::decode_at_rate(&raw, hint_for(&mime_type, &name), sample_rate)?;
        let duration = decoded.duration_secs();
        let mut clip = Self {
            id,
            store_key: None,
            title: name.clone(),
            name,
            mime_type,
            raw,
            duration,
            trim_start: 0.0,
            trim_end: duration,
            decoded: Some(Arc::new(decoded)),
        };
        clip.reset_trim();
        log::info!(
            "📎 Clip '{}' ready: {:.2}s, trim {:.2}..{:.2}",
            clip.title,
            clip.duration,
            clip.trim_start,
            clip.trim_end
        );
        Ok(clip)
    }

    /// Rebuilds a clip from persisted fields. Stored trims are clamped to the real duration.
    pub fn restore(
        id: ClipId,
        name: String,
        mime_type: String,
        raw: Vec<u8>,
        title: String,
        trim_start: f64,
        trim_end: f64,
        sample_rate: u32,
    ) -> TimerResult<Self> {
        let mut clip = Self::load(id, name, mime_type, raw, sample_rate)?;
        if !title.is_empty() {
            clip.title = title;
        }
        clip.set_trim(trim_start, trim_end);
        Ok(clip)
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn trim_start(&self) -> f64 {
        self.trim_start
    }

    pub fn trim_end(&self) -> f64 {
        self.trim_end
    }

    pub fn trimmed_duration(&self) -> f64 {
        self.trim_end - self.trim_start
    }

    fn gap(&self) -> f64 {
        MIN_TRIM_GAP_SECS.min(self.duration * 0.5)
    }

    /// Handles at 0.4 s from each end, or the whole clip when it is too short for that.
    pub fn reset_trim(&mut self) {
        if self.duration > 2.0 * DEFAULT_HANDLE_SECS + self.gap() {
            self.trim_start = DEFAULT_HANDLE_SECS;
            self.trim_end = self.duration - DEFAULT_HANDLE_SECS;
        } else {
            self.trim_start = 0.0;
            self.trim_end = self.duration;
        }
    }

    /// Left handle drag. Clamps rather than crossing the right handle.
    pub fn set_trim_start(&mut self, secs: f64) {
        let max = (self.trim_end - self.gap()).max(0.0);
        self.trim_start = if secs.is_finite() { secs.clamp(0.0, max) } else { 0.0 };
    }

    /// Right handle drag. Clamps rather than crossing the left handle.
    pub fn set_trim_end(&mut self, secs: f64) {
        let min = (self.trim_start + self.gap()).min(self.duration);
        self.trim_end = if secs.is_finite() {
            secs.clamp(min, self.duration)
        } else {
            self.duration
        };
    }

    pub fn set_trim(&mut self, start: f64, end: f64) {
        let start = if start.is_finite() { start } else { 0.0 };
        self.trim_start = start.clamp(0.0, (self.duration - self.gap()).max(0.0));
        self.trim_end = self.trim_start + self.gap();
        self.set_trim_end(end);
    }

    /// Replaces the audio payload and drops the decode cache. Trims are reset.
    pub fn replace_bytes(
        &mut self,
        name: String,
        mime_type: String,
        raw: Vec<u8>,
        sample_rate: u32,
    ) -> TimerResult<()> {
        let fresh = Self::load(self.id, name, mime_type, raw, sample_rate)?;
        let store_key = self.store_key;
        let title = std::mem::take(&mut self.title);
        *self = fresh;
        self.store_key = store_key;
        if !title.is_empty() {
            self.title = title;
        }
        Ok(())
    }

    /// Decoded audio at `sample_rate`, served from the cache when the rate matches.
    pub fn decoded(&mut self, sample_rate: u32) -> TimerResult<Arc<PcmBuffer>> {
        if let Some(buf) = &self.decoded {
            if buf.sample_rate == sample_rate {
                return Ok(buf.clone());
            }
        }
        let buf = Arc::new(decoder::decode_at_rate(
            &self.raw,
            hint_for(&self.mime_type, &self.name),
            sample_rate,
        )?);
        self.decoded = Some(buf.clone());
        Ok(buf)
    }

    /// `[floor(trim_start * rate), floor(trim_end * rate))`.
    pub fn segment_frames(&self, sample_rate: u32) -> (usize, usize) {
        let l = (self.trim_start * sample_rate as f64).floor() as usize;
        let r = (self.trim_end * sample_rate as f64).floor() as usize;
        (l, r)
    }

    /// The playable part of the clip at `sample_rate`.
    pub fn trimmed_segment(&mut self, sample_rate: u32) -> TimerResult<PcmBuffer> {
        let (l, r) = self.segment_frames(sample_rate);
        let buf = self.decoded(sample_rate)?;
        Ok(buf.slice_frames(l, r))
    }
}

fn hint_for<'a>(mime_type: &'a str, name: &'a str) -> Option<&'a str> {
    if !mime_type.is_empty() {
        return Some(mime_type);
    }
    name.rsplit_once('.').map(|(_, ext)| ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::test_support::wav_bytes;

    fn clip(seconds: f64) -> Clip {
        Clip::load(
            ClipId(1),
            "song.wav".into(),
            "audio/wav".into(),
            wav_bytes(seconds, 8_000, 1, 0.2),
            8_000,
        )
        .unwrap()
    }

    #[test]
    fn fresh_clip_gets_default_handles() {
        let c = clip(10.0);
        assert_eq!(c.title, "song.wav");
        assert!((c.trim_start() - 0.4).abs() < 1e-9);
        assert!((c.trim_end() - 9.6).abs() < 1e-9);
    }

    #[test]
    fn short_clip_keeps_full_range() {
        let c = clip(0.5);
        assert_eq!(c.trim_start(), 0.0);
        assert!((c.trim_end() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn handles_clamp_instead_of_crossing() {
        let mut c = clip(10.0);
        c.set_trim_end(5.0);
        c.set_trim_start(7.0);
        assert!(c.trim_start() < c.trim_end());
        assert!((c.trim_start() - (5.0 - MIN_TRIM_GAP_SECS)).abs() < 1e-9);

        c.set_trim_end(1.0);
        assert!(c.trim_end() > c.trim_start());

        c.set_trim_end(50.0);
        assert!((c.trim_end() - 10.0).abs() < 1e-9);
        c.set_trim_start(-3.0);
        assert_eq!(c.trim_start(), 0.0);
    }

    #[test]
    fn set_trim_orders_inverted_input() {
        let mut c = clip(10.0);
        c.set_trim(8.0, 2.0);
        assert!(c.trim_start() < c.trim_end());
        assert!(c.trim_end() <= c.duration());
    }

    #[test]
    fn trimmed_segment_uses_floor_bounds() {
        let mut c = clip(2.0);
        c.set_trim(0.25, 1.0);
        let seg = c.trimmed_segment(8_000).unwrap();
        assert_eq!(seg.frames(), 8_000 - 2_000);
    }

    #[test]
    fn replacing_bytes_invalidates_cache() {
        let mut c = clip(2.0);
        c.title = "Warmup".into();
        c.store_key = Some(4);
        c.replace_bytes("other.wav".into(), "audio/wav".into(), wav_bytes(3.0, 8_000, 1, 0.1), 8_000)
            .unwrap();
        assert!((c.duration() - 3.0).abs() < 1e-9);
        assert_eq!(c.store_key, Some(4));
        assert_eq!(c.title, "Warmup");
        let buf = c.decoded(8_000).unwrap();
        assert_eq!(buf.frames(), 24_000);
    }
}
