// src/session/records.rs

use serde::{Deserialize, Serialize};

use crate::clip::{Clip, ClipId};
use crate::error::TimerResult;

/// Persisted form of a clip, used by the `clips` collection, `settings/"intro"`
/// and the setup bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRecord {
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub raw_bytes: Vec<u8>,
    pub trim_start: f64,
    pub trim_end: f64,
    #[serde(default)]
    pub title: String,
}

impl ClipRecord {
    pub fn from_clip(clip: &Clip) -> Self {
        Self {
            name: clip.name.clone(),
            mime_type: clip.mime_type.clone(),
            raw_bytes: clip.raw_bytes().to_vec(),
            trim_start: clip.trim_start(),
            trim_end: clip.trim_end(),
            title: clip.title.clone(),
        }
    }

    /// Decodes the payload and reapplies the stored trims.
    pub fn to_clip(&self, id: ClipId, sample_rate: u32) -> TimerResult<Clip> {
        Clip::restore(
            id,
            self.name.clone(),
            self.mime_type.clone(),
            self.raw_bytes.clone(),
            self.title.clone(),
            self.trim_start,
            self.trim_end,
            sample_rate,
        )
    }
}

/// Binary payloads travel as standard base64 strings.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::test_support::wav_bytes;

    #[test]
    fn record_uses_camel_case_and_base64() {
        let rec = ClipRecord {
            name: "a.wav".into(),
            mime_type: "audio/wav".into(),
            raw_bytes: vec![0, 1, 2, 255],
            trim_start: 0.4,
            trim_end: 9.6,
            title: "Warmup".into(),
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["mimeType"], "audio/wav");
        assert_eq!(json["rawBytes"], "AAEC/w==");
        assert_eq!(json["trimEnd"], 9.6);
        let back: ClipRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn bad_base64_is_rejected() {
        let json = r#"{"name":"a","rawBytes":"@@@","trimStart":0,"trimEnd":1}"#;
        assert!(serde_json::from_str::<ClipRecord>(json).is_err());
    }

    #[test]
    fn clip_round_trips_with_trims_and_title() {
        let mut clip = Clip::load(
            ClipId(3),
            "s.wav".into(),
            "audio/wav".into(),
            wav_bytes(4.0, 8_000, 1, 0.1),
            8_000,
        )
        .unwrap();
        clip.title = "Tempo".into();
        clip.set_trim(1.25, 3.5);

        let restored = ClipRecord::from_clip(&clip).to_clip(ClipId(9), 8_000).unwrap();
        assert_eq!(restored.id, ClipId(9));
        assert_eq!(restored.title, "Tempo");
        assert_eq!(restored.trim_start(), 1.25);
        assert_eq!(restored.trim_end(), 3.5);
    }
}
