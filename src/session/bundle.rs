// src/session/bundle.rs

use serde::{Deserialize, Serialize};

use super::records::ClipRecord;
use crate::config::RunConfiguration;
use crate::error::{TimerError, TimerResult};

pub const BUNDLE_KIND: &str = "NSC_SETUP_BUNDLE";
pub const BUNDLE_VERSION: u32 = 1;

/// Portable snapshot of one mode: settings, intro and songs in playlist order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupBundle {
    pub kind: String,
    pub version: u32,
    pub mode: String,
    pub exported_at: String,
    pub settings: RunConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<ClipRecord>,
    pub songs: Vec<ClipRecord>,
}

impl SetupBundle {
    pub fn new(
        mode: &str,
        exported_at: String,
        settings: RunConfiguration,
        intro: Option<ClipRecord>,
        songs: Vec<ClipRecord>,
    ) -> Self {
        Self {
            kind: BUNDLE_KIND.to_string(),
            version: BUNDLE_VERSION,
            mode: mode.to_string(),
            exported_at,
            settings,
            intro,
            songs,
        }
    }

    pub fn to_json(&self) -> TimerResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TimerError::BundleFormat(e.to_string()))
    }

    /// Parses and validates `kind` and `version`. Nothing is applied here.
    pub fn parse(text: &str) -> TimerResult<Self> {
        let bundle: Self =
            serde_json::from_str(text).map_err(|e| TimerError::BundleFormat(e.to_string()))?;
        if bundle.kind != BUNDLE_KIND {
            return Err(TimerError::BundleFormat(format!(
                "unexpected kind '{}'",
                bundle.kind
            )));
        }
        if bundle.version != BUNDLE_VERSION {
            return Err(TimerError::BundleFormat(format!(
                "unsupported version {}",
                bundle.version
            )));
        }
        Ok(bundle)
    }
}
