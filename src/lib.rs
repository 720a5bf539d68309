// src/lib.rs

pub mod beeps;
pub mod buffer;
pub mod clip;
pub mod config;
pub mod decoder;
pub mod effects;
pub mod engine;
pub mod error;
pub mod export;
pub mod playback;
pub mod session;
pub mod timeline;

pub use buffer::PcmBuffer;
pub use clip::{Clip, ClipId};
pub use config::{EngineConfig, MicRouting, RunConfiguration};
pub use error::{TimerError, TimerResult};
pub use playback::{PlaybackController, PlaybackState};
pub use session::{AppInstance, Mode, SessionManager};
