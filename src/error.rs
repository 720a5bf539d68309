// src/error.rs

use thiserror::Error;

/// Everything the timer core can report back to the caller.
///
/// Each user-visible failure leaves the instance in the state it had before the
/// failed call; `Storage` is the only variant that is logged and swallowed by
/// `AppInstance` instead of being propagated.
#[derive(Error, Debug)]
pub enum TimerError {
    /// Bytes are not a supported container/codec, or contain no audio.
    #[error("Could not decode audio: {0}")]
    Decode(String),

    #[error("Playlist is empty, add at least one song before building")]
    NoClips,

    #[error("Run track has not been built")]
    NotBuilt,

    #[error("Microphone unavailable: {0}")]
    MicUnavailable(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Invalid setup bundle: {0}")]
    BundleFormat(String),

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TimerResult<T> = Result<T, TimerError>;
