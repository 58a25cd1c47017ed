use std::path::PathBuf;

use crate::state::PlaybackState;

/// Errors surfaced by a [`Player`](crate::Player).
///
/// `FileNotFound`, `UnsupportedFormat`, `Locked`, `InvalidState`, `InvalidGain` and `Closed`
/// are returned synchronously by control operations. `Decode`, `Io`, `Device` and `Stopped`
/// only ever arrive through a play [`Completion`](crate::Completion).
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("unsupported format for {}: {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("volume is locked while playing")]
    Locked,

    #[error("operation not valid while {0:?}")]
    InvalidState(PlaybackState),

    #[error("invalid gain: {0}")]
    InvalidGain(f32),

    #[error("output device error: {0}")]
    Device(String),

    #[error("playback stopped")]
    Stopped,

    #[error("player is closed")]
    Closed,
}

impl From<anyhow::Error> for PlayerError {
    fn from(e: anyhow::Error) -> Self {
        PlayerError::Device(format!("{e:#}"))
    }
}

pub type Result<T, E = PlayerError> = std::result::Result<T, E>;
