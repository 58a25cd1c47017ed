use std::path::PathBuf;
use std::time::Duration;

use crate::state::PlaybackState;

/// Parameters of the output a player negotiated on its first play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkInfo {
    pub device: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Point-in-time view of a player.
#[derive(Clone, Debug)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub gain: f32,
    /// Path of the source currently being decoded.
    pub now_playing: Option<PathBuf>,
    /// Sources still waiting, in playback order.
    pub queued: Vec<PathBuf>,
    /// Frames rendered by the sink during the current (or last) play.
    pub played_frames: u64,
    /// Number of times the output ran out of audio mid-stream. Idle silence is not counted.
    pub underrun_events: u64,
    /// `None` until the output has been opened.
    pub sink: Option<SinkInfo>,
}

impl PlayerStatus {
    /// Rendered time for the current (or last) play.
    pub fn elapsed(&self) -> Duration {
        elapsed_from_frames(self.played_frames, self.sink.as_ref().map(|s| s.sample_rate))
    }
}

pub(crate) fn elapsed_from_frames(frames: u64, sample_rate: Option<u32>) -> Duration {
    match sample_rate {
        Some(sr) if sr > 0 => Duration::from_micros(frames.saturating_mul(1_000_000) / sr as u64),
        _ => Duration::ZERO,
    }
}
