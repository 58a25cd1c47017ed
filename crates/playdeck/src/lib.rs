//! Playdeck: per-player audio playback.
//!
//! A [`Player`] queues audio files, decodes them with Symphonia, converts them to the output's
//! rate and channel layout and streams them to a CPAL device from its own thread. Players are
//! fully independent; any number can play at once.

pub mod buffer;
pub mod completion;
pub mod config;
pub mod device;
pub mod error;
pub mod player;
pub mod queue;
pub mod resample;
pub mod sink;
pub mod source;
pub mod state;
pub mod status;
pub mod volume;
mod worker;

#[cfg(test)]
mod test_support;

pub use completion::Completion;
pub use config::{NullOutput, OutputTarget, PlaybackConfig, PlayerConfig};
pub use error::{PlayerError, Result};
pub use player::Player;
pub use sink::Capture;
pub use source::{SourceFormat, SourceSpec};
pub use state::PlaybackState;
pub use status::{PlayerStatus, SinkInfo};
