/// Playback tuning parameters shared by decode/resample/output stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Resampler input chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Target buffer duration for the sink queue.
    pub buffer_seconds: f32,
}

impl Default for PlaybackConfig {
    /// Defaults tuned for low-risk playback across common devices.
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
        }
    }
}

/// Where a player renders its audio.
#[derive(Clone, Debug)]
pub enum OutputTarget {
    /// A CPAL output device. `needle` selects the first device whose name contains it
    /// (case-insensitive); `None` uses the host default.
    Device { needle: Option<String> },
    /// A paced virtual output with no device behind it.
    Null(NullOutput),
}

impl Default for OutputTarget {
    fn default() -> Self {
        OutputTarget::Device { needle: None }
    }
}

/// Settings for the virtual output.
#[derive(Clone, Debug)]
pub struct NullOutput {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames rendered per tick. The tick period is derived from the sample rate.
    pub period_frames: usize,
    /// When set, every rendered sample (silence included) is appended here.
    pub capture: Option<crate::sink::Capture>,
}

impl NullOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            period_frames: (sample_rate as usize / 100).max(1),
            capture: None,
        }
    }

    pub fn with_capture(mut self, capture: crate::sink::Capture) -> Self {
        self.capture = Some(capture);
        self
    }
}

/// Per-player configuration.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    pub output: OutputTarget,
    pub playback: PlaybackConfig,
    /// Gain the player starts with, clamped to `[0.0, 1.0]`.
    pub initial_gain: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            output: OutputTarget::default(),
            playback: PlaybackConfig::default(),
            initial_gain: 1.0,
        }
    }
}
