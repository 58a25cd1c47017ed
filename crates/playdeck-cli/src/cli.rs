use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "playdeck", version, arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit (same as `devices --direction output`)
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Playback callback refill cap (frames). Larger reduces lock churn but can add latency.
    #[arg(long, default_value_t = 4096)]
    pub refill_max_frames: usize,

    /// Output buffer target in seconds
    #[arg(long, default_value_t = 2.0)]
    pub buffer_seconds: f32,

    /// Initial gain in [0.0, 1.0]
    #[arg(long, default_value_t = 1.0)]
    pub volume: f32,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play files in order on a single player
    Play {
        /// Audio files, played in the order given
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Play two files on independent players; the second is paused and resumed when the
    /// first finishes
    Duet {
        first: PathBuf,
        second: PathBuf,

        /// Pause the second player after this many milliseconds
        #[arg(long, default_value_t = 3000)]
        pause_after_ms: u64,
    },

    /// Print audio devices
    Devices {
        /// Restrict the listing to one direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DirectionArg {
    Input,
    Output,
}

impl From<DirectionArg> for playdeck::device::Direction {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Input => playdeck::device::Direction::Input,
            DirectionArg::Output => playdeck::device::Direction::Output,
        }
    }
}
