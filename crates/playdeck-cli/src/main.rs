//! Playdeck CLI: plays local audio files through one or more independent players.
//!
//! ## Commands
//! - `play`: queue files on a single player and play them in order.
//! - `duet`: two players at once; the second is paused after a delay and resumed by the
//!   first player's completion.
//! - `devices`: list input/output devices.

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use playdeck::device::{self, Direction};
use playdeck::{OutputTarget, PlaybackConfig, Player, PlayerConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,playdeck=info")
        }))
        .init();
    let host = cpal::default_host();

    if args.list_devices {
        print_devices(&host, Some(Direction::Output))?;
        return Ok(());
    }
    let Some(cmd) = &args.cmd else {
        anyhow::bail!("no command given; see --help");
    };

    let _ = ctrlc::set_handler(|| {
        std::process::exit(130);
    });

    let config = player_config(&args);
    match cmd {
        cli::Command::Play { paths } => play_files(config, paths)?,
        cli::Command::Duet {
            first,
            second,
            pause_after_ms,
        } => duet(config, first, second, Duration::from_millis(*pause_after_ms))?,
        cli::Command::Devices { direction } => {
            print_devices(&host, direction.map(Into::into))?;
        }
    }

    Ok(())
}

fn player_config(args: &cli::Args) -> PlayerConfig {
    PlayerConfig {
        output: OutputTarget::Device {
            needle: args.device.clone(),
        },
        playback: PlaybackConfig {
            chunk_frames: args.chunk_frames,
            refill_max_frames: args.refill_max_frames,
            buffer_seconds: args.buffer_seconds,
        },
        initial_gain: args.volume,
    }
}

fn play_files(config: PlayerConfig, paths: &[PathBuf]) -> Result<()> {
    let player = Player::with_config(config);
    for path in paths {
        player
            .append(path)
            .with_context(|| format!("append {}", path.display()))?;
    }

    player.play().context("start playback")?.wait().context("playback")?;

    let status = player.status();
    tracing::info!(
        elapsed_ms = status.elapsed().as_millis() as u64,
        underrun_events = status.underrun_events,
        "done"
    );
    Ok(())
}

fn duet(config: PlayerConfig, first: &Path, second: &Path, pause_after: Duration) -> Result<()> {
    let lead = Player::with_config(config.clone());
    let follower = Arc::new(Player::with_config(config));
    lead.append(first)
        .with_context(|| format!("append {}", first.display()))?;
    follower
        .append(second)
        .with_context(|| format!("append {}", second.display()))?;

    let (lead_tx, lead_rx) = crossbeam_channel::bounded(1);
    let resume = follower.clone();
    lead.play_with(move |result| {
        let _ = lead_tx.send(result);
        tracing::info!(player = resume.id(), "first player finished; resuming second");
        resume.resume();
    })
    .context("start first player")?;
    let follower_done = follower.play().context("start second player")?;

    let early = follower_done.wait_timeout(pause_after);
    if early.is_none() {
        follower.pause();
        tracing::info!(player = follower.id(), "second player paused");
        // The first player finished before the pause landed; its resume was a no-op.
        if !lead_rx.is_empty() {
            follower.resume();
        }
    }

    lead_rx
        .recv()
        .context("first player disconnected")?
        .context("first player")?;
    match early {
        Some(result) => result,
        None => follower_done.wait(),
    }
    .context("second player")?;
    Ok(())
}

fn print_devices(host: &cpal::Host, direction: Option<Direction>) -> Result<()> {
    let devices = device::list_device_infos(host, direction).context("list devices")?;
    for (i, d) in devices.iter().enumerate() {
        println!(
            "#{i}: [{}] {}{} ({}-{} Hz, up to {} ch)",
            d.direction.as_str(),
            d.name,
            if d.is_default { " (default)" } else { "" },
            d.min_rate,
            d.max_rate,
            d.max_channels,
        );
        if let Some(f) = &d.default_format {
            println!("    default: {f}");
        }
        for f in &d.formats {
            println!("    {f} ({} bytes/sample)", f.sample_size);
        }
    }
    Ok(())
}
