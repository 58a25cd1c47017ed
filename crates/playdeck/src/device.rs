//! Audio device discovery and output configuration.
//!
//! Thin wrappers around CPAL for:
//! - listing input/output devices and the host defaults
//! - selecting the default output device or one by substring match
//! - negotiating an output stream config against a source sample rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Which side of the host a device belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Lightweight device metadata for listings.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub direction: Direction,
    pub min_rate: u32,
    pub max_rate: u32,
    pub max_channels: u16,
    /// `true` for the host's default device in this direction.
    pub is_default: bool,
    /// Every config range the device advertises, in host order.
    pub formats: Vec<StreamFormat>,
    /// The device's default config; `min_rate == max_rate`.
    pub default_format: Option<StreamFormat>,
}

/// One supported stream config range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub channels: u16,
    pub min_rate: u32,
    pub max_rate: u32,
    pub sample_format: cpal::SampleFormat,
    /// Bytes per sample.
    pub sample_size: usize,
}

impl StreamFormat {
    pub fn from_range(range: &cpal::SupportedStreamConfigRange) -> Self {
        Self {
            channels: range.channels(),
            min_rate: range.min_sample_rate(),
            max_rate: range.max_sample_rate(),
            sample_format: range.sample_format(),
            sample_size: range.sample_format().sample_size(),
        }
    }

    pub fn from_config(config: &cpal::SupportedStreamConfig) -> Self {
        Self {
            channels: config.channels(),
            min_rate: config.sample_rate(),
            max_rate: config.sample_rate(),
            sample_format: config.sample_format(),
            sample_size: config.sample_format().sample_size(),
        }
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ch {}", self.channels, self.sample_format)?;
        if self.min_rate == self.max_rate {
            write!(f, " @ {} Hz", self.min_rate)
        } else {
            write!(f, " @ {}-{} Hz", self.min_rate, self.max_rate)
        }
    }
}

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Name of the host's default output device, if any.
pub fn default_output_device_name(host: &cpal::Host) -> Option<String> {
    host.default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string())
}

/// Name of the host's default input device, if any.
pub fn default_input_device_name(host: &cpal::Host) -> Option<String> {
    host.default_input_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string())
}

/// Choose the output config best suited to a source at `target_rate`.
///
/// Prefers the highest supported rate that is `<= target_rate` (the lowest rate above it
/// otherwise), then float over integer sample formats.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();

    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        if sample_format_rank(range.sample_format()) == UNSUPPORTED_RANK {
            continue;
        }
        let rate =
            pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            below: target_rate.map(|t| rate <= t).unwrap_or(true),
            rate,
            format_rank: sample_format_rank(range.sample_format()),
        };
        if best.as_ref().is_none_or(|(b, _)| candidate.is_better_than(b)) {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Prefer a fixed buffer size if the device advertises a range.
///
/// Returns `None` when the device only supports its default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 4_096;
            Some(cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// List devices for the given direction, or both when `None`.
pub fn list_device_infos(
    host: &cpal::Host,
    direction: Option<Direction>,
) -> Result<Vec<DeviceInfo>> {
    let mut out = Vec::new();
    if direction != Some(Direction::Input) {
        let default = default_output_device_name(host);
        for d in host.output_devices().context("No output devices")? {
            let ranges = d
                .supported_output_configs()
                .map(|r| r.collect::<Vec<_>>())
                .unwrap_or_default();
            let fallback = d.default_output_config().ok();
            let info = describe(
                &d,
                Direction::Output,
                &ranges,
                fallback,
                default.as_deref(),
            );
            out.extend(info);
        }
    }
    if direction != Some(Direction::Output) {
        let default = default_input_device_name(host);
        for d in host.input_devices().context("No input devices")? {
            let ranges = d
                .supported_input_configs()
                .map(|r| r.collect::<Vec<_>>())
                .unwrap_or_default();
            let fallback = d.default_input_config().ok();
            let info = describe(
                &d,
                Direction::Input,
                &ranges,
                fallback,
                default.as_deref(),
            );
            out.extend(info);
        }
    }
    Ok(out)
}

fn describe(
    device: &cpal::Device,
    direction: Direction,
    ranges: &[cpal::SupportedStreamConfigRange],
    fallback: Option<cpal::SupportedStreamConfig>,
    default_name: Option<&str>,
) -> Option<DeviceInfo> {
    let name = device.description().ok()?.name().to_string();

    let Some((min_rate, max_rate, max_channels)) = rate_span(ranges, fallback.as_ref()) else {
        tracing::warn!(
            device = %name,
            direction = direction.as_str(),
            "skipping device with invalid sample rate range"
        );
        return None;
    };

    let id = device
        .id()
        .map(|id| id.to_string())
        .unwrap_or_else(|_| format!("{}:{name}", direction.as_str()));

    Some(DeviceInfo {
        id,
        is_default: default_name == Some(name.as_str()),
        name,
        direction,
        min_rate,
        max_rate,
        max_channels,
        formats: ranges.iter().map(StreamFormat::from_range).collect(),
        default_format: fallback.as_ref().map(StreamFormat::from_config),
    })
}

/// Overall `(min_rate, max_rate, max_channels)` across `ranges`, falling back to the default
/// config when the ranges carry no usable rate.
fn rate_span(
    ranges: &[cpal::SupportedStreamConfigRange],
    fallback: Option<&cpal::SupportedStreamConfig>,
) -> Option<(u32, u32, u16)> {
    let mut min_rate = ranges.iter().map(|r| r.min_sample_rate()).min().unwrap_or(0);
    let mut max_rate = ranges.iter().map(|r| r.max_sample_rate()).max().unwrap_or(0);
    let mut max_channels = ranges.iter().map(|r| r.channels()).max().unwrap_or(0);
    if min_rate == 0 || max_rate < min_rate {
        if let Some(cfg) = fallback {
            min_rate = cfg.sample_rate();
            max_rate = cfg.sample_rate();
            max_channels = max_channels.max(cfg.channels());
        }
    }
    (min_rate > 0 && max_rate >= min_rate).then_some((min_rate, max_rate, max_channels))
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    below: bool,
    rate: u32,
    format_rank: u8,
}

impl Candidate {
    fn is_better_than(&self, best: &Candidate) -> bool {
        if self.below != best.below {
            self.below
        } else if self.rate != best.rate {
            // Below target: closer (higher) wins. Above target: closer (lower) wins.
            if self.below {
                self.rate > best.rate
            } else {
                self.rate < best.rate
            }
        } else {
            self.format_rank < best.format_rank
        }
    }
}

fn pick_rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(target) => target.clamp(min, max.max(min)),
        None => max,
    }
}

const UNSUPPORTED_RANK: u8 = 10;

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => UNSUPPORTED_RANK,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
