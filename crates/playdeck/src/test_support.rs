//! Helpers for tests: WAV fixtures and headless player configs.

use std::path::{Path, PathBuf};

use crate::config::{NullOutput, OutputTarget, PlaybackConfig, PlayerConfig};
use crate::sink::Capture;

pub(crate) fn write_wav_i16(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for s in samples {
        writer.write_sample(*s).unwrap();
    }
    writer.finalize().unwrap();
}

/// Committed audio file under `testdata/`.
///
/// - `tone_ramp.flac`: 8 kHz mono 16-bit, 1000 frames. Frames 0-511 are `0.25`, 512-767 ramp
///   through `1..=256`, 768-999 are `0.25` again. Mixes constant and verbatim subframes.
/// - `reserved_subframe.flac`: same layout; the second FLAC frame carries a reserved subframe
///   type (valid CRCs), so decoding fails after the first 256 frames.
pub(crate) fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
}

/// Samples `tone_ramp.flac` decodes to.
pub(crate) fn tone_ramp_samples() -> Vec<f32> {
    let mut samples = vec![0.25f32; 512];
    samples.extend((1..=256).map(|v| v as f32 / 32_768.0));
    samples.extend(vec![0.25f32; 232]);
    samples
}

/// Constant-level tone: every sample is `0.25` full scale.
pub(crate) fn write_tone(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
    write_level(path, sample_rate, channels, frames, 8_192);
}

pub(crate) fn write_level(path: &Path, sample_rate: u32, channels: u16, frames: usize, level: i16) {
    let samples = vec![level; frames * channels as usize];
    write_wav_i16(path, sample_rate, channels, &samples);
}

/// Player config rendering to a paced null output.
pub(crate) fn null_config(
    sample_rate: u32,
    channels: u16,
    capture: Option<Capture>,
) -> PlayerConfig {
    let mut null = NullOutput::new(sample_rate, channels);
    null.capture = capture;
    PlayerConfig {
        output: OutputTarget::Null(null),
        playback: PlaybackConfig {
            chunk_frames: 256,
            refill_max_frames: 256,
            buffer_seconds: 0.1,
        },
        initial_gain: 1.0,
    }
}
