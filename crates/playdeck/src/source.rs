//! Source decoder.
//!
//! A [`Source`] is opened synchronously when a file is appended: the file must exist, its
//! leading bytes must match a known container signature, and Symphonia must be able to build
//! a decoder for its first audio track. Decoding itself happens later, chunk by chunk, on the
//! player's streaming thread.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{PlayerError, Result};

/// Bytes read from the head of a file for signature sniffing.
const SNIFF_LEN: u64 = 16;

/// Container/codec family detected from file content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Wav,
    Aiff,
    Flac,
    Mp3,
    Aac,
    Ogg,
    Mp4,
}

impl SourceFormat {
    /// Identify a format from the first bytes of a file.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        let at =
            |offset: usize, magic: &[u8]| header.get(offset..offset + magic.len()) == Some(magic);

        if at(0, b"RIFF") && at(8, b"WAVE") {
            return Some(SourceFormat::Wav);
        }
        if at(0, b"FORM") && (at(8, b"AIFF") || at(8, b"AIFC")) {
            return Some(SourceFormat::Aiff);
        }
        if at(0, b"fLaC") {
            return Some(SourceFormat::Flac);
        }
        if at(0, b"OggS") {
            return Some(SourceFormat::Ogg);
        }
        if at(4, b"ftyp") {
            return Some(SourceFormat::Mp4);
        }
        if at(0, b"ID3") {
            return Some(SourceFormat::Mp3);
        }

        match header {
            // ADTS: 12-bit sync, layer bits always zero.
            [0xFF, b1, ..] if b1 & 0xF6 == 0xF0 => Some(SourceFormat::Aac),
            // MPEG audio frame: 11-bit sync, layer bits non-zero.
            [0xFF, b1, ..] if b1 & 0xE0 == 0xE0 && b1 & 0x06 != 0 => Some(SourceFormat::Mp3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Wav => "wav",
            SourceFormat::Aiff => "aiff",
            SourceFormat::Flac => "flac",
            SourceFormat::Mp3 => "mp3",
            SourceFormat::Aac => "aac",
            SourceFormat::Ogg => "ogg",
            SourceFormat::Mp4 => "mp4",
        }
    }
}

/// Stream parameters captured while probing a source.
#[derive(Clone, Debug)]
pub struct SourceSpec {
    pub format: SourceFormat,
    pub sample_rate: u32,
    pub channels: usize,
    /// Total duration when the container reports a frame count.
    pub duration_ms: Option<u64>,
    /// Codec label (best-effort).
    pub codec: Option<String>,
}

/// One queued audio file and its decode cursor.
pub struct Source {
    path: PathBuf,
    spec: SourceSpec,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("path", &self.path)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl Source {
    /// Open `path`, sniff its format and prepare a decoder.
    ///
    /// Fails with `FileNotFound` when the path does not exist and `UnsupportedFormat` when
    /// the content is not a recognized, decodable audio stream.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PlayerError::FileNotFound { path: path.clone() },
            _ => PlayerError::Io(e),
        })?;
        if file.metadata()?.is_dir() {
            return Err(unsupported(&path, "is a directory"));
        }

        let mut header = Vec::with_capacity(SNIFF_LEN as usize);
        (&mut file).take(SNIFF_LEN).read_to_end(&mut header)?;
        let format_tag = SourceFormat::sniff(&header)
            .ok_or_else(|| unsupported(&path, "unrecognized file signature"))?;
        file.seek(SeekFrom::Start(0))?;

        // No extension hint: the probe works from content only.
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| unsupported(&path, e))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| unsupported(&path, "no audio track"))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .filter(|r| *r > 0)
            .ok_or_else(|| unsupported(&path, "unknown sample rate"))?;
        let channels = codec_params
            .channels
            .map(|c| c.count())
            .filter(|c| *c > 0)
            .ok_or_else(|| unsupported(&path, "unknown channel layout"))?;

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| unsupported(&path, e))?;

        let spec = SourceSpec {
            format: format_tag,
            sample_rate,
            channels,
            duration_ms: duration_ms_from_codec_params(&codec_params),
            codec: codec_name_from_params(&codec_params),
        };
        tracing::debug!(
            path = %path.display(),
            format = format_tag.as_str(),
            codec = spec.codec.as_deref().unwrap_or("unknown"),
            rate_hz = sample_rate,
            channels,
            "source opened"
        );

        Ok(Self {
            path,
            spec,
            format,
            decoder,
            track_id,
            sample_buf: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    /// Decode the next packet into interleaved `f32` samples.
    ///
    /// Returns `Ok(None)` at end of stream. The channel count of the returned samples is
    /// `spec().channels`.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => match map_stream_error(e) {
                    Some(err) => return Err(err),
                    None => return Ok(None),
                },
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => match map_stream_error(e) {
                    Some(err) => return Err(err),
                    None => return Ok(None),
                },
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let needed = frames * spec.channels.count();
            if self.sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
                self.sample_buf = None;
            }
            let buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::<f32>::new(frames as u64, spec));
            buf.copy_interleaved_ref(decoded);
            return Ok(Some(buf.samples().to_vec()));
        }
    }
}

fn unsupported(path: &Path, reason: impl std::fmt::Display) -> PlayerError {
    PlayerError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Classify a mid-stream Symphonia error.
///
/// `None` means a clean end of stream.
fn map_stream_error(e: SymphoniaError) -> Option<PlayerError> {
    match e {
        SymphoniaError::IoError(io) if io.kind() == ErrorKind::UnexpectedEof => None,
        SymphoniaError::IoError(io) => Some(PlayerError::Io(io)),
        SymphoniaError::DecodeError(msg) => Some(PlayerError::Decode(msg.to_string())),
        other => Some(PlayerError::Decode(other.to_string())),
    }
}

/// Best-effort duration in milliseconds from codec metadata.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
