//! Output sink.
//!
//! A sink owns the output stream for one player. Samples reach it through a bounded
//! [`SampleBuffer`] already converted to the sink's rate and channel count; the output
//! callback drains that buffer without blocking, applies gain once per batch and outputs
//! silence while paused without consuming anything (pause keeps the exact position).
//!
//! Two backends render through the same callback logic:
//! - a CPAL device stream
//! - a paced virtual output (optionally capturing what it renders)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use parking_lot::Mutex;

use crate::buffer::{SampleBuffer, calc_max_buffered_samples};
use crate::config::{NullOutput, OutputTarget, PlaybackConfig};
use crate::device;
use crate::volume::VolumeController;

/// Poll interval used while waiting for the sink to render what was written.
const DRAIN_POLL: Duration = Duration::from_millis(5);

/// Controls shared between a player and its output callback.
#[derive(Clone, Debug)]
pub struct SinkControls {
    pub paused: Arc<AtomicBool>,
    pub volume: Arc<VolumeController>,
    /// Frames of real (non-silence) audio rendered since the counter was last reset.
    pub played_frames: Arc<AtomicU64>,
    pub underrun_events: Arc<AtomicU64>,
    /// Bumped whenever buffered audio is discarded; the callback drops its local refill.
    epoch: Arc<AtomicU64>,
}

impl SinkControls {
    pub fn new(volume: Arc<VolumeController>) -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            volume,
            played_frames: Arc::new(AtomicU64::new(0)),
            underrun_events: Arc::new(AtomicU64::new(0)),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Shared record of everything a virtual output rendered.
#[derive(Clone, Debug, Default)]
pub struct Capture {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all samples rendered so far, interleaved.
    pub fn samples(&self) -> Vec<f32> {
        self.samples.lock().clone()
    }

    /// Rendered samples with silence filtered out.
    pub fn audible(&self) -> Vec<f32> {
        self.samples.lock().iter().copied().filter(|s| *s != 0.0).collect()
    }

    fn extend(&self, data: &[f32]) {
        self.samples.lock().extend_from_slice(data);
    }
}

enum Backend {
    Device {
        stream: cpal::Stream,
    },
    Null {
        stop: Arc<AtomicBool>,
        join: Option<thread::JoinHandle<()>>,
    },
}

/// An open output path for one player.
pub struct OutputSink {
    backend: Backend,
    buffer: Arc<SampleBuffer>,
    controls: SinkControls,
    sample_rate: u32,
    channels: usize,
    device_name: String,
    written_frames: u64,
}

impl OutputSink {
    /// Open the configured output, negotiating against a source at `source_rate`.
    pub fn open(
        target: &OutputTarget,
        playback: &PlaybackConfig,
        source_rate: u32,
        controls: SinkControls,
    ) -> Result<Self> {
        match target {
            OutputTarget::Device { needle } => {
                Self::open_device(needle.as_deref(), playback, source_rate, controls)
            }
            OutputTarget::Null(null) => Ok(Self::open_null(null, playback, controls)),
        }
    }

    fn open_device(
        needle: Option<&str>,
        playback: &PlaybackConfig,
        source_rate: u32,
        controls: SinkControls,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, needle)?;
        let device_name = device
            .description()
            .map(|d| d.name().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let config = device::pick_output_config(&device, Some(source_rate))?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }
        let sample_rate = stream_config.sample_rate;
        let channels = stream_config.channels as usize;
        tracing::info!(
            device = %device_name,
            source_rate_hz = source_rate,
            output_rate_hz = sample_rate,
            channels,
            sample_format = ?config.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "output device opened"
        );

        let buffer = Arc::new(SampleBuffer::new(
            channels,
            calc_max_buffered_samples(sample_rate, channels, playback.buffer_seconds),
        ));

        let stream = build_output_stream(
            &device,
            &stream_config,
            config.sample_format(),
            &buffer,
            &controls,
            playback.refill_max_frames,
        )?;
        stream.play()?;

        Ok(Self {
            backend: Backend::Device { stream },
            buffer,
            controls,
            sample_rate,
            channels,
            device_name,
            written_frames: 0,
        })
    }

    fn open_null(null: &NullOutput, playback: &PlaybackConfig, controls: SinkControls) -> Self {
        let sample_rate = null.sample_rate.max(1);
        let channels = (null.channels as usize).max(1);
        let buffer = Arc::new(SampleBuffer::new(
            channels,
            calc_max_buffered_samples(sample_rate, channels, playback.buffer_seconds),
        ));
        let stop = Arc::new(AtomicBool::new(false));

        let period_frames = null.period_frames.max(1);
        let period = Duration::from_secs_f64(period_frames as f64 / sample_rate as f64);
        let refill_max_frames = playback.refill_max_frames;
        let capture = null.capture.clone();
        let buffer_thread = buffer.clone();
        let controls_thread = controls.clone();
        let stop_thread = stop.clone();

        let join = thread::spawn(move || {
            let mut state = RenderState::default();
            let mut data = vec![0.0f32; period_frames * channels];
            let mut next_tick = Instant::now();
            while !stop_thread.load(Ordering::Relaxed) {
                render(
                    &mut data,
                    channels,
                    &mut state,
                    &buffer_thread,
                    &controls_thread,
                    refill_max_frames,
                );
                if let Some(capture) = &capture {
                    capture.extend(&data);
                }
                next_tick += period;
                let now = Instant::now();
                if next_tick > now {
                    thread::sleep(next_tick - now);
                } else {
                    next_tick = now;
                }
            }
        });

        tracing::debug!(rate_hz = sample_rate, channels, "null output opened");

        Self {
            backend: Backend::Null {
                stop,
                join: Some(join),
            },
            buffer,
            controls,
            sample_rate,
            channels,
            device_name: "null".to_string(),
            written_frames: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Reset frame accounting at the start of a play session.
    pub fn begin_session(&mut self) {
        self.discard();
        self.written_frames = 0;
        self.controls.played_frames.store(0, Ordering::Relaxed);
    }

    /// Write interleaved samples in the sink's channel layout, blocking for buffer space.
    ///
    /// Returns `false` if `cancelled` fired before everything was queued.
    pub fn write(&mut self, samples: &[f32], cancelled: impl Fn() -> bool) -> bool {
        let frames = (samples.len() / self.channels) as u64;
        let complete = self.buffer.push_interleaved_blocking(samples, cancelled);
        if complete {
            self.written_frames += frames;
        }
        complete
    }

    /// Block until every written frame has been rendered, or `cancelled` fires.
    ///
    /// While paused nothing is rendered, so this keeps waiting.
    pub fn drain(&self, cancelled: impl Fn() -> bool) -> bool {
        loop {
            if cancelled() {
                return false;
            }
            if self.controls.played_frames.load(Ordering::Relaxed) >= self.written_frames {
                return true;
            }
            thread::sleep(DRAIN_POLL);
        }
    }

    /// Discard buffered samples that have not been rendered yet.
    pub fn discard(&self) {
        self.buffer.clear();
        self.controls.epoch.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.buffer.clear();
        match &mut self.backend {
            Backend::Device { stream } => {
                if let Err(e) = stream.pause() {
                    tracing::debug!("stream pause on close: {e}");
                }
            }
            Backend::Null { stop, join } => {
                stop.store(true, Ordering::Relaxed);
                if let Some(join) = join.take() {
                    let _ = join.join();
                }
            }
        }
        tracing::debug!(device = %self.device_name, "output sink released");
    }
}

/// Build a CPAL output stream rendering from `buffer`.
fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    buffer: &Arc<SampleBuffer>,
    controls: &SinkControls,
    refill_max_frames: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(device, config, buffer, controls, refill_max_frames)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(device, config, buffer, controls, refill_max_frames)
        }
        cpal::SampleFormat::I32 => {
            build_stream::<i32>(device, config, buffer, controls, refill_max_frames)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(device, config, buffer, controls, refill_max_frames)
        }
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: &Arc<SampleBuffer>,
    controls: &SinkControls,
    refill_max_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let buffer_cb = buffer.clone();
    let controls_cb = controls.clone();
    let mut state = RenderState::default();
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            scratch.resize(data.len(), 0.0);
            render(
                &mut scratch,
                channels,
                &mut state,
                &buffer_cb,
                &controls_cb,
                refill_max_frames,
            );
            for (dst, src) in data.iter_mut().zip(&scratch) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Local refill buffer owned by the output callback.
#[derive(Default)]
struct RenderState {
    epoch: u64,
    pos: usize,
    src: Vec<f32>,
    /// The previous batch was filled entirely with audio.
    feeding: bool,
}

/// Fill one output batch.
///
/// Paused: silence, nothing consumed. Otherwise samples are copied with the current gain;
/// when the buffer runs dry the rest of the batch is silence. Running dry counts as one
/// underrun; batches that stay empty afterwards (idle output) do not.
fn render(
    data: &mut [f32],
    channels: usize,
    st: &mut RenderState,
    buffer: &SampleBuffer,
    controls: &SinkControls,
    refill_max_frames: usize,
) {
    let epoch = controls.epoch.load(Ordering::Relaxed);
    if epoch != st.epoch {
        st.epoch = epoch;
        st.pos = 0;
        st.src.clear();
        st.feeding = false;
    }

    if controls.paused.load(Ordering::Relaxed) {
        data.fill(0.0);
        return;
    }

    let gain = controls.volume.get();
    let mut filled = 0usize;
    while filled < data.len() {
        if st.pos >= st.src.len() {
            st.pos = 0;
            match buffer.pop_up_to(refill_max_frames.max(1)) {
                Some(v) => st.src = v,
                None => {
                    st.src.clear();
                    break;
                }
            }
        }
        let n = (st.src.len() - st.pos).min(data.len() - filled);
        for (dst, src) in data[filled..filled + n].iter_mut().zip(&st.src[st.pos..st.pos + n]) {
            *dst = src * gain;
        }
        st.pos += n;
        filled += n;
    }

    if filled < data.len() {
        data[filled..].fill(0.0);
        if filled > 0 || st.feeding {
            controls.underrun_events.fetch_add(1, Ordering::Relaxed);
        }
    }
    st.feeding = filled == data.len();

    let frames = filled / channels.max(1);
    if frames > 0 {
        controls.played_frames.fetch_add(frames as u64, Ordering::Relaxed);
    }
}

/// Convert interleaved samples between channel layouts.
///
/// - mono → N: duplicate channel 0
/// - stereo → mono: average L/R
/// - equal counts: pass-through
/// - other layouts: best-effort "clamp to available channels"
pub fn remix(samples: &[f32], src_channels: usize, dst_channels: usize) -> Vec<f32> {
    if src_channels == dst_channels || src_channels == 0 || dst_channels == 0 {
        return samples.to_vec();
    }

    let frames = samples.len() / src_channels;
    let mut out = Vec::with_capacity(frames * dst_channels);
    for frame in samples.chunks_exact(src_channels) {
        match (src_channels, dst_channels) {
            (2, 1) => out.push(0.5 * (frame[0] + frame[1])),
            (1, _) => out.extend(std::iter::repeat_n(frame[0], dst_channels)),
            _ => {
                for ch in 0..dst_channels {
                    out.push(frame[ch.min(src_channels - 1)]);
                }
            }
        }
    }
    out
}
