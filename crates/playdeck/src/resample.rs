//! Sample-rate conversion for sources that do not match the sink rate.
//!
//! Wraps Rubato's sinc resampler behind a push-style API: the streaming thread feeds decoded
//! chunks of any size, the resampler slices them into fixed input chunks, and `finish`
//! flushes the partial tail at end of source.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

/// Headroom passed to Rubato for ratio changes; also used to size the output buffer.
const MAX_RATIO_RELATIVE: f64 = 1.1;

pub struct StreamResampler {
    inner: Box<dyn Resampler<f32>>,
    channels: usize,
    chunk_frames: usize,
    pending: Vec<f32>,
    out: Vec<f32>,
    indexing: Indexing,
}

impl StreamResampler {
    /// Build a resampler converting interleaved audio from `src_rate` to `dst_rate`.
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        if src_rate == 0 || dst_rate == 0 || channels == 0 {
            return Err(anyhow!(
                "invalid resampler shape: {src_rate} Hz -> {dst_rate} Hz, {channels} channels"
            ));
        }
        let ratio = dst_rate as f64 / src_rate as f64;
        let chunk_frames = chunk_frames.max(1);

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let inner = Async::<f32>::new_sinc(
            ratio,
            MAX_RATIO_RELATIVE,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| anyhow!("resampler init: {e}"))?;

        let out_frames = (chunk_frames as f64 * ratio * MAX_RATIO_RELATIVE).ceil() as usize + 16;
        tracing::debug!(src_rate, dst_rate, channels, chunk_frames, "resampler created");

        Ok(Self {
            inner: Box::new(inner),
            channels,
            chunk_frames,
            pending: Vec::with_capacity(chunk_frames * channels * 2),
            out: vec![0.0; out_frames * channels],
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
        })
    }

    /// Feed interleaved input; returns whatever output full chunks produced.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let chunk_samples = self.chunk_frames * self.channels;
        let mut produced = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= chunk_samples {
            let chunk = self.pending[consumed..consumed + chunk_samples].to_vec();
            self.run(&chunk, None, &mut produced)?;
            consumed += chunk_samples;
        }
        self.pending.drain(..consumed);
        Ok(produced)
    }

    /// Flush buffered input at end of source.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        let mut produced = Vec::new();
        let tail_frames = self.pending.len() / self.channels;
        if tail_frames > 0 {
            let mut chunk = std::mem::take(&mut self.pending);
            chunk.truncate(tail_frames * self.channels);
            chunk.resize(self.chunk_frames * self.channels, 0.0);
            self.run(&chunk, Some(tail_frames), &mut produced)?;
        }
        self.pending.clear();
        Ok(produced)
    }

    fn run(
        &mut self,
        chunk: &[f32],
        partial_len: Option<usize>,
        produced: &mut Vec<f32>,
    ) -> Result<()> {
        let input = InterleavedSlice::new(chunk, self.channels, self.chunk_frames)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;

        let out_capacity_frames = self.out.len() / self.channels;
        let mut output =
            InterleavedSlice::new_mut(&mut self.out, self.channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;

        self.indexing.input_offset = 0;
        self.indexing.output_offset = 0;
        self.indexing.partial_len = partial_len;

        let (_nbr_in, nbr_out) = self
            .inner
            .process_into_buffer(&input, &mut output, Some(&self.indexing))
            .map_err(|e| anyhow!("resampler process: {e}"))?;

        produced.extend_from_slice(&self.out[..nbr_out * self.channels]);
        Ok(())
    }
}
