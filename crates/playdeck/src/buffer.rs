//! Bounded sample buffer between a player's streaming thread and its output callback.
//!
//! The streaming thread pushes interleaved `f32` samples (already at the sink's rate and
//! channel count) and blocks when the buffer is full. The output callback drains it without
//! ever waiting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};

/// How long a blocked producer sleeps before re-checking its cancel condition.
const PUSH_RECHECK: Duration = Duration::from_millis(20);

/// Thread-safe bounded queue for interleaved `f32` audio samples.
///
/// Samples are stored interleaved:
/// `frame0[ch0], frame0[ch1], ..., frame1[ch0], frame1[ch1], ...`
///
/// The channel count is fixed for the lifetime of the buffer.
pub struct SampleBuffer {
    channels: usize,
    queue: Mutex<VecDeque<f32>>,
    cv: Condvar,
    max_buffered_samples: usize,
    low_watermark_ms: AtomicU64,
}

/// Compute a queue capacity in **samples** for a `(rate, channels, seconds)` target.
///
/// Non-finite or non-positive `buffer_seconds` falls back to two seconds.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl SampleBuffer {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            queue: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
            low_watermark_ms: AtomicU64::new(0),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Maximum buffered frames (capacity).
    pub fn max_frames(&self) -> usize {
        self.max_buffered_samples / self.channels
    }

    /// Current buffered frames. Can change immediately after the call returns.
    pub fn len_frames(&self) -> usize {
        self.queue.lock().len() / self.channels
    }

    /// Drop everything buffered and wake blocked producers.
    pub fn clear(&self) {
        self.queue.lock().clear();
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the buffer is full.
    ///
    /// `cancelled` is polled while waiting for space; once it returns `true` the remaining
    /// samples are dropped and `false` is returned.
    pub fn push_interleaved_blocking(&self, samples: &[f32], cancelled: impl Fn() -> bool) -> bool {
        let mut offset = 0;

        while offset < samples.len() {
            let mut q = self.queue.lock();

            while q.len() >= self.max_buffered_samples {
                if cancelled() {
                    return false;
                }
                self.cv.wait_for(&mut q, PUSH_RECHECK);
            }

            let room = self.max_buffered_samples - q.len();
            let take = room.min(samples.len() - offset);
            q.extend(&samples[offset..offset + take]);
            offset += take;
        }

        !cancelled()
    }

    /// Pop up to `max_frames` whole frames without blocking.
    ///
    /// Returns `None` when no complete frame is buffered.
    pub fn pop_up_to(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut q = self.queue.lock();

        let available_frames = q.len() / self.channels;
        let take_samples = available_frames.min(max_frames) * self.channels;
        if take_samples == 0 {
            return None;
        }

        let out: Vec<f32> = q.drain(..take_samples).collect();
        let remaining = q.len();
        drop(q);
        self.cv.notify_all();
        self.log_low_watermark(remaining);
        Some(out)
    }

    fn log_low_watermark(&self, queued: usize) {
        let threshold = (self.max_buffered_samples / 8).max(self.channels * 16);
        if queued > 0 && queued < threshold {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_else(|_| Duration::from_millis(0))
                .as_millis() as u64;
            let last = self.low_watermark_ms.load(Ordering::Relaxed);
            if now.saturating_sub(last) > 1000 {
                self.low_watermark_ms.store(now, Ordering::Relaxed);
                tracing::debug!(
                    queued_samples = queued,
                    threshold_samples = threshold,
                    "sample buffer low watermark"
                );
            }
        }
    }
}
