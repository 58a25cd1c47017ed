//! Per-player gain.
//!
//! Gain is stored as `f32` bits in an atomic so the output callback can read it once per
//! batch without locking. Writers go through [`VolumeController::set`], which refuses to
//! change gain while the player is streaming.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{PlayerError, Result};
use crate::state::PlaybackState;

#[derive(Debug)]
pub struct VolumeController {
    bits: AtomicU32,
}

impl VolumeController {
    pub fn new(gain: f32) -> Self {
        let gain = if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 1.0 };
        Self {
            bits: AtomicU32::new(gain.to_bits()),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Set gain for a player currently in `state`.
    ///
    /// Finite levels are clamped to `[0.0, 1.0]`; returns the stored value.
    pub fn set(&self, level: f32, state: PlaybackState) -> Result<f32> {
        if !state.allows_gain_change() {
            return Err(PlayerError::Locked);
        }
        if !level.is_finite() {
            return Err(PlayerError::InvalidGain(level));
        }
        let gain = level.clamp(0.0, 1.0);
        self.bits.store(gain.to_bits(), Ordering::Relaxed);
        Ok(gain)
    }
}

impl Default for VolumeController {
    fn default() -> Self {
        Self::new(1.0)
    }
}
