//! Zipper-free gain parameter handoff
//!
//! The control thread writes a gain target into an atomic slot; the
//! audio thread reads it once per render and ramps toward it with a
//! short exponential so gain steps never click. Audio-side methods use
//! atomic loads only.

use lm_core::Decibels;
use std::sync::atomic::{AtomicU64, Ordering};

/// Gain ramp time in milliseconds.
pub const GAIN_SMOOTH_TIME_MS: f64 = 15.0;

/// Threshold for considering smoothing complete (relative to target)
const SMOOTH_THRESHOLD: f64 = 1e-6;

/// Single-writer atomic slot holding a gain value in dB.
///
/// The coordinator is the only writer; the stream's audio path is the
/// only reader. Successive writes are observed in issue order (a single
/// `AtomicU64` store/load pair).
#[derive(Debug)]
pub struct GainSlot {
    bits: AtomicU64,
}

impl GainSlot {
    pub fn new(gain_db: f64) -> Self {
        Self {
            bits: AtomicU64::new(gain_db.to_bits()),
        }
    }

    /// Read the current target in dB (audio thread safe).
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Write a new target in dB (control thread).
    #[inline]
    pub fn set(&self, gain_db: f64) {
        self.bits.store(gain_db.to_bits(), Ordering::Relaxed);
    }
}

/// Exponential parameter smoother for linear gain.
///
/// Formula: `current += coeff * (target - current)` per sample, with
/// `coeff = 1 - exp(-1 / (tau * sample_rate))`.
#[derive(Debug, Clone)]
pub struct ParamSmoother {
    current: f64,
    target: f64,
    coeff: f64,
}

impl ParamSmoother {
    pub fn new(sample_rate: f64, initial: f64) -> Self {
        let tau = GAIN_SMOOTH_TIME_MS * 0.001 / 4.6; // 99% settle within the ramp time
        let coeff = 1.0 - (-1.0 / (tau * sample_rate)).exp();
        Self {
            current: initial,
            target: initial,
            coeff,
        }
    }

    #[inline]
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Advance one sample and return the smoothed value.
    #[inline(always)]
    pub fn next(&mut self) -> f64 {
        let delta = self.target - self.current;
        if delta.abs() <= SMOOTH_THRESHOLD {
            self.current = self.target;
        } else {
            self.current += self.coeff * delta;
        }
        self.current
    }

    /// Jump straight to the target without ramping.
    pub fn snap(&mut self) {
        self.current = self.target;
    }
}

/// Convenience: read a dB slot and update a linear-gain smoother target.
#[inline]
pub fn sync_gain(slot: &GainSlot, smoother: &mut ParamSmoother) {
    let target = Decibels(slot.get()).to_gain();
    if target != smoother.target() {
        smoother.set_target(target);
    }
}
