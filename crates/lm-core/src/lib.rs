//! lm-core: Shared types, traits, and utilities for LevelMix
//!
//! This crate provides the foundational types used across all LevelMix
//! crates: sample and channel definitions, decibel conversions, stream
//! identity and status, and the common error type.

mod error;
mod sample;
mod stream;

pub use error::*;
pub use sample::*;
pub use stream::*;

/// Standard sample rate options
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz88200 = 88200,
    Hz96000 = 96000,
}

impl SampleRate {
    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz48000
    }
}

/// Channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ChannelConfig {
    Mono,
    Stereo,
}

impl ChannelConfig {
    #[inline]
    pub fn count(self) -> usize {
        match self {
            ChannelConfig::Mono => 1,
            ChannelConfig::Stereo => 2,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::Stereo
    }
}

/// Lower bound for user-settable stream gain in dB.
pub const MIN_GAIN_DB: f64 = -60.0;

/// Bounds for the per-stream maximum-gain ceiling in dB.
pub const MAX_GAIN_FLOOR_DB: f64 = -20.0;
pub const MAX_GAIN_CEIL_DB: f64 = 20.0;

/// Default per-stream maximum gain in dB.
pub const DEFAULT_MAX_GAIN_DB: f64 = 0.0;

/// Effective gain written to a muted stream. Below the audible floor but
/// distinct from the stored user gain, so clearing solo restores the
/// pre-solo value.
pub const MUTE_GAIN_DB: f64 = -100.0;

/// Bounds for the auto-balance target loudness in LUFS.
pub const MIN_TARGET_LUFS: f64 = -60.0;
pub const MAX_TARGET_LUFS: f64 = 0.0;

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decibels(pub f64);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f64::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f64) -> Self {
        if gain <= 0.0 {
            Self::NEG_INF
        } else {
            Self(20.0 * gain.log10())
        }
    }

    /// Linear gain. Anything at or below the mute sentinel maps to exactly
    /// zero so muted streams contribute nothing to the mix.
    #[inline]
    pub fn to_gain(self) -> f64 {
        if self.0 <= MUTE_GAIN_DB {
            0.0
        } else {
            10.0_f64.powf(self.0 / 20.0)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}
