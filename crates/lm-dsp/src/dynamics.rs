//! Dynamics processing for the summed output
//!
//! A stereo-linked soft-knee compressor configured for limiting sits on
//! the mix bus and keeps the combined streams below the configured
//! ceiling. Disabling it swaps in a bypass parameter set (unity ratio)
//! rather than removing the node, so enable/disable is a pure parameter
//! flip on the audio thread.

use crate::{Processor, StereoProcessor};
use lm_core::Sample;

/// Shared limiter parameters.
///
/// The record travels between threads as a whole; the audio side swaps it
/// in at a block boundary so partial updates are never observed.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    pub enabled: bool,
    /// Ceiling in dBFS. Allowed range −6.0 .. −0.1.
    pub threshold_db: f64,
    /// Soft-knee width in dB. Allowed range 0 .. 40.
    pub knee_db: f64,
    /// Compression ratio above the knee. At least 1:1.
    pub ratio: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_db: -1.0,
            knee_db: 3.0,
            ratio: 20.0,
            attack_ms: 3.0,
            release_ms: 250.0,
        }
    }
}

impl LimiterSettings {
    /// Parameter set used while disabled: unity ratio with a slow release,
    /// audibly transparent but keeping the node warm in the graph.
    pub const BYPASS: Self = Self {
        enabled: false,
        threshold_db: 0.0,
        knee_db: 40.0,
        ratio: 1.0,
        attack_ms: 0.0,
        release_ms: 250.0,
    };

    /// Clamp every field into its allowed range.
    pub fn clamped(mut self) -> Self {
        self.threshold_db = self.threshold_db.clamp(-6.0, -0.1);
        self.knee_db = self.knee_db.clamp(0.0, 40.0);
        self.ratio = self.ratio.clamp(1.0, 100.0);
        self.attack_ms = self.attack_ms.clamp(0.0, 500.0);
        self.release_ms = self.release_ms.clamp(1.0, 5000.0);
        self
    }

    /// The parameters the DSP actually runs: the stored record when
    /// enabled, the bypass set otherwise.
    fn effective(&self) -> Self {
        if self.enabled {
            *self
        } else {
            Self::BYPASS
        }
    }
}

/// Envelope follower for dynamics processing
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack_coeff: f64,
    release_coeff: f64,
    envelope: f64,
    sample_rate: f64,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f64) -> Self {
        let mut follower = Self {
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            sample_rate,
        };
        follower.set_times(10.0, 100.0);
        follower
    }

    /// Set attack and release times in milliseconds. Zero attack tracks
    /// the input instantly.
    pub fn set_times(&mut self, attack_ms: f64, release_ms: f64) {
        self.attack_coeff = Self::coeff(attack_ms, self.sample_rate);
        self.release_coeff = Self::coeff(release_ms, self.sample_rate);
    }

    #[inline]
    fn coeff(time_ms: f64, sample_rate: f64) -> f64 {
        if time_ms <= 0.0 {
            0.0
        } else {
            (-1.0 / (time_ms * 0.001 * sample_rate)).exp()
        }
    }

    #[inline(always)]
    pub fn process(&mut self, input: Sample) -> f64 {
        let abs_input = input.abs();
        let coeff = if abs_input > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = abs_input + coeff * (self.envelope - abs_input);
        self.envelope
    }

    pub fn current(&self) -> f64 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Stereo-linked soft-knee limiter for the mix bus.
///
/// The sidechain follows the per-frame stereo peak so both channels get
/// the same gain and the image does not wander under reduction.
#[derive(Debug, Clone)]
pub struct MixLimiter {
    settings: LimiterSettings,
    envelope: EnvelopeFollower,
    gain_reduction_db: f64,
}

impl MixLimiter {
    pub fn new(sample_rate: f64) -> Self {
        let mut limiter = Self {
            settings: LimiterSettings::default(),
            envelope: EnvelopeFollower::new(sample_rate),
            gain_reduction_db: 0.0,
        };
        limiter.apply_times();
        limiter
    }

    /// Swap in a whole settings record. Clamped on entry; envelope time
    /// constants follow the effective (enabled or bypass) parameters.
    pub fn set_settings(&mut self, settings: LimiterSettings) {
        self.settings = settings.clamped();
        self.apply_times();
    }

    pub fn settings(&self) -> LimiterSettings {
        self.settings
    }

    /// Current gain reduction in dB (0 = unity).
    pub fn gain_reduction_db(&self) -> f64 {
        self.gain_reduction_db
    }

    fn apply_times(&mut self) {
        let eff = self.settings.effective();
        self.envelope.set_times(eff.attack_ms, eff.release_ms);
    }

    /// Soft-knee transfer curve: reduction in dB for a sidechain level.
    #[inline]
    fn gain_reduction_for(&self, input_db: f64) -> f64 {
        let eff = self.settings.effective();
        let slope = 1.0 - 1.0 / eff.ratio;
        if eff.knee_db <= 0.0 {
            // Hard knee
            return if input_db > eff.threshold_db {
                (input_db - eff.threshold_db) * slope
            } else {
                0.0
            };
        }

        let half_knee = eff.knee_db / 2.0;
        let knee_start = eff.threshold_db - half_knee;
        if input_db < knee_start {
            0.0
        } else if input_db > eff.threshold_db + half_knee {
            (input_db - eff.threshold_db) * slope
        } else {
            let x = input_db - knee_start;
            (slope * x * x) / (2.0 * eff.knee_db)
        }
    }
}

impl Processor for MixLimiter {
    fn reset(&mut self) {
        self.envelope.reset();
        self.gain_reduction_db = 0.0;
    }
}

impl StereoProcessor for MixLimiter {
    #[inline(always)]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let peak = left.abs().max(right.abs());
        let env = self.envelope.process(peak);

        if env < 1e-10 {
            self.gain_reduction_db = 0.0;
            return (left, right);
        }

        let env_db = 20.0 * env.log10();
        let gr_db = self.gain_reduction_for(env_db);
        self.gain_reduction_db = gr_db;

        let gain = 10.0_f64.powf(-gr_db / 20.0);
        (left * gain, right * gain)
    }
}
