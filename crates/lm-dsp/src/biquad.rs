//! Biquad filter sections and the K-weighting cascade
//!
//! The K-weighting pre-filter from ITU-R BS.1770-4 models the ear's
//! frequency sensitivity before energy integration: a +4 dB high-shelf
//! above ~1.5 kHz followed by a ~38 Hz high-pass. Both stages use the
//! standard reference coefficients designed at 48 kHz.

use crate::{MonoProcessor, Processor};
use lm_core::Sample;

/// Biquad coefficients (normalized, a0 = 1)
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Stage 1 of the K-weighting cascade: high-frequency shelving boost
    /// (+4 dB above ~1.5 kHz). Reference design at 48 kHz.
    pub const K_HIGH_SHELF: Self = Self {
        b0: 1.53512485958697,
        b1: -2.69169618940638,
        b2: 1.19839281085285,
        a1: -1.69065929318241,
        a2: 0.73248077421585,
    };

    /// Stage 2 of the K-weighting cascade: ~38 Hz high-pass removing
    /// inaudible rumble from the energy measurement. Reference design at
    /// 48 kHz.
    pub const K_HIGH_PASS: Self = Self {
        b0: 1.0,
        b1: -2.0,
        b2: 1.0,
        a1: -1.99004745483398,
        a2: 0.99007225036621,
    };
}

/// Single biquad section, Direct Form I.
///
/// State is the last two inputs and last two outputs; reset zeroes all
/// four words.
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            ..Default::default()
        }
    }

    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }
}

impl Processor for Biquad {
    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

impl MonoProcessor for Biquad {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let c = &self.coeffs;
        let output =
            c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// K-weighting filter for one channel: shelf stage feeding the high-pass
/// stage. Stereo analysis uses one instance per channel.
#[derive(Debug, Clone)]
pub struct KWeightingFilter {
    shelf: Biquad,
    highpass: Biquad,
}

impl KWeightingFilter {
    pub fn new() -> Self {
        Self {
            shelf: Biquad::new(BiquadCoeffs::K_HIGH_SHELF),
            highpass: Biquad::new(BiquadCoeffs::K_HIGH_PASS),
        }
    }
}

impl Default for KWeightingFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for KWeightingFilter {
    fn reset(&mut self) {
        self.shelf.reset();
        self.highpass.reset();
    }
}

impl MonoProcessor for KWeightingFilter {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.highpass.process_sample(self.shelf.process_sample(input))
    }
}
