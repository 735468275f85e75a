//! Capture source abstraction
//!
//! The host owns actual capture (tab audio, device, file, network); the
//! engine only needs a way to pull planar PCM frames and to learn when a
//! source has ended. Implementations must be `Send` so a source can be
//! handed to the audio thread; `read` is called from the hot path and
//! must not allocate or block.

use lm_core::{ChannelConfig, Sample};

/// Result of pulling frames from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Frames were delivered; the source is still live.
    Active,
    /// The underlying source terminated (track ended, host shut the
    /// capture down). The delivered frames are the final ones.
    Ended,
}

/// A host-supplied source of decoded PCM.
pub trait CaptureSource: Send {
    /// Sample rate the source delivers at.
    fn sample_rate(&self) -> f64;

    /// Channel layout. Mono sources fill only `left`; the stream channel
    /// duplicates it before analysis and playback.
    fn channels(&self) -> ChannelConfig;

    /// Fill `left` and `right` with the next `left.len()` frames.
    /// Underruns are filled with silence by the implementation.
    fn read(&mut self, left: &mut [Sample], right: &mut [Sample]) -> CaptureStatus;
}

/// Source producing silence forever. Useful as a placeholder and in
/// tests.
#[derive(Debug, Default)]
pub struct SilenceSource {
    sample_rate: f64,
}

impl SilenceSource {
    pub fn new(sample_rate: f64) -> Self {
        Self { sample_rate }
    }
}

impl CaptureSource for SilenceSource {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channels(&self) -> ChannelConfig {
        ChannelConfig::Stereo
    }

    fn read(&mut self, left: &mut [Sample], right: &mut [Sample]) -> CaptureStatus {
        left.fill(0.0);
        right.fill(0.0);
        CaptureStatus::Active
    }
}

/// Deterministic sine source for tests and the demo driver.
#[derive(Debug)]
pub struct SineSource {
    sample_rate: f64,
    freq: f64,
    amplitude: f64,
    phase: f64,
    channels: ChannelConfig,
    /// Frames still to deliver; `None` plays forever.
    remaining: Option<u64>,
}

impl SineSource {
    pub fn new(sample_rate: f64, freq: f64, amplitude: f64) -> Self {
        Self {
            sample_rate,
            freq,
            amplitude,
            phase: 0.0,
            channels: ChannelConfig::Stereo,
            remaining: None,
        }
    }

    /// Restrict the source to a fixed number of frames, after which it
    /// reports [`CaptureStatus::Ended`].
    pub fn with_duration_frames(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }

    pub fn mono(mut self) -> Self {
        self.channels = ChannelConfig::Mono;
        self
    }
}

impl CaptureSource for SineSource {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channels(&self) -> ChannelConfig {
        self.channels
    }

    fn read(&mut self, left: &mut [Sample], right: &mut [Sample]) -> CaptureStatus {
        let step = 2.0 * std::f64::consts::PI * self.freq / self.sample_rate;
        let deliver = match self.remaining {
            Some(rem) => (rem as usize).min(left.len()),
            None => left.len(),
        };

        for i in 0..deliver {
            let s = self.amplitude * self.phase.sin();
            self.phase += step;
            left[i] = s;
            if self.channels == ChannelConfig::Stereo {
                right[i] = s;
            }
        }
        if self.phase > 2.0 * std::f64::consts::PI {
            self.phase %= 2.0 * std::f64::consts::PI;
        }
        left[deliver..].fill(0.0);
        if self.channels == ChannelConfig::Stereo {
            right[deliver..].fill(0.0);
        }

        match &mut self.remaining {
            Some(rem) => {
                *rem -= deliver as u64;
                if *rem == 0 {
                    CaptureStatus::Ended
                } else {
                    CaptureStatus::Active
                }
            }
            None => CaptureStatus::Active,
        }
    }
}
