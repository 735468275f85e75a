//! Block loudness engine (ITU-R BS.1770-4)
//!
//! Measures momentary, short-term, and integrated loudness of one stereo
//! stream from K-weighted sample energy:
//! - 400 ms analysis blocks with 75 % overlap (100 ms hop)
//! - absolute gate at −70 LUFS, relative gate at −10 LU for integrated
//! - readings published at ~10 Hz
//!
//! The per-sample path exchanges one squared sample against a circular
//! buffer and updates a running sum per channel, so block emission costs
//! O(1) per sample regardless of block size. All storage is sized at
//! construction; the hot path never allocates.

use crate::biquad::KWeightingFilter;
use crate::{MonoProcessor, Processor};
use lm_core::Sample;

/// Blocks below this loudness never enter a measurement.
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;

/// Offset of the relative gate below the first-pass mean, in LU.
pub const RELATIVE_GATE_LU: f64 = 10.0;

/// Analysis block duration in seconds.
pub const BLOCK_DURATION_SECS: f64 = 0.4;

/// Short-term window in milliseconds.
pub const SHORT_TERM_WINDOW_MS: f64 = 3000.0;

/// Integrated-history capacity: 600 gated blocks ≈ 60 s at the 100 ms hop.
pub const INTEGRATED_HISTORY_CAP: usize = 600;

/// Integrated loudness is unreliable below this many blocks and must not
/// drive balancing decisions.
pub const MIN_BLOCKS_FOR_RELIABLE_LUFS: u32 = 10;

/// Stereo channel weights per BS.1770-4 (L/R both 1.0).
const CHANNEL_WEIGHTS: [f64; 2] = [1.0, 1.0];

/// Offset aligning K-weighted mean square with the LUFS scale.
const LUFS_OFFSET: f64 = -0.691;

/// One published measurement snapshot.
///
/// `f64::NEG_INFINITY` means "below the absolute threshold or not yet
/// measurable"; consumers can treat it as "not ready".
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoudnessReading {
    /// Loudness of the most recent 400 ms block.
    pub momentary: f64,
    /// Gated energy average over the last 3 s of blocks.
    pub short_term: f64,
    /// Doubly gated energy average over the whole measurement history.
    pub integrated: f64,
    /// Total blocks emitted since the last reset.
    pub block_count: u32,
}

impl Default for LoudnessReading {
    fn default() -> Self {
        Self {
            momentary: f64::NEG_INFINITY,
            short_term: f64::NEG_INFINITY,
            integrated: f64::NEG_INFINITY,
            block_count: 0,
        }
    }
}

/// Fixed-capacity FIFO of block loudness values. Overwrites the oldest
/// entry once full; iteration order is irrelevant to the gated averages.
#[derive(Debug, Clone)]
struct BlockHistory {
    buf: Vec<f64>,
    write_pos: usize,
    len: usize,
}

impl BlockHistory {
    fn with_capacity(cap: usize) -> Self {
        Self {
            buf: vec![0.0; cap],
            write_pos: 0,
            len: 0,
        }
    }

    #[inline]
    fn push(&mut self, value: f64) {
        self.buf[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.buf.len();
        self.len = (self.len + 1).min(self.buf.len());
    }

    #[inline]
    fn entries(&self) -> &[f64] {
        &self.buf[..self.len]
    }

    fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }
}

/// Per-stream loudness measurement engine.
///
/// Feed stereo frames with [`process_frame`](Self::process_frame); a
/// [`LoudnessReading`] is returned whenever the ~10 Hz update interval
/// elapses. Mono sources duplicate their single channel into both inputs
/// before filtering.
#[derive(Debug, Clone)]
pub struct BlockLoudnessEngine {
    sample_rate: f64,
    block_size: usize,
    hop_size: usize,
    update_interval: usize,

    filters: [KWeightingFilter; 2],
    /// Squared K-weighted samples, one ring per channel.
    rings: [Vec<f64>; 2],
    /// Running sums over the rings, 64-bit to bound drift.
    sums: [f64; 2],
    ring_index: usize,
    /// Valid samples written during warm-up; emission is held until this
    /// reaches `block_size`.
    warmup_filled: usize,

    samples_since_block: usize,
    samples_since_update: usize,

    integrated_history: BlockHistory,
    short_term_history: BlockHistory,
    momentary: f64,
    block_count: u32,
}

impl BlockLoudnessEngine {
    pub fn new(sample_rate: f64) -> Self {
        let block_size = ((BLOCK_DURATION_SECS * sample_rate).round() as usize).max(128);
        let hop_size = ((block_size as f64 * 0.25).round() as usize).max(1);
        let update_interval = ((0.1 * sample_rate).round() as usize).max(128);
        let hop_ms = hop_size as f64 / sample_rate * 1000.0;
        let short_term_blocks = (SHORT_TERM_WINDOW_MS / hop_ms).ceil() as usize;

        Self {
            sample_rate,
            block_size,
            hop_size,
            update_interval,
            filters: [KWeightingFilter::new(), KWeightingFilter::new()],
            rings: [vec![0.0; block_size], vec![0.0; block_size]],
            sums: [0.0, 0.0],
            ring_index: 0,
            warmup_filled: 0,
            samples_since_block: 0,
            samples_since_update: 0,
            integrated_history: BlockHistory::with_capacity(INTEGRATED_HISTORY_CAP),
            short_term_history: BlockHistory::with_capacity(short_term_blocks),
            momentary: f64::NEG_INFINITY,
            block_count: 0,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    #[inline]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// True once the first full 400 ms window has been accumulated.
    #[inline]
    pub fn is_warmed_up(&self) -> bool {
        self.warmup_filled >= self.block_size
    }

    /// Process one stereo frame. Returns a reading when the update
    /// interval elapses, `None` otherwise.
    #[inline]
    pub fn process_frame(&mut self, left: Sample, right: Sample) -> Option<LoudnessReading> {
        let frame = [left, right];
        for ch in 0..2 {
            let filtered = self.filters[ch].process_sample(frame[ch]);
            let squared = filtered * filtered;
            let old = self.rings[ch][self.ring_index];
            self.sums[ch] += squared - old;
            self.rings[ch][self.ring_index] = squared;
        }

        self.ring_index += 1;
        if self.ring_index == self.block_size {
            self.ring_index = 0;
        }

        if self.warmup_filled < self.block_size {
            // Ring still filling: no hop counting, no emission.
            self.warmup_filled += 1;
        } else {
            self.samples_since_block += 1;
            if self.samples_since_block >= self.hop_size {
                self.emit_block();
                // Subtract rather than zero to keep the hop phase.
                self.samples_since_block -= self.hop_size;
            }
        }

        self.samples_since_update += 1;
        if self.samples_since_update >= self.update_interval {
            self.samples_since_update -= self.update_interval;
            Some(self.reading())
        } else {
            None
        }
    }

    fn emit_block(&mut self) {
        let mut weighted_sum = 0.0;
        for ch in 0..2 {
            let mean_square = self.sums[ch] / self.block_size as f64;
            weighted_sum += CHANNEL_WEIGHTS[ch] * mean_square;
        }

        let loudness = if weighted_sum > 0.0 {
            LUFS_OFFSET + 10.0 * weighted_sum.log10()
        } else {
            f64::NEG_INFINITY
        };

        if loudness > ABSOLUTE_GATE_LUFS {
            self.integrated_history.push(loudness);
        }
        self.short_term_history.push(loudness);
        self.momentary = loudness;
        self.block_count += 1;
    }

    /// Most recent block loudness; −∞ before the first block or below the
    /// absolute threshold.
    pub fn momentary(&self) -> f64 {
        if self.momentary > ABSOLUTE_GATE_LUFS {
            self.momentary
        } else {
            f64::NEG_INFINITY
        }
    }

    /// Energy average of the last 3 s of blocks, gated at −70 LUFS.
    pub fn short_term(&self) -> f64 {
        let mut power = 0.0;
        let mut count = 0usize;
        for &l in self.short_term_history.entries() {
            if l > ABSOLUTE_GATE_LUFS {
                power += 10.0_f64.powf(l / 10.0);
                count += 1;
            }
        }
        if count == 0 {
            f64::NEG_INFINITY
        } else {
            10.0 * (power / count as f64).log10()
        }
    }

    /// Gated integrated loudness: absolute gate, then a relative gate
    /// 10 LU below the first-pass mean power.
    pub fn integrated(&self) -> f64 {
        let gated = self.integrated_history.entries();
        if gated.is_empty() {
            return f64::NEG_INFINITY;
        }

        let first_pass_power =
            gated.iter().map(|&l| 10.0_f64.powf(l / 10.0)).sum::<f64>() / gated.len() as f64;
        let relative_threshold = 10.0 * first_pass_power.log10() - RELATIVE_GATE_LU;

        let mut power = 0.0;
        let mut count = 0usize;
        for &l in gated {
            if l > relative_threshold {
                power += 10.0_f64.powf(l / 10.0);
                count += 1;
            }
        }
        if count == 0 {
            f64::NEG_INFINITY
        } else {
            10.0 * (power / count as f64).log10()
        }
    }

    /// Snapshot of all three measurements plus the block counter.
    pub fn reading(&self) -> LoudnessReading {
        LoudnessReading {
            momentary: self.momentary(),
            short_term: self.short_term(),
            integrated: self.integrated(),
            block_count: self.block_count,
        }
    }
}

impl Processor for BlockLoudnessEngine {
    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
        for ring in &mut self.rings {
            ring.iter_mut().for_each(|v| *v = 0.0);
        }
        self.sums = [0.0, 0.0];
        self.ring_index = 0;
        self.warmup_filled = 0;
        self.samples_since_block = 0;
        self.samples_since_update = 0;
        self.integrated_history.clear();
        self.short_term_history.clear();
        self.momentary = f64::NEG_INFINITY;
        self.block_count = 0;
    }
}
