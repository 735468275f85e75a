//! Per-stream processing
//!
//! Each registered source is split across the two threads:
//!
//! - [`StreamProcessor`] is the control-side object: lifecycle state
//!   machine, gain policy (clamping, mute sentinel), cached reading.
//! - [`StreamChannel`] is the audio-side chain: capture pull → analysis
//!   tap (pre-fader, feeds the block loudness engine, never audible) →
//!   smoothed gain → contribution to the shared mix.
//!
//! The only links between the two are the atomic gain slot and the
//! reading ring owned by the mix bus.

use crate::capture::{CaptureSource, CaptureStatus};
use crate::param_smoother::{sync_gain, GainSlot, ParamSmoother};
use lm_core::{
    CaptureErrorKind, ChannelConfig, Decibels, LmError, LmResult, Sample, StreamId, StreamStatus,
    DEFAULT_MAX_GAIN_DB, MAX_GAIN_CEIL_DB, MAX_GAIN_FLOOR_DB, MIN_GAIN_DB, MUTE_GAIN_DB,
};
use lm_dsp::loudness::{BlockLoudnessEngine, LoudnessReading};
use lm_dsp::Processor;
use std::sync::Arc;

/// Scratch size for per-channel capture reads; renders larger than this
/// are processed in chunks.
const CHUNK_FRAMES: usize = 4096;

/// Lifecycle of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Starting,
    Capturing,
    Error(CaptureErrorKind),
    Stopping,
}

/// Control-side stream object. Owns policy; never touches audio buffers.
pub struct StreamProcessor {
    id: StreamId,
    label: String,
    state: StreamState,
    sample_rate: f64,
    gain_db: f64,
    max_gain_db: f64,
    muted: bool,
    gain_slot: Arc<GainSlot>,
    latest: LoudnessReading,
}

impl StreamProcessor {
    pub fn new(id: StreamId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            state: StreamState::Idle,
            sample_rate: 0.0,
            gain_db: 0.0,
            max_gain_db: DEFAULT_MAX_GAIN_DB,
            muted: false,
            gain_slot: Arc::new(GainSlot::new(0.0)),
            latest: LoudnessReading::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Externally visible status derived from the state machine.
    pub fn status(&self) -> StreamStatus {
        match self.state {
            StreamState::Capturing => StreamStatus::Capturing,
            StreamState::Error(kind) => StreamStatus::Error(kind),
            _ => StreamStatus::Stopped,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Begin capturing from `source`, producing the audio-side channel to
    /// hand to the mix bus. Fails (and records the error state) if the
    /// source is unusable; partial resources are dropped with the source.
    pub fn start(&mut self, source: Box<dyn CaptureSource>) -> LmResult<Box<StreamChannel>> {
        self.state = StreamState::Starting;

        let sample_rate = source.sample_rate();
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            self.state = StreamState::Error(CaptureErrorKind::Unavailable);
            return Err(LmError::CaptureFailed {
                kind: CaptureErrorKind::Unavailable,
                reason: format!("source reported sample rate {sample_rate}"),
            });
        }

        self.sample_rate = sample_rate;
        self.gain_slot.set(self.effective_gain_db());
        let channel = StreamChannel::new(self.id, source, self.gain_slot.clone());
        self.state = StreamState::Capturing;
        log::debug!("{} capturing at {sample_rate} Hz", self.id);
        Ok(Box::new(channel))
    }

    /// Stop capturing. Idempotent: stopping an idle stream is a no-op.
    pub fn stop(&mut self) {
        match self.state {
            StreamState::Idle => {}
            _ => {
                self.state = StreamState::Stopping;
                self.state = StreamState::Idle;
                log::debug!("{} stopped", self.id);
            }
        }
    }

    /// The underlying source ended on its own (track termination, host
    /// teardown). Self-cleans to idle.
    pub fn mark_ended(&mut self) {
        self.state = StreamState::Idle;
    }

    pub fn mark_error(&mut self, kind: CaptureErrorKind) {
        self.state = StreamState::Error(kind);
    }

    /// Apply a gain request, clamped into `[-60, max_gain_db]`. Returns
    /// the applied value.
    pub fn set_gain(&mut self, gain_db: f64) -> f64 {
        let applied = gain_db.clamp(MIN_GAIN_DB, self.max_gain_db);
        self.gain_db = applied;
        self.push_gain();
        applied
    }

    #[inline]
    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    /// Set the per-stream gain ceiling, clamped into `[-20, +20]`. Pulls
    /// the current gain down if it now exceeds the ceiling. Returns
    /// `(applied_max, applied_gain)`.
    pub fn set_max_gain(&mut self, max_gain_db: f64) -> (f64, f64) {
        self.max_gain_db = max_gain_db.clamp(MAX_GAIN_FLOOR_DB, MAX_GAIN_CEIL_DB);
        if self.gain_db > self.max_gain_db {
            self.gain_db = self.max_gain_db;
            self.push_gain();
        }
        (self.max_gain_db, self.gain_db)
    }

    #[inline]
    pub fn max_gain_db(&self) -> f64 {
        self.max_gain_db
    }

    /// Mute or unmute without touching the stored gain (solo bookkeeping).
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.push_gain();
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// The gain the audio path actually runs: the mute sentinel while
    /// muted, the stored gain otherwise.
    pub fn effective_gain_db(&self) -> f64 {
        if self.muted {
            MUTE_GAIN_DB
        } else {
            self.gain_db
        }
    }

    fn push_gain(&self) {
        self.gain_slot.set(self.effective_gain_db());
    }

    /// Latest reading delivered by the audio side.
    pub fn latest_reading(&self) -> LoudnessReading {
        self.latest
    }

    pub fn update_reading(&mut self, reading: LoudnessReading) {
        self.latest = reading;
    }

    /// Forget cached measurements (the audio-side engine is reset via an
    /// engine command).
    pub fn clear_reading(&mut self) {
        self.latest = LoudnessReading::default();
    }
}

/// Outcome of rendering one block of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelOutcome {
    Running,
    Ended,
}

/// Audio-side per-stream chain. Lives on the real-time thread; all
/// buffers are allocated at construction.
pub struct StreamChannel {
    id: StreamId,
    source: Box<dyn CaptureSource>,
    mono: bool,
    engine: BlockLoudnessEngine,
    gain_slot: Arc<GainSlot>,
    smoother: ParamSmoother,
    scratch_l: Vec<Sample>,
    scratch_r: Vec<Sample>,
}

impl StreamChannel {
    fn new(id: StreamId, source: Box<dyn CaptureSource>, gain_slot: Arc<GainSlot>) -> Self {
        let sample_rate = source.sample_rate();
        let mono = source.channels() == ChannelConfig::Mono;
        let initial_gain = Decibels(gain_slot.get()).to_gain();
        Self {
            id,
            source,
            mono,
            engine: BlockLoudnessEngine::new(sample_rate),
            gain_slot,
            smoother: ParamSmoother::new(sample_rate, initial_gain),
            scratch_l: vec![0.0; CHUNK_FRAMES],
            scratch_r: vec![0.0; CHUNK_FRAMES],
        }
    }

    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn sample_rate(&self) -> f64 {
        self.engine.sample_rate()
    }

    /// Reset the measurement engine (filters, rings, histories, counter).
    pub fn reset_measurements(&mut self) {
        self.engine.reset();
    }

    /// Pull one block from the source, feed the analysis tap, and add the
    /// post-gain signal into `out_l`/`out_r`. Readings produced along the
    /// way are handed to `publish`.
    pub(crate) fn process_into(
        &mut self,
        out_l: &mut [Sample],
        out_r: &mut [Sample],
        publish: &mut dyn FnMut(StreamId, LoudnessReading),
    ) -> ChannelOutcome {
        // Commit the latest control-side gain target once per render.
        sync_gain(&self.gain_slot, &mut self.smoother);

        let mut offset = 0;
        while offset < out_l.len() {
            let n = (out_l.len() - offset).min(CHUNK_FRAMES);
            let status = self
                .source
                .read(&mut self.scratch_l[..n], &mut self.scratch_r[..n]);
            if self.mono {
                // Duplicate the single channel before filtering.
                self.scratch_r[..n].copy_from_slice(&self.scratch_l[..n]);
            }

            for i in 0..n {
                let l = self.scratch_l[i];
                let r = self.scratch_r[i];

                // Analysis branch: pre-fader, produces no audible output.
                if let Some(reading) = self.engine.process_frame(l, r) {
                    publish(self.id, reading);
                }

                // Playback branch: smoothed gain into the shared mix.
                let gain = self.smoother.next();
                out_l[offset + i] += l * gain;
                out_r[offset + i] += r * gain;
            }

            if status == CaptureStatus::Ended {
                return ChannelOutcome::Ended;
            }
            offset += n;
        }
        ChannelOutcome::Running
    }
}
