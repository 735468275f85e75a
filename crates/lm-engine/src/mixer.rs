//! Shared mix bus
//!
//! Sums every stream's post-gain signal and runs the shared limiter over
//! the result. All control traffic crosses thread boundaries through
//! lock-free rings:
//!
//! - control → audio: [`EngineCommand`] (add/remove streams, limiter
//!   settings, measurement resets), popped at render start so commands
//!   land on block boundaries and in issue order;
//! - audio → control: [`EngineNotice`] (readings at ~10 Hz, source-end
//!   notifications);
//! - audio → control: retired [`StreamChannel`] boxes, so buffers are
//!   freed on the control thread and the render path never deallocates.
//!
//! Per-stream gain does not travel through the command ring — it lives
//! in the per-stream atomic slots (see `param_smoother`).

use crate::stream::{ChannelOutcome, StreamChannel};
use lm_core::{Sample, StreamId};
use lm_dsp::dynamics::{LimiterSettings, MixLimiter};
use lm_dsp::loudness::LoudnessReading;
use lm_dsp::StereoProcessor;
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Command ring capacity (power of two).
const COMMAND_RING_SIZE: usize = 256;

/// Notice ring capacity. Readings arrive at ~10 Hz per stream; this is
/// generous headroom for a slow control thread.
const NOTICE_RING_SIZE: usize = 1024;

/// Retired-channel ring capacity.
const RETIRED_RING_SIZE: usize = 128;

/// Most simultaneous streams the bus will host.
pub const MAX_STREAMS: usize = 64;

/// Control → audio commands, applied at the next render boundary.
pub enum EngineCommand {
    /// Attach a fully built stream channel to the mix.
    AddStream(Box<StreamChannel>),
    /// Detach a channel; it comes back over the retired ring.
    RemoveStream(StreamId),
    /// Swap the limiter parameter record as a whole.
    SetLimiter(LimiterSettings),
    /// Reset one stream's measurement engine.
    ResetMeasurements(StreamId),
}

/// A published measurement snapshot, tagged with its stream.
#[derive(Debug, Clone, Copy)]
pub struct ReadingUpdate {
    pub stream_id: StreamId,
    pub reading: LoudnessReading,
}

/// Audio → control notifications.
pub enum EngineNotice {
    Reading(ReadingUpdate),
    /// The source reported end-of-stream; the channel was detached.
    StreamEnded(StreamId),
}

/// Control-side handle to a [`MixBus`].
pub struct EngineHandle {
    commands: Producer<EngineCommand>,
    notices: Consumer<EngineNotice>,
    retired: Consumer<Box<StreamChannel>>,
    gain_reduction_bits: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Send a command to the audio side. Returns false if the ring is
    /// full (the command is dropped).
    pub fn send(&mut self, command: EngineCommand) -> bool {
        self.commands.push(command).is_ok()
    }

    /// Pop the next pending notice, if any.
    pub fn poll_notice(&mut self) -> Option<EngineNotice> {
        self.notices.pop().ok()
    }

    /// Drop any channels the audio side has retired. Call periodically so
    /// buffers are freed off the real-time thread.
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        while self.retired.pop().is_ok() {
            count += 1;
        }
        count
    }

    /// Limiter gain reduction as of the last render, in dB.
    pub fn limiter_gain_reduction_db(&self) -> f64 {
        f64::from_bits(self.gain_reduction_bits.load(Ordering::Relaxed))
    }
}

/// The audio-side mixer: owns every stream channel and the shared
/// limiter. `render` is the real-time entry point.
pub struct MixBus {
    sample_rate: f64,
    channels: Vec<Box<StreamChannel>>,
    limiter: MixLimiter,
    commands: Consumer<EngineCommand>,
    notices: Producer<EngineNotice>,
    retired: Producer<Box<StreamChannel>>,
    gain_reduction_bits: Arc<AtomicU64>,
}

/// Build a connected mix bus / control handle pair.
pub fn mix_bus(sample_rate: f64) -> (MixBus, EngineHandle) {
    let (cmd_tx, cmd_rx) = RingBuffer::new(COMMAND_RING_SIZE);
    let (notice_tx, notice_rx) = RingBuffer::new(NOTICE_RING_SIZE);
    let (retired_tx, retired_rx) = RingBuffer::new(RETIRED_RING_SIZE);
    let gain_reduction_bits = Arc::new(AtomicU64::new(0.0_f64.to_bits()));

    let bus = MixBus {
        sample_rate,
        channels: Vec::with_capacity(MAX_STREAMS),
        limiter: MixLimiter::new(sample_rate),
        commands: cmd_rx,
        notices: notice_tx,
        retired: retired_tx,
        gain_reduction_bits: gain_reduction_bits.clone(),
    };
    let handle = EngineHandle {
        commands: cmd_tx,
        notices: notice_rx,
        retired: retired_rx,
        gain_reduction_bits,
    };
    (bus, handle)
}

impl MixBus {
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn stream_count(&self) -> usize {
        self.channels.len()
    }

    /// Render one block of the summed, limited output. Real-time safe:
    /// commands are drained first, then every channel mixes in, then the
    /// limiter runs over the sum.
    pub fn render(&mut self, out_l: &mut [Sample], out_r: &mut [Sample]) {
        debug_assert_eq!(out_l.len(), out_r.len());
        self.drain_commands();

        out_l.fill(0.0);
        out_r.fill(0.0);

        let Self {
            channels,
            notices,
            retired,
            ..
        } = self;

        let mut i = 0;
        while i < channels.len() {
            let outcome = channels[i].process_into(out_l, out_r, &mut |stream_id, reading| {
                let _ = notices.push(EngineNotice::Reading(ReadingUpdate { stream_id, reading }));
            });

            if outcome == ChannelOutcome::Ended {
                let channel = channels.swap_remove(i);
                let id = channel.id();
                let _ = notices.push(EngineNotice::StreamEnded(id));
                // Hand the box back for control-side deallocation. If the
                // ring is full the drop happens here, which is still
                // correct, just not ideal.
                let _ = retired.push(channel);
            } else {
                i += 1;
            }
        }

        self.limiter.process_block(out_l, out_r);
        self.gain_reduction_bits
            .store(self.limiter.gain_reduction_db().to_bits(), Ordering::Relaxed);
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                EngineCommand::AddStream(channel) => {
                    if self.channels.len() < MAX_STREAMS {
                        self.channels.push(channel);
                    } else {
                        let _ = self.retired.push(channel);
                    }
                }
                EngineCommand::RemoveStream(id) => {
                    if let Some(pos) = self.channels.iter().position(|c| c.id() == id) {
                        let channel = self.channels.swap_remove(pos);
                        let _ = self.retired.push(channel);
                    }
                }
                EngineCommand::SetLimiter(settings) => {
                    self.limiter.set_settings(settings);
                }
                EngineCommand::ResetMeasurements(id) => {
                    if let Some(channel) = self.channels.iter_mut().find(|c| c.id() == id) {
                        channel.reset_measurements();
                    }
                }
            }
        }
    }
}
