//! Event fan-out
//!
//! Fire-and-forget notifications from the core to any number of
//! observers. Delivery must never block the control thread: each
//! subscriber gets a bounded channel and slow subscribers simply lose
//! events.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use lm_core::{CaptureErrorKind, StreamId};
use lm_dsp::dynamics::LimiterSettings;
use lm_dsp::loudness::LoudnessReading;

/// Capacity of each subscriber's event queue.
const EVENT_QUEUE_SIZE: usize = 1024;

/// Core → observer events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Event {
    /// ~10 Hz per capturing stream.
    LoudnessUpdate {
        stream_id: StreamId,
        reading: LoudnessReading,
    },
    CaptureStarted {
        stream_id: StreamId,
        sample_rate: f64,
    },
    CaptureStopped {
        stream_id: StreamId,
    },
    CaptureError {
        stream_id: StreamId,
        kind: CaptureErrorKind,
    },
    StreamEnded {
        stream_id: StreamId,
        reason: String,
    },
    GainUpdated {
        stream_id: StreamId,
        gain_db: f64,
    },
    LimiterUpdated {
        limiter: LimiterSettings,
    },
    MeasurementsReset {
        stream_id: StreamId,
    },
    SoloChanged {
        solo_stream: Option<StreamId>,
    },
}

/// Multi-subscriber event dispatch.
#[derive(Default)]
pub struct EventHub {
    senders: Vec<Sender<Event>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Events published after this call are delivered
    /// until the receiver is dropped.
    pub fn subscribe(&mut self) -> Receiver<Event> {
        let (tx, rx) = bounded(EVENT_QUEUE_SIZE);
        self.senders.push(tx);
        rx
    }

    /// Publish to all live subscribers. Full queues drop the event for
    /// that subscriber; disconnected subscribers are pruned.
    pub fn publish(&mut self, event: Event) {
        self.senders.retain(|tx| {
            !matches!(tx.try_send(event.clone()), Err(TrySendError::Disconnected(_)))
        });
    }
}
