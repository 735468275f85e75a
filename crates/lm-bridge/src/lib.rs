//! lm-bridge: Control plane for LevelMix
//!
//! The [`Coordinator`] owns the stream registry, the solo and auto-balance
//! state, and the shared limiter settings, and drives the audio-side
//! [`lm_engine::MixBus`] through its lock-free handle. Hosts talk to it
//! either through typed methods or through the tagged [`Command`] /
//! [`Response`] surface carried over any point-to-point channel, and
//! observe it through fire-and-forget [`Event`]s.
//!
//! [`ControlLoop`] puts the coordinator on its own thread with the fixed
//! cadences: reading drain, 500 ms balance passes, 5 s stale-stream
//! cleanup.

mod command;
mod control_loop;
mod coordinator;
mod event;

pub use command::{Command, LimiterUpdate, Response, StreamSnapshot};
pub use control_loop::{ControlHandle, ControlLoop};
pub use coordinator::{Coordinator, ReadingCache, StreamDirectory, MAX_STREAMS};
pub use event::{Event, EventHub};
