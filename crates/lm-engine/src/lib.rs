//! lm-engine: Audio-side processing graph for LevelMix
//!
//! One [`StreamChannel`](stream::StreamChannel) per captured source feeds
//! two branches: the analysis tap (K-weighting → block loudness engine,
//! pre-fader, never audible) and the playback path (smoothed gain into
//! the shared mix). The [`MixBus`](mixer::MixBus) sums all channels,
//! runs the shared limiter, and is the only code that touches audio
//! buffers — it is designed to live on the host's real-time thread:
//! no allocation, no locks, no logging once running.
//!
//! Control-plane code talks to the bus exclusively through lock-free
//! rings ([`mixer::EngineHandle`]) and per-stream atomic gain slots
//! ([`param_smoother::GainSlot`]).

pub mod capture;
pub mod mixer;
pub mod param_smoother;
pub mod stream;

pub use capture::{CaptureSource, CaptureStatus, SilenceSource, SineSource};
pub use mixer::{mix_bus, EngineCommand, EngineHandle, EngineNotice, MixBus, ReadingUpdate};
pub use param_smoother::{GainSlot, ParamSmoother};
pub use stream::{StreamChannel, StreamProcessor, StreamState};
