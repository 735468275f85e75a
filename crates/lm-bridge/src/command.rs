//! Command surface
//!
//! Tagged request/response variants for hosts that talk to the core over
//! a channel instead of calling [`crate::Coordinator`] methods directly.
//! Payloads and semantics follow the external interface contract; the
//! transport (function call, message port, IPC) is the host's business.

use lm_core::{StreamId, StreamStatus};
use lm_dsp::dynamics::LimiterSettings;
use lm_dsp::loudness::LoudnessReading;
use lm_engine::CaptureSource;
use lm_state::AutoBalanceSettings;

/// Partial limiter settings: absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LimiterUpdate {
    pub enabled: Option<bool>,
    pub threshold_db: Option<f64>,
    pub knee_db: Option<f64>,
    pub ratio: Option<f64>,
    pub attack_ms: Option<f64>,
    pub release_ms: Option<f64>,
}

impl LimiterUpdate {
    /// Merge this update over `current` (fields are clamped later, by the
    /// limiter itself).
    pub fn apply_to(self, mut current: LimiterSettings) -> LimiterSettings {
        if let Some(enabled) = self.enabled {
            current.enabled = enabled;
        }
        if let Some(threshold_db) = self.threshold_db {
            current.threshold_db = threshold_db;
        }
        if let Some(knee_db) = self.knee_db {
            current.knee_db = knee_db;
        }
        if let Some(ratio) = self.ratio {
            current.ratio = ratio;
        }
        if let Some(attack_ms) = self.attack_ms {
            current.attack_ms = attack_ms;
        }
        if let Some(release_ms) = self.release_ms {
            current.release_ms = release_ms;
        }
        current
    }
}

/// Caller → core commands.
pub enum Command {
    RegisterStream {
        stream_id: StreamId,
        label: String,
        source: Box<dyn CaptureSource>,
    },
    UnregisterStream {
        stream_id: StreamId,
    },
    SetGain {
        stream_id: StreamId,
        gain_db: f64,
    },
    SetMaxGain {
        stream_id: StreamId,
        max_gain_db: f64,
    },
    ResetMeasurements {
        stream_id: StreamId,
    },
    GetStreams,
    ToggleSolo {
        stream_id: StreamId,
    },
    ClearSolo,
    SetAutoBalance {
        enabled: Option<bool>,
        target_lufs: Option<f64>,
    },
    BalanceNow {
        target_lufs: Option<f64>,
    },
    SetLimiter(LimiterUpdate),
    GetLimiter,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::RegisterStream { stream_id, label, .. } => f
                .debug_struct("RegisterStream")
                .field("stream_id", stream_id)
                .field("label", label)
                .finish_non_exhaustive(),
            Command::UnregisterStream { stream_id } => {
                write!(f, "UnregisterStream({stream_id})")
            }
            Command::SetGain { stream_id, gain_db } => {
                write!(f, "SetGain({stream_id}, {gain_db} dB)")
            }
            Command::SetMaxGain {
                stream_id,
                max_gain_db,
            } => write!(f, "SetMaxGain({stream_id}, {max_gain_db} dB)"),
            Command::ResetMeasurements { stream_id } => {
                write!(f, "ResetMeasurements({stream_id})")
            }
            Command::GetStreams => write!(f, "GetStreams"),
            Command::ToggleSolo { stream_id } => write!(f, "ToggleSolo({stream_id})"),
            Command::ClearSolo => write!(f, "ClearSolo"),
            Command::SetAutoBalance {
                enabled,
                target_lufs,
            } => write!(f, "SetAutoBalance({enabled:?}, {target_lufs:?})"),
            Command::BalanceNow { target_lufs } => write!(f, "BalanceNow({target_lufs:?})"),
            Command::SetLimiter(update) => write!(f, "SetLimiter({update:?})"),
            Command::GetLimiter => write!(f, "GetLimiter"),
        }
    }
}

/// Point-in-time view of one stream, serializable for host UIs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StreamSnapshot {
    pub stream_id: StreamId,
    pub label: String,
    pub status: StreamStatus,
    pub gain_db: f64,
    pub max_gain_db: f64,
    pub solo: bool,
    pub reading: LoudnessReading,
}

/// Core → caller responses.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Response {
    Ok,
    Gain {
        applied_gain_db: f64,
    },
    MaxGain {
        applied_max_gain_db: f64,
        applied_gain_db: f64,
    },
    Streams {
        streams: Vec<StreamSnapshot>,
        solo_stream: Option<StreamId>,
    },
    Solo {
        solo_stream: Option<StreamId>,
    },
    AutoBalance(AutoBalanceSettings),
    Limiter(LimiterSettings),
}
