//! Error types for LevelMix

use crate::StreamId;
use thiserror::Error;

/// Reason a capture handle could not be obtained or stopped working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CaptureErrorKind {
    /// The host did not deliver a capture handle before its deadline.
    Timeout,
    /// The host refused to capture this source.
    Denied,
    /// The source exists but cannot currently be captured.
    Unavailable,
    /// The capture handle failed after starting.
    Failed,
}

impl std::fmt::Display for CaptureErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureErrorKind::Timeout => write!(f, "timeout"),
            CaptureErrorKind::Denied => write!(f, "denied"),
            CaptureErrorKind::Unavailable => write!(f, "unavailable"),
            CaptureErrorKind::Failed => write!(f, "failed"),
        }
    }
}

/// Core error type
#[derive(Error, Debug)]
pub enum LmError {
    #[error("stream {0} is already registered")]
    AlreadyRegistered(StreamId),

    #[error("unknown stream {0}")]
    UnknownStream(StreamId),

    #[error("capture failed ({kind}): {reason}")]
    CaptureFailed {
        kind: CaptureErrorKind,
        reason: String,
    },

    #[error("stream gone: {reason}")]
    StreamGone { reason: String },

    #[error("invalid parameter {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type LmResult<T> = Result<T, LmError>;
