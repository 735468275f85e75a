//! Stream identity and status

use crate::CaptureErrorKind;

/// Opaque identifier for a registered audio stream.
///
/// The value is assigned by the host (for a browser host this is the tab
/// id); the core only requires uniqueness.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct StreamId(pub u64);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Externally visible stream status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StreamStatus {
    /// Audio is flowing and readings are being produced.
    Capturing,
    /// The stream exists but is not delivering audio.
    Stopped,
    /// Capture failed; the kind says why.
    Error(CaptureErrorKind),
}
