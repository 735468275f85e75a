//! Sample type definitions

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;
