//! lm-state: Persisted settings for LevelMix
//!
//! Only the auto-balance record and the limiter record survive a restart;
//! the stream set does not (live captures cannot be resumed across
//! processes).

mod settings;

pub use settings::{AutoBalanceSettings, BalancerSettings, SettingsStore};
