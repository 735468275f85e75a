//! Balancer settings persistence
//!
//! A single JSON file holds the auto-balance and limiter records. Loading
//! tolerates a missing or malformed file by falling back to defaults;
//! saving writes to a temp file and renames so a crash mid-write never
//! leaves a truncated settings file.

use lm_core::{LmError, LmResult, MAX_TARGET_LUFS, MIN_TARGET_LUFS};
use lm_dsp::dynamics::LimiterSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Auto-balance configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoBalanceSettings {
    /// Run a balance pass every 500 ms while true.
    pub enabled: bool,
    /// Integrated loudness all streams are driven toward, in LUFS.
    pub target_lufs: f64,
}

impl Default for AutoBalanceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            target_lufs: -14.0,
        }
    }
}

impl AutoBalanceSettings {
    /// Clamp the target into the allowed `[-60, 0]` band.
    pub fn clamped(mut self) -> Self {
        self.target_lufs = self.target_lufs.clamp(MIN_TARGET_LUFS, MAX_TARGET_LUFS);
        self
    }
}

/// Everything that survives a restart.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerSettings {
    pub auto_balance: AutoBalanceSettings,
    pub limiter: LimiterSettings,
}

impl BalancerSettings {
    pub fn clamped(self) -> Self {
        Self {
            auto_balance: self.auto_balance.clamped(),
            limiter: self.limiter.clamped(),
        }
    }
}

/// File-backed settings store.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults if the file is missing or
    /// unreadable. A malformed file is logged and ignored rather than
    /// propagated; settings must never stop the core from starting.
    pub fn load(&self) -> BalancerSettings {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<BalancerSettings>(&contents) {
                Ok(settings) => settings.clamped(),
                Err(e) => {
                    log::warn!(
                        "malformed settings file {}: {e}; using defaults",
                        self.path.display()
                    );
                    BalancerSettings::default()
                }
            },
            Err(_) => BalancerSettings::default(),
        }
    }

    /// Persist settings atomically (temp file + rename).
    pub fn save(&self, settings: &BalancerSettings) -> LmResult<()> {
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| LmError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = BalancerSettings::default();
        assert!(!s.auto_balance.enabled);
        assert_eq!(s.auto_balance.target_lufs, -14.0);
        assert!(s.limiter.enabled);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));

        let mut settings = BalancerSettings::default();
        settings.auto_balance.enabled = true;
        settings.auto_balance.target_lufs = -23.0;
        settings.limiter.threshold_db = -3.0;
        store.save(&settings).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nope.json"));
        assert_eq!(store.load(), BalancerSettings::default());
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let store = SettingsStore::new(path);
        assert_eq!(store.load(), BalancerSettings::default());
    }

    #[test]
    fn test_loaded_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"auto_balance":{"enabled":true,"target_lufs":-500.0},
                "limiter":{"enabled":true,"threshold_db":5.0,"knee_db":3.0,
                           "ratio":20.0,"attack_ms":3.0,"release_ms":250.0}}"#,
        )
        .unwrap();
        let store = SettingsStore::new(path);
        let loaded = store.load();
        assert_eq!(loaded.auto_balance.target_lufs, -60.0);
        assert_eq!(loaded.limiter.threshold_db, -0.1);
    }
}
