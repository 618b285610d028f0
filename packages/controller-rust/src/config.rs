use std::path::{Path, PathBuf};

use anyhow::Context;
use routing_core::types::{ConnectionFormat, RampType, Volume};
use serde::{Deserialize, Serialize};

use crate::policy::config::PolicyConfig;

/// Controller-level configuration.
///
/// Controls request timeouts, rollback behaviour and the defaults applied to
/// unbound action parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Deadline for one routing-engine request in milliseconds.
    pub default_action_timeout_ms: u64,
    /// Interval between deadline checks in milliseconds.
    pub timeout_check_interval_ms: u64,
    /// Whether a failed job undoes the steps that already completed.
    pub rollback_on_failure: bool,
    /// Upper bound for a bound `timeout` parameter in milliseconds.
    pub max_action_timeout_ms: u64,
    /// Volume applied to a muted sink.
    pub mute_volume: Volume,
    /// Accepted range of `volume` parameters for volume and limit actions.
    pub min_volume: Volume,
    pub max_volume: Volume,
    pub default_ramp_type: RampType,
    pub default_ramp_time_ms: u16,
    pub default_connection_format: ConnectionFormat,
    /// Where the per-class volume snapshot is read at startup and written at
    /// shutdown. `None` disables persistence.
    pub volume_store_path: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_action_timeout_ms: 5_000,
            timeout_check_interval_ms: 20,
            rollback_on_failure: false,
            max_action_timeout_ms: 60_000,
            mute_volume: -3_000,
            min_volume: -3_000,
            max_volume: 0,
            default_ramp_type: RampType::Linear,
            default_ramp_time_ms: 200,
            default_connection_format: ConnectionFormat::Stereo,
            volume_store_path: None,
        }
    }
}

/// Everything the binary reads from its settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub controller: ControllerConfig,
    pub policy: PolicyConfig,
}

impl Settings {
    /// Reads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid settings
    /// JSON.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error if `text` is not valid settings JSON.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_documented_values() {
        let config = ControllerConfig::default();
        assert_eq!(config.default_action_timeout_ms, 5_000);
        assert_eq!(config.timeout_check_interval_ms, 20);
        assert!(!config.rollback_on_failure);
        assert_eq!(config.max_action_timeout_ms, 60_000);
        assert_eq!(config.mute_volume, -3_000);
        assert_eq!((config.min_volume, config.max_volume), (-3_000, 0));
        assert_eq!(config.default_ramp_type, RampType::Linear);
        assert_eq!(config.default_ramp_time_ms, 200);
        assert_eq!(config.default_connection_format, ConnectionFormat::Stereo);
        assert!(config.volume_store_path.is_none());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings =
            Settings::from_json(r#"{"controller":{"rollbackOnFailure":true,"muteVolume":-2000}}"#)
                .unwrap();
        assert!(settings.controller.rollback_on_failure);
        assert_eq!(settings.controller.mute_volume, -2_000);
        assert_eq!(settings.controller.default_action_timeout_ms, 5_000);
        assert!(settings.policy.classes.is_empty());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Settings::load(Path::new("/nonexistent/settings.json")).unwrap_err();
        assert!(err.to_string().contains("reading settings"));
    }
}
