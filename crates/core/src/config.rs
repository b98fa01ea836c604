//! Monitor configuration, loaded from JSON with every field optional.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alert::AlertPolicy;
use crate::sensor::ThresholdConfig;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("reading interval must be at least one second")]
    InvalidInterval,
}

/// Whether status updates must follow the forward production flow.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Any status may follow any other.
    #[default]
    Permissive,
    /// Only `PanelStatus::next_stages` are accepted.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub reading_interval_secs: u64,
    pub thresholds: ThresholdConfig,
    pub alert_policy: AlertPolicy,
    pub transition_policy: TransitionPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            reading_interval_secs: 30,
            thresholds: ThresholdConfig::default(),
            alert_policy: AlertPolicy::default(),
            transition_policy: TransitionPolicy::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: MonitorConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reading_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        Ok(())
    }

    pub fn reading_interval(&self) -> Duration {
        Duration::from_secs(self.reading_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = MonitorConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, MonitorConfig::default());
        assert_eq!(cfg.reading_interval(), Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = MonitorConfig::from_json_str(
            r#"{
                "reading_interval_secs": 5,
                "alert_policy": { "vibration_alerts": true },
                "transition_policy": "strict"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.reading_interval_secs, 5);
        assert!(cfg.alert_policy.vibration_alerts);
        assert_eq!(cfg.transition_policy, TransitionPolicy::Strict);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = MonitorConfig::from_json_str(r#"{"reading_interval_secs": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInterval));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = MonitorConfig::from_path("/nonexistent/monitor.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/monitor.json"));
    }
}
