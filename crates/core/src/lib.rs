//! Core types for the precast panel monitor.

use serde::{Deserialize, Serialize};

pub mod alert;
pub mod config;
pub mod panel;
pub mod sensor;

pub use alert::{evaluate_reading, Alert, AlertKind, AlertPolicy, AlertSeverity};
pub use config::{ConfigError, MonitorConfig, TransitionPolicy};
pub use panel::{Panel, PanelStatus, PanelType, StageHistoryEntry, StageState};
pub use sensor::{SensorChannel, SensorLevel, SensorReading, ThresholdConfig};

pub type PanelId = String;
pub type ProjectId = String;
pub type OperatorId = String;

/// Rounds to one decimal place, the precision readings are reported with.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Channel/level pair, used when the status colour of a reading is reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelLevel {
    pub channel: SensorChannel,
    pub level: SensorLevel,
}

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("unknown panel status: {0}")]
    UnknownStatus(String),
    #[error("stage history of panel {panel_id} has {open} open entries")]
    MultipleOpenStages { panel_id: PanelId, open: usize },
    #[error("stage history entry {index} of panel {panel_id} has an end timestamp inconsistent with its state")]
    InconsistentStageEnd { panel_id: PanelId, index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round1_keeps_one_decimal() {
        assert_eq!(round1(21.349), 21.3);
        assert_eq!(round1(21.36), 21.4);
        assert_eq!(round1(-0.04), -0.0);
    }
}
