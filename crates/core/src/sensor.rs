use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChannelLevel, PanelId};

/// One synthetic measurement batch for a panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    pub panel_id: PanelId,
    pub timestamp: DateTime<Utc>,
    /// °C
    pub temperature: f64,
    /// Relative humidity, %.
    pub humidity: f64,
    /// Degrees from vertical.
    pub tilt: f64,
    /// Hz
    pub vibration: Option<f64>,
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SensorChannel {
    Temperature,
    Humidity,
    Tilt,
    Vibration,
}

/// Status colour of a single channel value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SensorLevel {
    Ideal,
    Acceptable,
    Warning,
    Critical,
}

/// Hard range with a narrower ideal band inside it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BandedRange {
    pub min: f64,
    pub max: f64,
    pub ideal_min: f64,
    pub ideal_max: f64,
}

impl BandedRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_ideal(&self, value: f64) -> bool {
        value >= self.ideal_min && value <= self.ideal_max
    }

    fn classify(&self, value: f64) -> SensorLevel {
        if self.is_ideal(value) {
            SensorLevel::Ideal
        } else if self.contains(value) {
            SensorLevel::Acceptable
        } else {
            SensorLevel::Critical
        }
    }
}

/// Upper-bounded channel: `warning` < `max`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Ceiling {
    pub warning: f64,
    pub max: f64,
}

impl Ceiling {
    fn classify(&self, value: f64) -> SensorLevel {
        if value > self.max {
            SensorLevel::Critical
        } else if value > self.warning {
            SensorLevel::Warning
        } else {
            SensorLevel::Ideal
        }
    }
}

/// Acceptable sensor ranges, shared by every panel and fixed once the monitor is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    pub temperature: BandedRange,
    pub humidity: BandedRange,
    pub tilt: Ceiling,
    pub vibration: Ceiling,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            temperature: BandedRange { min: 15.0, max: 40.0, ideal_min: 20.0, ideal_max: 25.0 },
            humidity: BandedRange { min: 40.0, max: 80.0, ideal_min: 50.0, ideal_max: 70.0 },
            tilt: Ceiling { warning: 30.0, max: 45.0 },
            vibration: Ceiling { warning: 70.0, max: 100.0 },
        }
    }
}

impl ThresholdConfig {
    pub fn classify_temperature(&self, value: f64) -> SensorLevel {
        self.temperature.classify(value)
    }

    pub fn classify_humidity(&self, value: f64) -> SensorLevel {
        self.humidity.classify(value)
    }

    pub fn classify_tilt(&self, value: f64) -> SensorLevel {
        self.tilt.classify(value)
    }

    pub fn classify_vibration(&self, value: f64) -> SensorLevel {
        self.vibration.classify(value)
    }

    /// Per-channel level of a reading; vibration is omitted when the reading has none.
    pub fn classify(&self, reading: &SensorReading) -> Vec<ChannelLevel> {
        let mut levels = vec![
            ChannelLevel {
                channel: SensorChannel::Temperature,
                level: self.classify_temperature(reading.temperature),
            },
            ChannelLevel {
                channel: SensorChannel::Humidity,
                level: self.classify_humidity(reading.humidity),
            },
            ChannelLevel { channel: SensorChannel::Tilt, level: self.classify_tilt(reading.tilt) },
        ];
        if let Some(vibration) = reading.vibration {
            levels.push(ChannelLevel {
                channel: SensorChannel::Vibration,
                level: self.classify_vibration(vibration),
            });
        }
        levels
    }
}
