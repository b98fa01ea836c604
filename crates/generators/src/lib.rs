//! Reading generators: the source of synthetic sensor data for each tick.

use std::collections::{HashMap, VecDeque};
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use pm_core::{round1, Panel, PanelId, PanelStatus, SensorReading};

/// Produces the next reading for a panel. Called once per panel per tick, in fleet order.
pub trait ReadingGenerator: Send {
    fn generate(&mut self, panel: &Panel, at: DateTime<Utc>) -> SensorReading;
}

/// Channel bands a status draws from.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusProfile {
    pub temperature: RangeInclusive<f64>,
    pub humidity: RangeInclusive<f64>,
    pub tilt: RangeInclusive<f64>,
    pub vibration: RangeInclusive<f64>,
    pub pressure: Option<RangeInclusive<f64>>,
}

impl StatusProfile {
    pub fn for_status(status: PanelStatus) -> Self {
        match status {
            // Forms closed, steam-cured: tight climate, panel not moving.
            PanelStatus::Curing => Self {
                temperature: 20.0..=30.0,
                humidity: 55.0..=75.0,
                tilt: 0.0..=2.0,
                vibration: 0.0..=5.0,
                pressure: Some(1.0..=1.2),
            },
            PanelStatus::Preparing | PanelStatus::AwaitingDemolding => Self {
                temperature: 18.0..=32.0,
                humidity: 45.0..=75.0,
                tilt: 0.0..=3.0,
                vibration: 0.0..=10.0,
                pressure: None,
            },
            // Crane lift out of the form.
            PanelStatus::Demolding => Self {
                temperature: 12.0..=38.0,
                humidity: 35.0..=85.0,
                tilt: 10.0..=50.0,
                vibration: 20.0..=90.0,
                pressure: None,
            },
            PanelStatus::Transporting => Self {
                temperature: 10.0..=40.0,
                humidity: 35.0..=85.0,
                tilt: 0.0..=35.0,
                vibration: 30.0..=110.0,
                pressure: None,
            },
            PanelStatus::QualityControl
            | PanelStatus::Approved
            | PanelStatus::Rejected
            | PanelStatus::Storing
            | PanelStatus::Installed => Self {
                temperature: 16.0..=34.0,
                humidity: 42.0..=78.0,
                tilt: 0.0..=5.0,
                vibration: 0.0..=15.0,
                pressure: None,
            },
        }
    }
}

/// Status-conditioned uniform draws, rounded to one decimal.
pub struct RandomReadingGenerator {
    rng: StdRng,
}

impl RandomReadingGenerator {
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_os_rng() }
    }

    /// Reproducible stream, for demos and tests.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    fn draw(&mut self, range: &RangeInclusive<f64>) -> f64 {
        round1(self.rng.random_range(range.clone()))
    }
}

impl Default for RandomReadingGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl ReadingGenerator for RandomReadingGenerator {
    fn generate(&mut self, panel: &Panel, at: DateTime<Utc>) -> SensorReading {
        let profile = StatusProfile::for_status(panel.current_status);
        let temperature = self.draw(&profile.temperature);
        let humidity = self.draw(&profile.humidity);
        let tilt = self.draw(&profile.tilt);
        let vibration = self.draw(&profile.vibration);
        let pressure = profile.pressure.as_ref().map(|range| self.draw(range));
        SensorReading {
            panel_id: panel.id.clone(),
            timestamp: at,
            temperature,
            humidity,
            tilt,
            vibration: Some(vibration),
            pressure,
        }
    }
}

/// Channel values a scripted reading carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScriptedValues {
    pub temperature: f64,
    pub humidity: f64,
    pub tilt: f64,
    pub vibration: Option<f64>,
}

impl Default for ScriptedValues {
    /// Inside every ideal band.
    fn default() -> Self {
        Self { temperature: 22.0, humidity: 60.0, tilt: 1.0, vibration: Some(5.0) }
    }
}

/// Replays queued values per panel; panels with an empty queue get the nominal reading.
#[derive(Debug, Default)]
pub struct ScriptedReadingGenerator {
    queued: HashMap<PanelId, VecDeque<ScriptedValues>>,
    fallback: ScriptedValues,
}

impl ScriptedReadingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: ScriptedValues) -> Self {
        Self { queued: HashMap::new(), fallback }
    }

    pub fn push(&mut self, panel_id: impl Into<PanelId>, values: ScriptedValues) -> &mut Self {
        self.queued.entry(panel_id.into()).or_default().push_back(values);
        self
    }
}

impl ReadingGenerator for ScriptedReadingGenerator {
    fn generate(&mut self, panel: &Panel, at: DateTime<Utc>) -> SensorReading {
        let values = self
            .queued
            .get_mut(&panel.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.fallback);
        SensorReading {
            panel_id: panel.id.clone(),
            timestamp: at,
            temperature: values.temperature,
            humidity: values.humidity,
            tilt: values.tilt,
            vibration: values.vibration,
            pressure: None,
        }
    }
}
