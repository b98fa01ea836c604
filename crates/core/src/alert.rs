use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sensor::{SensorReading, ThresholdConfig};
use crate::OperatorId;

/// Temperatures outside this band escalate a temperature alert to critical.
pub const CRITICAL_TEMPERATURE_LOW: f64 = 10.0;
pub const CRITICAL_TEMPERATURE_HIGH: f64 = 35.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Temperature,
    Humidity,
    Tilt,
    Vibration,
    Time,
    Quality,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A threshold violation raised from a reading. `resolved_by`/`resolved_at` are set exactly
/// when `resolved` is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_by: Option<OperatorId>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            message: message.into(),
            timestamp,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
        }
    }

    /// Marks the alert resolved. `at` is clamped so it never precedes the alert itself.
    pub fn resolve(&mut self, by: impl Into<OperatorId>, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_by = Some(by.into());
        self.resolved_at = Some(at.max(self.timestamp));
    }
}

/// Which optional checks run on top of the temperature/humidity/tilt contract.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlertPolicy {
    /// Vibration bounds are configured but historically never alerted on; off by default.
    pub vibration_alerts: bool,
}

/// Checks a reading against the thresholds and returns the alerts it raises, in channel order
/// temperature, humidity, tilt, then vibration when enabled.
pub fn evaluate_reading(
    thresholds: &ThresholdConfig,
    policy: &AlertPolicy,
    reading: &SensorReading,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let temperature = reading.temperature;
    if !thresholds.temperature.contains(temperature) {
        let severity = if temperature < CRITICAL_TEMPERATURE_LOW
            || temperature > CRITICAL_TEMPERATURE_HIGH
        {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(Alert::new(
            AlertKind::Temperature,
            severity,
            format!(
                "Temperature {temperature:.1}°C outside range {:.1}-{:.1}°C",
                thresholds.temperature.min, thresholds.temperature.max
            ),
            now,
        ));
    }

    let humidity = reading.humidity;
    if !thresholds.humidity.contains(humidity) {
        alerts.push(Alert::new(
            AlertKind::Humidity,
            AlertSeverity::Warning,
            format!(
                "Humidity {humidity:.1}% outside range {:.1}-{:.1}%",
                thresholds.humidity.min, thresholds.humidity.max
            ),
            now,
        ));
    }

    let tilt = reading.tilt;
    if tilt > thresholds.tilt.warning {
        let severity = if tilt > thresholds.tilt.max {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        alerts.push(Alert::new(
            AlertKind::Tilt,
            severity,
            format!("Tilt {tilt:.1}° above {:.1}°", thresholds.tilt.warning),
            now,
        ));
    }

    if policy.vibration_alerts {
        if let Some(vibration) = reading.vibration.filter(|v| *v > thresholds.vibration.warning) {
            let severity = if vibration > thresholds.vibration.max {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            alerts.push(Alert::new(
                AlertKind::Vibration,
                severity,
                format!("Vibration {vibration:.1}Hz above {:.1}Hz", thresholds.vibration.warning),
                now,
            ));
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature: f64, humidity: f64, tilt: f64, vibration: Option<f64>) -> SensorReading {
        SensorReading {
            panel_id: "PL001".into(),
            timestamp: Utc::now(),
            temperature,
            humidity,
            tilt,
            vibration,
            pressure: None,
        }
    }

    fn kinds(alerts: &[Alert]) -> Vec<(AlertKind, AlertSeverity)> {
        alerts.iter().map(|a| (a.kind, a.severity)).collect()
    }

    fn eval(r: &SensorReading) -> Vec<Alert> {
        evaluate_reading(&ThresholdConfig::default(), &AlertPolicy::default(), r, Utc::now())
    }

    #[test]
    fn nominal_reading_raises_nothing() {
        assert!(eval(&reading(22.0, 60.0, 2.0, Some(10.0))).is_empty());
    }

    #[test]
    fn range_edges_are_inclusive() {
        assert!(eval(&reading(15.0, 40.0, 30.0, None)).is_empty());
        assert!(eval(&reading(40.0, 80.0, 30.0, None)).is_empty());
    }

    #[test]
    fn temperature_severity_escalates_outside_ten_to_thirty_five() {
        let cases = [
            (14.9, AlertSeverity::Warning),
            (10.0, AlertSeverity::Warning),
            (9.9, AlertSeverity::Critical),
            (40.1, AlertSeverity::Critical),
        ];
        for (temp, severity) in cases {
            let alerts = eval(&reading(temp, 60.0, 0.0, None));
            assert_eq!(kinds(&alerts), vec![(AlertKind::Temperature, severity)], "temp {temp}");
        }
    }

    #[test]
    fn humidity_is_always_a_warning() {
        for humidity in [10.0, 39.9, 80.1, 99.0] {
            let alerts = eval(&reading(22.0, humidity, 0.0, None));
            assert_eq!(kinds(&alerts), vec![(AlertKind::Humidity, AlertSeverity::Warning)]);
        }
    }

    #[test]
    fn tilt_warning_then_critical() {
        assert_eq!(
            kinds(&eval(&reading(22.0, 60.0, 30.1, None))),
            vec![(AlertKind::Tilt, AlertSeverity::Warning)]
        );
        assert_eq!(
            kinds(&eval(&reading(22.0, 60.0, 45.0, None))),
            vec![(AlertKind::Tilt, AlertSeverity::Warning)]
        );
        assert_eq!(
            kinds(&eval(&reading(22.0, 60.0, 45.1, None))),
            vec![(AlertKind::Tilt, AlertSeverity::Critical)]
        );
    }

    #[test]
    fn multiple_alerts_keep_channel_order() {
        let alerts = eval(&reading(5.0, 90.0, 50.0, Some(150.0)));
        assert_eq!(
            kinds(&alerts),
            vec![
                (AlertKind::Temperature, AlertSeverity::Critical),
                (AlertKind::Humidity, AlertSeverity::Warning),
                (AlertKind::Tilt, AlertSeverity::Critical),
            ]
        );
        assert!(alerts.iter().all(|a| !a.resolved && a.resolved_at.is_none()));
    }

    #[test]
    fn vibration_only_alerts_when_enabled() {
        let r = reading(22.0, 60.0, 0.0, Some(85.0));
        assert!(eval(&r).is_empty());

        let policy = AlertPolicy { vibration_alerts: true };
        let alerts = evaluate_reading(&ThresholdConfig::default(), &policy, &r, Utc::now());
        assert_eq!(kinds(&alerts), vec![(AlertKind::Vibration, AlertSeverity::Warning)]);

        let loud = reading(22.0, 60.0, 0.0, Some(101.0));
        let alerts = evaluate_reading(&ThresholdConfig::default(), &policy, &loud, Utc::now());
        assert_eq!(kinds(&alerts), vec![(AlertKind::Vibration, AlertSeverity::Critical)]);
    }

    #[test]
    fn resolve_sets_all_resolution_fields() {
        let mut alert = Alert::new(AlertKind::Tilt, AlertSeverity::Warning, "tilt", Utc::now());
        let earlier = alert.timestamp - chrono::Duration::seconds(5);
        alert.resolve("op-7", earlier);
        assert!(alert.resolved);
        assert_eq!(alert.resolved_by.as_deref(), Some("op-7"));
        assert_eq!(alert.resolved_at, Some(alert.timestamp));
    }

    #[test]
    fn alert_ids_are_unique() {
        let now = Utc::now();
        let a = Alert::new(AlertKind::Quality, AlertSeverity::Info, "a", now);
        let b = Alert::new(AlertKind::Quality, AlertSeverity::Info, "b", now);
        assert_ne!(a.id, b.id);
    }
}
