use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    ticks: AtomicU64,
    readings: AtomicU64,
    alerts_raised: AtomicU64,
    alerts_resolved: AtomicU64,
    status_changes: AtomicU64,
    unresolved_peak: AtomicU64,
}

impl MetricsRegistry {
    pub fn inc_ticks(&self, delta: u64) {
        self.inner.ticks.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_readings(&self, delta: u64) {
        self.inner.readings.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_alerts_raised(&self, delta: u64) {
        self.inner.alerts_raised.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_alerts_resolved(&self, delta: u64) {
        self.inner.alerts_resolved.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn inc_status_changes(&self, delta: u64) {
        self.inner.status_changes.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn record_unresolved_peak(&self, unresolved: u64) {
        self.inner.unresolved_peak.fetch_max(unresolved, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.inner.ticks.load(Ordering::Relaxed),
            readings: self.inner.readings.load(Ordering::Relaxed),
            alerts_raised: self.inner.alerts_raised.load(Ordering::Relaxed),
            alerts_resolved: self.inner.alerts_resolved.load(Ordering::Relaxed),
            status_changes: self.inner.status_changes.load(Ordering::Relaxed),
            unresolved_peak: self.inner.unresolved_peak.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub readings: u64,
    pub alerts_raised: u64,
    pub alerts_resolved: u64,
    pub status_changes: u64,
    pub unresolved_peak: u64,
}

impl MetricsSnapshot {
    pub fn to_json_line(&self, label: &str, elapsed: Option<Duration>) -> String {
        #[derive(Serialize)]
        struct Line<'a> {
            label: &'a str,
            #[serde(flatten)]
            snapshot: &'a MetricsSnapshot,
            elapsed_ms: Option<u128>,
        }

        let payload = Line { label, snapshot: self, elapsed_ms: elapsed.map(|d| d.as_millis()) };
        serde_json::to_string(&payload).unwrap_or_else(|_| String::from("{}"))
    }
}

pub struct EpochTimer {
    start: Instant,
}

impl EpochTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let metrics = MetricsRegistry::default();
        let other = metrics.clone();
        metrics.inc_readings(3);
        other.inc_readings(2);
        other.inc_alerts_raised(1);
        metrics.record_unresolved_peak(4);
        metrics.record_unresolved_peak(2);

        let snap = metrics.snapshot();
        assert_eq!(snap.readings, 5);
        assert_eq!(snap.alerts_raised, 1);
        assert_eq!(snap.unresolved_peak, 4);
    }

    #[test]
    fn json_line_is_flat() {
        let metrics = MetricsRegistry::default();
        metrics.inc_ticks(2);
        let line = metrics.snapshot().to_json_line("final", Some(Duration::from_millis(1500)));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["label"], "final");
        assert_eq!(value["ticks"], 2);
        assert_eq!(value["elapsed_ms"], 1500);
    }
}
