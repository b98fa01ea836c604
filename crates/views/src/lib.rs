//! Consumer-side views over a running [`PanelMonitor`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use pm_core::{Alert, ChannelLevel, Panel, PanelId, PanelStatus, SensorReading};
use pm_runtime::{MonitorError, PanelMonitor, Subscription};

/// Readings kept by a dashboard, most recent first.
pub const READING_BUFFER_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopKConfig {
    pub k: usize,
}

impl Default for TopKConfig {
    fn default() -> Self {
        Self { k: 10 }
    }
}

#[derive(Default)]
struct DashboardState {
    panels: Vec<Panel>,
    readings: VecDeque<SensorReading>,
}

impl DashboardState {
    fn record_reading(&mut self, reading: &SensorReading) {
        self.readings.push_front(reading.clone());
        self.readings.truncate(READING_BUFFER_CAPACITY);
        if let Some(panel) = self.panels.iter_mut().find(|p| p.id == reading.panel_id) {
            panel.last_reading = Some(reading.clone());
        }
    }

    fn record_alert(&mut self, panel_id: &str, alert: &Alert) {
        let Some(panel) = self.panels.iter_mut().find(|p| p.id == panel_id) else {
            return;
        };
        if panel.alerts.iter().all(|known| known.id != alert.id) {
            panel.alerts.push(alert.clone());
        }
    }

    fn replace(&mut self, fresh: Panel) {
        match self.panels.iter_mut().find(|p| p.id == fresh.id) {
            Some(slot) => *slot = fresh,
            None => self.panels.push(fresh),
        }
    }
}

fn lock(state: &Mutex<DashboardState>) -> MutexGuard<'_, DashboardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a local, push-updated copy of the fleet for display code.
///
/// Attaching subscribes to readings and alerts and starts the monitor; detaching undoes both.
pub struct PanelDashboard {
    monitor: PanelMonitor,
    state: Arc<Mutex<DashboardState>>,
    subscriptions: Vec<Subscription>,
}

impl PanelDashboard {
    pub fn attach(monitor: PanelMonitor) -> Result<Self, MonitorError> {
        let state = Arc::new(Mutex::new(DashboardState::default()));

        let sink = Arc::clone(&state);
        let readings = monitor.subscribe_readings(move |reading| lock(&sink).record_reading(reading));
        let sink = Arc::clone(&state);
        let alerts =
            monitor.subscribe_alerts(move |panel_id, alert| lock(&sink).record_alert(panel_id, alert));

        // Snapshot after subscribing, with deliveries held off until it is in place. Any
        // alert delivered earlier was dropped by `record_alert` but is in the snapshot.
        {
            let mut guard = lock(&state);
            for panel in monitor.panels() {
                guard.replace(panel);
            }
        }

        if let Err(e) = monitor.start() {
            readings.unsubscribe();
            alerts.unsubscribe();
            return Err(e);
        }
        debug!("dashboard attached");
        Ok(Self { monitor, state, subscriptions: vec![readings, alerts] })
    }

    pub fn detach(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        self.monitor.stop();
        debug!("dashboard detached");
    }

    pub fn monitor(&self) -> &PanelMonitor {
        &self.monitor
    }

    pub fn panels(&self) -> Vec<Panel> {
        lock(&self.state).panels.clone()
    }

    pub fn panel(&self, id: &str) -> Option<Panel> {
        lock(&self.state).panels.iter().find(|p| p.id == id).cloned()
    }

    /// Up to `limit` of the buffered readings for one panel, most recent first.
    pub fn recent_readings(&self, panel_id: &str, limit: usize) -> Vec<SensorReading> {
        lock(&self.state)
            .readings
            .iter()
            .filter(|r| r.panel_id == panel_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn readings(&self) -> Vec<SensorReading> {
        lock(&self.state).readings.iter().cloned().collect()
    }

    pub fn unresolved_alerts(&self) -> Vec<(PanelId, Alert)> {
        lock(&self.state)
            .panels
            .iter()
            .flat_map(|p| p.unresolved_alerts().map(|a| (p.id.clone(), a.clone())))
            .collect()
    }

    /// Status colour of each channel of the panel's last reading.
    pub fn channel_levels(&self, panel_id: &str) -> Option<Vec<ChannelLevel>> {
        let reading = self.panel(panel_id)?.last_reading?;
        Some(self.monitor.config().thresholds.classify(&reading))
    }

    /// Panels with the highest last temperature.
    pub fn hottest_panels(&self, cfg: &TopKConfig) -> Vec<(PanelId, f64)> {
        let mut hot: Vec<(PanelId, f64)> = lock(&self.state)
            .panels
            .iter()
            .filter_map(|p| p.last_reading.as_ref().map(|r| (p.id.clone(), r.temperature)))
            .collect();
        hot.sort_by(|a, b| b.1.total_cmp(&a.1));
        hot.truncate(cfg.k);
        hot
    }

    pub fn update_panel_status(
        &self,
        panel_id: &str,
        status: PanelStatus,
        notes: Option<&str>,
    ) -> Result<(), MonitorError> {
        self.monitor.update_panel_status(panel_id, status, notes)?;
        self.refresh(panel_id);
        Ok(())
    }

    pub fn resolve_alert(
        &self,
        panel_id: &str,
        alert_id: Uuid,
        resolved_by: &str,
    ) -> Result<(), MonitorError> {
        self.monitor.resolve_alert(panel_id, alert_id, resolved_by)?;
        self.refresh(panel_id);
        Ok(())
    }

    fn refresh(&self, panel_id: &str) {
        if let Some(fresh) = self.monitor.panel(panel_id) {
            lock(&self.state).replace(fresh);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pm_core::{AlertKind, MonitorConfig, SensorChannel, SensorLevel};
    use pm_generators::{ScriptedReadingGenerator, ScriptedValues};

    use super::*;

    fn monitor(generator: ScriptedReadingGenerator) -> PanelMonitor {
        PanelMonitor::new(
            MonitorConfig::default(),
            pm_scenarios::seed_fleet(Utc::now()),
            Box::new(generator),
        )
        .unwrap()
    }

    #[test]
    fn attach_outside_runtime_leaves_no_subscribers() {
        let m = monitor(ScriptedReadingGenerator::new());
        assert!(matches!(PanelDashboard::attach(m.clone()), Err(MonitorError::NoRuntime)));
        // No dashboard callback should be left behind to receive this tick.
        m.tick();
    }

    #[tokio::test]
    async fn attach_starts_and_detach_stops() {
        let m = monitor(ScriptedReadingGenerator::new());
        let dashboard = PanelDashboard::attach(m.clone()).unwrap();
        assert!(m.is_running());
        assert_eq!(dashboard.panels().len(), 3);
        dashboard.detach();
        assert!(!m.is_running());
    }

    #[tokio::test]
    async fn reading_buffer_is_newest_first_and_bounded() {
        let m = monitor(ScriptedReadingGenerator::new());
        let dashboard = PanelDashboard::attach(m.clone()).unwrap();
        for _ in 0..40 {
            m.tick();
        }
        let readings = dashboard.readings();
        assert_eq!(readings.len(), READING_BUFFER_CAPACITY);
        assert_eq!(readings[0].panel_id, "PL003");
        assert!(readings.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        let pl001 = dashboard.recent_readings("PL001", 5);
        assert_eq!(pl001.len(), 5);
        assert!(pl001.iter().all(|r| r.panel_id == "PL001"));
        dashboard.detach();
    }

    #[tokio::test]
    async fn alerts_merge_and_resolve_through_the_dashboard() {
        let mut generator = ScriptedReadingGenerator::new();
        generator.push("PL002", ScriptedValues { tilt: 46.0, ..ScriptedValues::default() });
        let m = monitor(generator);
        let dashboard = PanelDashboard::attach(m.clone()).unwrap();
        m.tick();

        let unresolved = dashboard.unresolved_alerts();
        assert_eq!(unresolved.len(), 1);
        let (panel_id, alert) = &unresolved[0];
        assert_eq!(panel_id, "PL002");
        assert_eq!(alert.kind, AlertKind::Tilt);

        let levels = dashboard.channel_levels("PL002").unwrap();
        let tilt = levels.iter().find(|l| l.channel == SensorChannel::Tilt).unwrap();
        assert_eq!(tilt.level, SensorLevel::Critical);

        assert!(dashboard.resolve_alert("PL002", Uuid::new_v4(), "X").is_err());
        dashboard.resolve_alert("PL002", alert.id, "joão").unwrap();
        assert!(dashboard.unresolved_alerts().is_empty());
        assert!(dashboard.panel("PL002").unwrap().alerts[0].resolved);
        dashboard.detach();
    }

    #[tokio::test]
    async fn status_updates_refresh_local_copy() {
        let m = monitor(ScriptedReadingGenerator::new());
        let dashboard = PanelDashboard::attach(m.clone()).unwrap();
        dashboard
            .update_panel_status("PL003", PanelStatus::Rejected, Some("fissura"))
            .unwrap();
        assert_eq!(dashboard.panel("PL003").unwrap().current_status, PanelStatus::Rejected);
        assert!(dashboard.update_panel_status("PL404", PanelStatus::Rejected, None).is_err());
        dashboard.detach();
    }

    #[tokio::test]
    async fn attach_during_concurrent_ticks_keeps_every_alert() {
        let generator = ScriptedReadingGenerator::with_fallback(ScriptedValues {
            tilt: 35.0,
            ..ScriptedValues::default()
        });
        let m = monitor(generator);
        let ticker = {
            let m = m.clone();
            std::thread::spawn(move || {
                for _ in 0..300 {
                    m.tick();
                }
            })
        };
        let dashboard = PanelDashboard::attach(m.clone()).unwrap();
        ticker.join().unwrap();

        for panel in m.panels() {
            let local = dashboard.panel(&panel.id).unwrap();
            let ids = |p: &Panel| p.alerts.iter().map(|a| a.id).collect::<Vec<_>>();
            assert_eq!(ids(&local), ids(&panel), "{}", panel.id);
            assert_eq!(panel.alerts.len(), 300);
        }
        dashboard.detach();
    }

    #[tokio::test]
    async fn hottest_panels_orders_by_last_temperature() {
        let mut generator = ScriptedReadingGenerator::new();
        generator
            .push("PL001", ScriptedValues { temperature: 24.0, ..ScriptedValues::default() })
            .push("PL002", ScriptedValues { temperature: 31.0, ..ScriptedValues::default() })
            .push("PL003", ScriptedValues { temperature: 19.5, ..ScriptedValues::default() });
        let m = monitor(generator);
        let dashboard = PanelDashboard::attach(m.clone()).unwrap();
        m.tick();

        let hot = dashboard.hottest_panels(&TopKConfig { k: 2 });
        assert_eq!(hot, vec![("PL002".to_string(), 31.0), ("PL001".to_string(), 24.0)]);
        dashboard.detach();
    }
}
