//! The panel monitor engine.
//!
//! [`PanelMonitor`] owns the fleet, synthesizes a reading per panel on every tick, raises
//! threshold alerts, and fans readings and alerts out to subscribers. It is a cheap handle
//! around shared state; clones observe and mutate the same fleet.
//!
//! Subscriber callbacks run on whichever thread drives the tick (the tokio timer task, or
//! the caller of [`PanelMonitor::tick`]) and never with the fleet or subscriber locks held, so
//! they may call back into the monitor. Ticks are serialized end to end, delivery included;
//! a callback must not call [`PanelMonitor::tick`] itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pm_core::{
    evaluate_reading, Alert, MonitorConfig, Panel, PanelId, PanelStatus, SensorReading,
    TransitionPolicy,
};
use pm_generators::{RandomReadingGenerator, ReadingGenerator};

use crate::error::MonitorError;
use crate::metrics::MetricsRegistry;
use crate::subscription::SubscriberList;

type ReadingCallback = dyn Fn(&SensorReading) + Send + Sync;
type AlertCallback = dyn Fn(&str, &Alert) + Send + Sync;

/// Something a tick produced, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Alert { panel_id: PanelId, alert: Alert },
    Reading(SensorReading),
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub events: Vec<MonitorEvent>,
}

impl TickReport {
    pub fn readings(&self) -> impl Iterator<Item = &SensorReading> {
        self.events.iter().filter_map(|event| match event {
            MonitorEvent::Reading(reading) => Some(reading),
            MonitorEvent::Alert { .. } => None,
        })
    }

    pub fn alerts(&self) -> impl Iterator<Item = (&str, &Alert)> {
        self.events.iter().filter_map(|event| match event {
            MonitorEvent::Alert { panel_id, alert } => Some((panel_id.as_str(), alert)),
            MonitorEvent::Reading(_) => None,
        })
    }
}

struct Fleet {
    panels: Vec<Panel>,
    index: HashMap<PanelId, usize>,
    generator: Box<dyn ReadingGenerator>,
    last_tick: Option<DateTime<Utc>>,
}

impl Fleet {
    fn insert(&mut self, panel: Panel) -> Result<(), MonitorError> {
        if self.index.contains_key(&panel.id) {
            return Err(MonitorError::DuplicatePanel(panel.id));
        }
        self.index.insert(panel.id.clone(), self.panels.len());
        self.panels.push(panel);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<&Panel> {
        self.index.get(id).map(|&i| &self.panels[i])
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Panel> {
        self.index.get(id).map(|&i| &mut self.panels[i])
    }

    fn unresolved(&self) -> usize {
        self.panels.iter().map(|p| p.unresolved_alerts().count()).sum()
    }
}

struct Driver {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    config: MonitorConfig,
    fleet: Mutex<Fleet>,
    reading_subs: Mutex<SubscriberList<ReadingCallback>>,
    alert_subs: Mutex<SubscriberList<AlertCallback>>,
    driver: Mutex<Option<Driver>>,
    /// Held for a whole tick so concurrent ticks deliver in timestamp order.
    tick_lock: Mutex<()>,
    metrics: MetricsRegistry,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(driver) = lock(&self.driver).take() {
            driver.cancel.cancel();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct PanelMonitor {
    inner: Arc<Inner>,
}

impl PanelMonitor {
    pub fn new(
        config: MonitorConfig,
        panels: Vec<Panel>,
        generator: Box<dyn ReadingGenerator>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let mut fleet = Fleet {
            panels: Vec::with_capacity(panels.len()),
            index: HashMap::new(),
            generator,
            last_tick: None,
        };
        for panel in panels {
            fleet.insert(panel)?;
        }
        info!(
            panels = fleet.panels.len(),
            interval_secs = config.reading_interval_secs,
            "panel monitor initialised"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                fleet: Mutex::new(fleet),
                reading_subs: Mutex::new(SubscriberList::new()),
                alert_subs: Mutex::new(SubscriberList::new()),
                driver: Mutex::new(None),
                tick_lock: Mutex::new(()),
                metrics: MetricsRegistry::default(),
            }),
        })
    }

    /// The demonstration fleet with random, status-conditioned readings.
    pub fn seeded(config: MonitorConfig) -> Result<Self, MonitorError> {
        Self::new(
            config,
            pm_scenarios::seed_fleet(Utc::now()),
            Box::new(RandomReadingGenerator::from_entropy()),
        )
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> MetricsRegistry {
        self.inner.metrics.clone()
    }

    pub fn add_panel(&self, panel: Panel) -> Result<(), MonitorError> {
        let id = panel.id.clone();
        lock(&self.inner.fleet).insert(panel)?;
        debug!(panel_id = %id, "panel registered");
        Ok(())
    }

    /// Snapshot of every panel, in registration order.
    pub fn panels(&self) -> Vec<Panel> {
        lock(&self.inner.fleet).panels.clone()
    }

    pub fn panel(&self, id: &str) -> Option<Panel> {
        lock(&self.inner.fleet).get(id).cloned()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.driver).is_some()
    }

    /// Starts the reading timer. The first tick fires one interval from now. Calling this
    /// while already running does nothing.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut driver = lock(&self.inner.driver);
        if driver.is_some() {
            debug!("panel monitor already running");
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let period = self.inner.config.reading_interval();
        let cancel = CancellationToken::new();
        let task = handle.spawn(run_timer(Arc::downgrade(&self.inner), period, cancel.clone()));
        *driver = Some(Driver { cancel, task });
        info!(interval_secs = period.as_secs(), "panel monitor started");
        Ok(())
    }

    /// Cancels the timer. A tick already in progress finishes; panel state is kept.
    pub fn stop(&self) {
        if let Some(driver) = lock(&self.inner.driver).take() {
            driver.cancel.cancel();
            info!("panel monitor stopped");
        }
    }

    /// Like [`stop`](Self::stop), but waits for the timer task to exit.
    pub async fn shutdown(&self) {
        let driver = lock(&self.inner.driver).take();
        if let Some(driver) = driver {
            driver.cancel.cancel();
            if let Err(e) = driver.task.await {
                warn!(error = %e, "panel monitor timer task ended abnormally");
            }
            info!("panel monitor shut down");
        }
    }

    pub fn subscribe_readings<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SensorReading) + Send + Sync + 'static,
    {
        let id = lock(&self.inner.reading_subs).insert(Arc::new(callback));
        Subscription { id, topic: Topic::Readings, monitor: Arc::downgrade(&self.inner) }
    }

    /// Alert callbacks receive the owning panel id with each alert.
    pub fn subscribe_alerts<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&str, &Alert) + Send + Sync + 'static,
    {
        let id = lock(&self.inner.alert_subs).insert(Arc::new(callback));
        Subscription { id, topic: Topic::Alerts, monitor: Arc::downgrade(&self.inner) }
    }

    /// One pass over the fleet: a new reading per panel, alert evaluation, then delivery.
    ///
    /// Per panel, its alerts are delivered before its reading; panels go in registration
    /// order and subscribers in subscription order. Concurrent callers are serialized, so a
    /// panel's readings reach subscribers in timestamp order.
    pub fn tick(&self) -> TickReport {
        let _serial = lock(&self.inner.tick_lock);
        let config = &self.inner.config;
        let mut events = Vec::new();
        let (at, unresolved) = {
            let mut fleet = lock(&self.inner.fleet);
            // Wall-clock steps backwards must not reorder a panel's readings.
            let at = fleet.last_tick.map_or_else(Utc::now, |last| Utc::now().max(last));
            fleet.last_tick = Some(at);
            let Fleet { panels, generator, .. } = &mut *fleet;
            for panel in panels.iter_mut() {
                let reading = generator.generate(panel, at);
                for alert in evaluate_reading(&config.thresholds, &config.alert_policy, &reading, at) {
                    warn!(
                        panel_id = %panel.id,
                        kind = ?alert.kind,
                        severity = ?alert.severity,
                        detail = %alert.message,
                        "alert raised"
                    );
                    panel.alerts.push(alert.clone());
                    events.push(MonitorEvent::Alert { panel_id: panel.id.clone(), alert });
                }
                debug!(
                    panel_id = %panel.id,
                    temperature = reading.temperature,
                    humidity = reading.humidity,
                    tilt = reading.tilt,
                    "reading generated"
                );
                panel.last_reading = Some(reading.clone());
                events.push(MonitorEvent::Reading(reading));
            }
            (at, fleet.unresolved())
        };

        let report = TickReport { at, events };
        let metrics = &self.inner.metrics;
        metrics.inc_ticks(1);
        metrics.inc_readings(report.readings().count() as u64);
        metrics.inc_alerts_raised(report.alerts().count() as u64);
        metrics.record_unresolved_peak(unresolved as u64);

        for event in &report.events {
            self.deliver(event);
        }
        report
    }

    fn deliver(&self, event: &MonitorEvent) {
        match event {
            MonitorEvent::Reading(reading) => {
                let callbacks = lock(&self.inner.reading_subs).snapshot();
                for callback in callbacks {
                    callback(reading);
                }
            }
            MonitorEvent::Alert { panel_id, alert } => {
                let callbacks = lock(&self.inner.alert_subs).snapshot();
                for callback in callbacks {
                    callback(panel_id, alert);
                }
            }
        }
    }

    /// Closes the panel's open stage (attaching `notes`) and opens one for `status`.
    pub fn update_panel_status(
        &self,
        panel_id: &str,
        status: PanelStatus,
        notes: Option<&str>,
    ) -> Result<(), MonitorError> {
        let mut fleet = lock(&self.inner.fleet);
        let panel = fleet
            .get_mut(panel_id)
            .ok_or_else(|| MonitorError::PanelNotFound(panel_id.to_string()))?;
        let from = panel.current_status;
        if self.inner.config.transition_policy == TransitionPolicy::Strict
            && !from.can_transition_to(status)
        {
            return Err(MonitorError::InvalidTransition {
                panel_id: panel_id.to_string(),
                from,
                to: status,
            });
        }
        panel.advance_to(status, notes, Utc::now());
        drop(fleet);

        self.inner.metrics.inc_status_changes(1);
        info!(panel_id, %from, to = %status, "panel status updated");
        Ok(())
    }

    pub fn resolve_alert(
        &self,
        panel_id: &str,
        alert_id: Uuid,
        resolved_by: &str,
    ) -> Result<(), MonitorError> {
        let mut fleet = lock(&self.inner.fleet);
        let panel = fleet
            .get_mut(panel_id)
            .ok_or_else(|| MonitorError::PanelNotFound(panel_id.to_string()))?;
        let alert = panel.alert_mut(alert_id).ok_or_else(|| MonitorError::AlertNotFound {
            panel_id: panel_id.to_string(),
            alert_id,
        })?;
        if alert.resolved {
            return Err(MonitorError::AlertAlreadyResolved {
                panel_id: panel_id.to_string(),
                alert_id,
            });
        }
        alert.resolve(resolved_by, Utc::now());
        drop(fleet);

        self.inner.metrics.inc_alerts_resolved(1);
        info!(panel_id, %alert_id, resolved_by, "alert resolved");
        Ok(())
    }
}

async fn run_timer(monitor: Weak<Inner>, period: Duration, cancel: CancellationToken) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = monitor.upgrade() else { break };
                let monitor = PanelMonitor { inner };
                monitor.tick();
            }
        }
    }
    debug!("panel monitor timer exited");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    Readings,
    Alerts,
}

/// Registration handle returned by the `subscribe_*` methods.
#[must_use = "dropping a Subscription keeps the callback registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    topic: Topic,
    monitor: Weak<Inner>,
}

impl Subscription {
    /// Removes exactly this registration. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.monitor.upgrade() else {
            return false;
        };
        match self.topic {
            Topic::Readings => lock(&inner.reading_subs).remove(self.id),
            Topic::Alerts => lock(&inner.alert_subs).remove(self.id),
        }
    }
}
