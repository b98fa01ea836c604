use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

use differential_dataflow::input::InputSession;
use differential_dataflow::operators::reduce::Reduce;
use timely::dataflow::operators::probe::Handle as ProbeHandle;

use pm_core::{AlertKind, MonitorConfig, PanelId};
use pm_generators::RandomReadingGenerator;
use pm_runtime::metrics::EpochTimer;
use pm_runtime::{init_tracing, start_runtime, PanelMonitor};
use pm_views::TopKConfig;

/// Tick the demonstration fleet and maintain incremental views over its readings and alerts.
#[derive(Parser, Debug, Clone)]
#[command(name = "fleet_dataflow")]
struct Args {
    #[arg(long, default_value_t = 12)]
    epochs: u64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 3)]
    top_k: usize,
    /// Alerts are resolved this many epochs after they are raised.
    #[arg(long, default_value_t = 2)]
    resolve_after: u64,
    /// Every N epochs each panel moves one step along the production flow.
    #[arg(long, default_value_t = 4)]
    advance_every: u64,
}

struct OpenAlert {
    raised_epoch: u64,
    panel_id: PanelId,
    alert_id: Uuid,
    kind: AlertKind,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    info!(?args, "fleet_dataflow starting");
    start_runtime(1, move |_index, worker| {
        let monitor = match PanelMonitor::new(
            MonitorConfig::default(),
            pm_scenarios::seed_fleet(Utc::now()),
            Box::new(RandomReadingGenerator::seeded(args.seed)),
        ) {
            Ok(monitor) => monitor,
            Err(e) => {
                error!(error = %e, "failed to build monitor");
                return;
            }
        };

        // (panel, temperature in tenths of a degree)
        let mut temps_input: InputSession<_, (PanelId, i64), isize> = InputSession::new();
        // (panel, kind) per unresolved alert
        let mut alerts_input: InputSession<_, (PanelId, AlertKind), isize> = InputSession::new();
        let mut probe = ProbeHandle::new();

        let top_k = TopKConfig { k: args.top_k };
        worker.dataflow::<u64, _, _>(|scope| {
            let temps = temps_input.to_collection(scope);
            let alerts = alerts_input.to_collection(scope);

            let k = top_k.k;
            let hottest = temps
                .map(|(panel, temp)| ((), (temp, panel)))
                .reduce(move |_unit, inputs, output| {
                    let mut vals: Vec<((i64, PanelId), isize)> =
                        inputs.iter().map(|(val, cnt)| ((*val).clone(), *cnt)).collect();
                    vals.sort_by(|a, b| b.0 .0.cmp(&a.0 .0));
                    for (val, _) in vals.into_iter().take(k) {
                        output.push((val, 1isize));
                    }
                });
            hottest
                .inspect(|x| info!(?x, "hottest panels"))
                .probe_with(&mut probe);

            let open_per_panel = alerts
                .map(|(panel, _kind)| (panel, ()))
                .reduce(|_panel, inputs, output| {
                    let total: isize = inputs.iter().map(|(_, cnt)| *cnt).sum();
                    output.push((total as i64, 1isize));
                });
            open_per_panel
                .inspect(|x| info!(?x, "open alerts per panel"))
                .probe_with(&mut probe);

            let open_per_kind = alerts
                .map(|(_panel, kind)| (kind, ()))
                .reduce(|_kind, inputs, output| {
                    let total: isize = inputs.iter().map(|(_, cnt)| *cnt).sum();
                    output.push((total as i64, 1isize));
                });
            open_per_kind
                .inspect(|x| info!(?x, "open alerts per kind"))
                .probe_with(&mut probe);
        });

        let mut last_temp: HashMap<PanelId, i64> = HashMap::new();
        let mut open: VecDeque<OpenAlert> = VecDeque::new();
        let metrics = monitor.metrics();

        for epoch in 0..args.epochs {
            let epoch_timer = EpochTimer::start();

            let report = monitor.tick();
            for reading in report.readings() {
                let temp = (reading.temperature * 10.0).round() as i64;
                if let Some(prev) = last_temp.insert(reading.panel_id.clone(), temp) {
                    temps_input.remove((reading.panel_id.clone(), prev));
                }
                temps_input.insert((reading.panel_id.clone(), temp));
            }
            for (panel_id, alert) in report.alerts() {
                alerts_input.insert((panel_id.to_string(), alert.kind));
                open.push_back(OpenAlert {
                    raised_epoch: epoch,
                    panel_id: panel_id.to_string(),
                    alert_id: alert.id,
                    kind: alert.kind,
                });
            }

            while open.front().is_some_and(|a| a.raised_epoch + args.resolve_after <= epoch) {
                let Some(stale) = open.pop_front() else { break };
                match monitor.resolve_alert(&stale.panel_id, stale.alert_id, "fleet_dataflow") {
                    Ok(()) => alerts_input.remove((stale.panel_id, stale.kind)),
                    Err(e) => error!(error = %e, "resolve failed"),
                }
            }

            if args.advance_every > 0 && (epoch + 1) % args.advance_every == 0 {
                for panel in monitor.panels() {
                    let Some(&next) = panel.current_status.next_stages().first() else {
                        continue;
                    };
                    if let Err(e) = monitor.update_panel_status(&panel.id, next, None) {
                        error!(error = %e, "status update failed");
                    }
                }
            }

            temps_input.advance_to(epoch + 1);
            alerts_input.advance_to(epoch + 1);
            temps_input.flush();
            alerts_input.flush();

            while probe.less_than(temps_input.time()) {
                worker.step();
            }

            let snapshot = metrics.snapshot();
            info!(
                epoch,
                duration_ms = epoch_timer.elapsed().as_millis(),
                readings = snapshot.readings,
                alerts_raised = snapshot.alerts_raised,
                alerts_resolved = snapshot.alerts_resolved,
                status_changes = snapshot.status_changes,
                "epoch complete"
            );
        }

        let final_snapshot = metrics.snapshot();
        info!(?final_snapshot, "final metrics summary");
    })
}
