use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use pm_core::{MonitorConfig, TransitionPolicy};
use pm_generators::{RandomReadingGenerator, ReadingGenerator};
use pm_runtime::metrics::EpochTimer;
use pm_runtime::{init_tracing, PanelMonitor};
use pm_views::{PanelDashboard, TopKConfig};

/// Run the panel monitor on a live timer and stream readings as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "monitor")]
struct Args {
    /// JSON config file; unset fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    interval_secs: Option<u64>,
    /// Stop after this many timer ticks.
    #[arg(long, default_value_t = 5)]
    ticks: u64,
    /// Seed for reproducible readings.
    #[arg(long)]
    seed: Option<u64>,
    /// Reject status changes outside the production flow.
    #[arg(long)]
    strict: bool,
    #[arg(long)]
    vibration_alerts: bool,
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    if let Some(secs) = args.interval_secs {
        config.reading_interval_secs = secs;
    }
    if args.strict {
        config.transition_policy = TransitionPolicy::Strict;
    }
    if args.vibration_alerts {
        config.alert_policy.vibration_alerts = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(&args)?;

    let generator: Box<dyn ReadingGenerator> = match args.seed {
        Some(seed) => Box::new(RandomReadingGenerator::seeded(seed)),
        None => Box::new(RandomReadingGenerator::from_entropy()),
    };
    let monitor = PanelMonitor::new(config, pm_scenarios::seed_fleet(Utc::now()), generator)?;
    let panels = monitor.panels().len() as u64;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let stream = monitor.subscribe_readings(move |reading| {
        let _ = tx.send(reading.clone());
    });
    let dashboard = PanelDashboard::attach(monitor.clone())?;
    info!(ticks = args.ticks, panels, "monitor running");

    let timer = EpochTimer::start();
    let expected = args.ticks * panels;
    let mut received = 0u64;
    while received < expected {
        tokio::select! {
            Some(reading) = rx.recv() => {
                received += 1;
                println!("{}", serde_json::to_string(&reading)?);
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted");
                break;
            }
        }
    }

    for (panel_id, alert) in dashboard.unresolved_alerts() {
        info!(%panel_id, kind = ?alert.kind, severity = ?alert.severity, "unresolved alert");
    }
    for (panel_id, temperature) in dashboard.hottest_panels(&TopKConfig { k: 3 }) {
        info!(%panel_id, temperature, "hottest panel");
    }

    stream.unsubscribe();
    monitor.shutdown().await;
    dashboard.detach();
    let snapshot = monitor.metrics().snapshot();
    println!("{}", snapshot.to_json_line("monitor", Some(timer.elapsed())));
    Ok(())
}
