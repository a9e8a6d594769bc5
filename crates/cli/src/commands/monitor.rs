//! Long-running scheduled monitor.

use anyhow::Result;
use clap::Args;
use market_sentinel_core::AppConfig;
use market_sentinel_orchestrator::Monitor;
use market_sentinel_scheduler::{JobSpec, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

/// Arguments for the monitor command.
#[derive(Args, Debug, Clone)]
pub struct MonitorArgs {
    /// Analysis interval in minutes (overrides scheduler.analysis_interval_mins)
    #[arg(short, long)]
    pub interval: Option<u64>,
}

/// Builds the job table for a monitor.
///
/// Analysis runs immediately and then every `analysis_interval`; outcome
/// tracking waits one tracking interval before its first run.
///
/// # Errors
/// Returns an error if a job cannot be registered.
pub async fn build_scheduler(monitor: Arc<Monitor>, analysis_interval: Duration) -> Result<Scheduler> {
    let scheduler = Scheduler::new();
    let config = monitor.config().clone();

    let m = monitor.clone();
    scheduler
        .register(
            JobSpec::new("analysis", analysis_interval).immediately(),
            move || {
                let m = m.clone();
                async move { m.analyze_all().await.map(|_| ()) }
            },
        )
        .await?;

    let m = monitor.clone();
    scheduler
        .register(
            JobSpec::new("outcome-tracking", config.scheduler.tracking_interval()),
            move || {
                let m = m.clone();
                async move {
                    let update = m.update_all_outcomes().await?;
                    info!(evaluated = update.evaluated, closed = update.closed, "Outcome tracking pass");
                    Ok(())
                }
            },
        )
        .await?;

    if config.alert.daily_report {
        let m = monitor;
        scheduler
            .register(JobSpec::new("daily-report", DAILY), move || {
                let m = m.clone();
                async move { m.send_daily_report().await }
            })
            .await?;
    }

    Ok(scheduler)
}

/// Runs the scheduled monitor until Ctrl+C.
///
/// # Errors
/// Returns an error if wiring fails or the scheduler cannot start.
pub async fn run_monitor(args: MonitorArgs, config: Arc<AppConfig>) -> Result<()> {
    let analysis_interval = match args.interval {
        Some(0) => anyhow::bail!("--interval must be at least 1 minute"),
        Some(mins) => Duration::from_secs(mins * 60),
        None => config.scheduler.analysis_interval(),
    };

    info!(
        symbols = ?config.symbols,
        analysis_mins = analysis_interval.as_secs() / 60,
        tracking_mins = config.scheduler.tracking_interval_mins,
        daily_report = config.alert.daily_report,
        "Starting market monitor"
    );

    let monitor = Arc::new(Monitor::from_config(config).await?);
    let scheduler = build_scheduler(monitor, analysis_interval).await?;
    scheduler.run_until_ctrl_c().await
}
