//! Accuracy report for past opportunity calls.

use anyhow::Result;
use clap::Args;
use market_sentinel_core::AppConfig;
use market_sentinel_orchestrator::Monitor;
use std::sync::Arc;

/// Arguments for the accuracy command.
#[derive(Args, Debug, Clone)]
pub struct AccuracyArgs {
    /// Look-back window in days (defaults to report.accuracy_window_days)
    #[arg(short, long)]
    pub days: Option<i64>,

    /// Restrict to one symbol. If not provided, covers every symbol.
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Prints the accuracy report.
///
/// # Errors
/// Returns an error if the store cannot be opened or queried.
pub async fn run_accuracy(args: AccuracyArgs, config: Arc<AppConfig>) -> Result<()> {
    let days = args.days.unwrap_or(config.report.accuracy_window_days);
    let symbol = args.symbol.map(|s| s.to_uppercase());

    let monitor = Monitor::from_config(config).await?;
    let report = monitor.accuracy_report(symbol.as_deref(), days).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render());
    }
    Ok(())
}
