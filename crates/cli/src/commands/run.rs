//! Single analysis cycle.

use anyhow::{bail, Result};
use clap::Args;
use market_sentinel_core::AppConfig;
use market_sentinel_orchestrator::{CycleOutcome, Monitor};
use std::sync::Arc;
use tracing::info;

use super::target_symbols;

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Symbol to analyse (e.g. "BTCUSDT"). Defaults to every configured symbol.
    #[arg(short, long)]
    pub symbol: Option<String>,
}

/// Runs one cycle per symbol and prints the analysis text.
///
/// # Errors
/// Returns an error if wiring fails or any symbol produced no result.
pub async fn run_once(args: RunArgs, config: Arc<AppConfig>) -> Result<()> {
    let monitor = Monitor::from_config(config.clone()).await?;
    let symbols = target_symbols(args.symbol.as_deref(), &config);

    let mut failed = Vec::new();
    for symbol in &symbols {
        info!(symbol = %symbol, "Running analysis cycle");
        match monitor.analyze_symbol(symbol).await? {
            Some(outcome) => print_outcome(symbol, &outcome),
            None => failed.push(symbol.as_str()),
        }
    }

    if !failed.is_empty() {
        bail!("analysis produced no result for: {}", failed.join(", "));
    }
    Ok(())
}

fn print_outcome(symbol: &str, outcome: &CycleOutcome) {
    let result = &outcome.result;
    println!("{}", "=".repeat(60));
    println!(
        "{} | {} | signals: {} | opportunity: {}",
        symbol,
        result.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        result.signal_count(),
        if result.has_opportunity() { "yes" } else { "no" }
    );
    if let Some(id) = outcome.analysis_id {
        println!("stored as analysis #{id}");
    }
    println!("{}", "-".repeat(60));
    println!("{}", result.text);
    if !outcome.missing.is_empty() {
        let missing: Vec<&str> = outcome.missing.iter().map(|k| k.as_str()).collect();
        println!("degraded factors: {}", missing.join(", "));
    }
    for error in &outcome.errors {
        println!("warning: {error}");
    }
}
