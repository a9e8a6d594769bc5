//! One-off outcome tracking pass.

use anyhow::{bail, Result};
use clap::Args;
use market_sentinel_core::AppConfig;
use market_sentinel_orchestrator::Monitor;
use std::sync::Arc;
use tracing::error;

use super::target_symbols;

/// Arguments for the update-signals command.
#[derive(Args, Debug, Clone)]
pub struct UpdateSignalsArgs {
    /// Symbol to update. Defaults to every configured symbol.
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Only evaluate outcomes entered within this many hours
    #[arg(long, default_value_t = 48)]
    pub hours: i64,
}

/// Evaluates open outcomes and closes the ones that resolved.
///
/// # Errors
/// Returns an error if wiring fails or any symbol could not be updated.
pub async fn run_update_signals(args: UpdateSignalsArgs, config: Arc<AppConfig>) -> Result<()> {
    if args.hours <= 0 {
        bail!("--hours must be positive");
    }

    let symbols = target_symbols(args.symbol.as_deref(), &config);
    let monitor = Monitor::from_config(config).await?;

    let mut failed = Vec::new();
    for symbol in &symbols {
        match monitor.update_outcomes_within(symbol, args.hours).await {
            Ok(update) => println!(
                "{symbol}: evaluated {} open outcomes, closed {}",
                update.evaluated, update.closed
            ),
            Err(e) => {
                error!(symbol = %symbol, "Outcome update failed: {:#}", e);
                failed.push(symbol.as_str());
            }
        }
    }

    if !failed.is_empty() {
        bail!("outcome update failed for: {}", failed.join(", "));
    }
    Ok(())
}
