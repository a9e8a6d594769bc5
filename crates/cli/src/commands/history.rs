//! Recent analysis history.

use anyhow::Result;
use clap::Args;
use market_sentinel_core::AppConfig;
use market_sentinel_data::AnalysisRecord;
use std::sync::Arc;

use super::open_database;

/// Arguments for the history command.
#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// Symbol to show (e.g. "BTCUSDT")
    #[arg(short, long, default_value = "BTCUSDT")]
    pub symbol: String,

    /// Number of analyses to show, newest first
    #[arg(short, long, default_value_t = 10)]
    pub limit: i64,
}

/// Prints the most recent analyses for a symbol.
///
/// # Errors
/// Returns an error if the store cannot be opened or queried.
pub async fn run_history(args: HistoryArgs, config: Arc<AppConfig>) -> Result<()> {
    let database = open_database(&config).await?;
    let symbol = args.symbol.to_uppercase();
    let records = database
        .repositories()
        .analyses
        .get_recent(&symbol, args.limit)
        .await?;

    if records.is_empty() {
        println!("No analyses recorded for {symbol}");
        return Ok(());
    }

    println!("Recent analyses for {symbol} ({} shown)", records.len());
    println!("{}", "=".repeat(96));
    println!(
        "{:>6}  {:<19}  {:>12}  {:>8}  {:<5}  {:<8}  {:>5}  signals",
        "id", "time (UTC)", "price", "change", "opp", "trend", "conf"
    );
    println!("{}", "-".repeat(96));
    for record in &records {
        println!("{}", history_line(record));
    }
    database.close().await;
    Ok(())
}

fn history_line(record: &AnalysisRecord) -> String {
    let signals = record
        .triggered_signals
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "{:>6}  {:<19}  {:>12}  {:>8}  {:<5}  {:<8}  {:>5}  {}",
        record.id,
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        record
            .current_price
            .map_or_else(|| "-".to_string(), |p| p.to_string()),
        record
            .price_change_pct
            .map_or_else(|| "-".to_string(), |p| format!("{p:+.2}%")),
        if record.has_opportunity { "yes" } else { "no" },
        record.trend.map_or("-", |t| t.as_str()),
        record
            .confidence
            .map_or_else(|| "-".to_string(), |c| format!("{:.0}%", c * 100.0)),
        if signals.is_empty() { "-" } else { signals.as_str() },
    )
}
