//! CSV export of analysis history.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use market_sentinel_core::AppConfig;
use market_sentinel_data::CsvExporter;
use std::path::PathBuf;
use std::sync::Arc;

use super::open_database;

/// Arguments for the export command.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Symbol to export (e.g. "BTCUSDT")
    #[arg(short, long, default_value = "BTCUSDT")]
    pub symbol: String,

    /// Maximum number of analyses to export
    #[arg(short, long, default_value_t = 100)]
    pub limit: i64,

    /// Output CSV path. Defaults to data/export_{symbol}_{timestamp}.csv
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[must_use]
pub fn default_output_path(symbol: &str, now: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!(
        "data/export_{}_{}.csv",
        symbol,
        now.format("%Y%m%d_%H%M%S")
    ))
}

/// Writes the most recent analyses for a symbol to CSV.
///
/// # Errors
/// Returns an error if the store cannot be read or the file cannot be written.
pub async fn run_export(args: ExportArgs, config: Arc<AppConfig>) -> Result<()> {
    let database = open_database(&config).await?;
    let symbol = args.symbol.to_uppercase();
    let records = database
        .repositories()
        .analyses
        .get_recent(&symbol, args.limit)
        .await?;
    database.close().await;

    if records.is_empty() {
        println!("No analyses recorded for {symbol}; nothing exported");
        return Ok(());
    }

    let path = args
        .output
        .unwrap_or_else(|| default_output_path(&symbol, Utc::now()));
    let rows = CsvExporter::export(&records, &path)?;
    println!("Exported {rows} analyses to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_output_path() {
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            default_output_path("ETHUSDT", now),
            PathBuf::from("data/export_ETHUSDT_20250309_140507.csv")
        );
    }
}
