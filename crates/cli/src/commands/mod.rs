//! Subcommand implementations.

pub mod accuracy;
pub mod export;
pub mod history;
pub mod monitor;
pub mod run;
pub mod stats;
pub mod update_signals;

pub use accuracy::{run_accuracy, AccuracyArgs};
pub use export::{default_output_path, run_export, ExportArgs};
pub use history::{run_history, HistoryArgs};
pub use monitor::{run_monitor, MonitorArgs};
pub use run::{run_once, RunArgs};
pub use stats::{run_stats, StatsArgs};
pub use update_signals::{run_update_signals, UpdateSignalsArgs};

use anyhow::Result;
use market_sentinel_core::AppConfig;
use market_sentinel_data::Database;

/// Opens the configured store for the read-only commands.
pub(crate) async fn open_database(config: &AppConfig) -> Result<Database> {
    Database::connect(&config.database.url, config.database.max_connections).await
}

/// Symbols named on the command line, or every configured symbol.
pub(crate) fn target_symbols(symbol: Option<&str>, config: &AppConfig) -> Vec<String> {
    match symbol {
        Some(s) => vec![s.to_uppercase()],
        None => config.symbols.clone(),
    }
}
