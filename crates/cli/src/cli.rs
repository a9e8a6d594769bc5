use anyhow::Result;
use clap::{Parser, Subcommand};
use market_sentinel_core::{AppConfig, ConfigLoader};
use std::path::Path;

use crate::commands::{
    AccuracyArgs, ExportArgs, HistoryArgs, MonitorArgs, RunArgs, StatsArgs, UpdateSignalsArgs,
};

#[derive(Parser, Debug)]
#[command(name = "market-sentinel")]
#[command(about = "Crypto market signal monitor with LLM-assisted analysis", long_about = None)]
pub struct Cli {
    /// Config profile (e.g. "prod" for config/Config.prod.toml) or a path to a TOML file
    #[arg(short, long, global = true, env = "SENTINEL_CONFIG")]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one analysis cycle and exit
    Run(RunArgs),
    /// Run analysis and outcome tracking on a schedule until Ctrl+C
    Monitor(MonitorArgs),
    /// Show recent analyses for a symbol
    History(HistoryArgs),
    /// Show opportunity and signal statistics
    Stats(StatsArgs),
    /// Export analysis history to CSV
    Export(ExportArgs),
    /// Show the accuracy of past opportunity calls
    Accuracy(AccuracyArgs),
    /// Re-evaluate open outcomes against the current price
    UpdateSignals(UpdateSignalsArgs),
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects `debug`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

/// Resolves the `--config` flag.
///
/// A value that names a file (or ends in `.toml`) is loaded as a path, any
/// other value is treated as a profile overlay on `config/Config.toml`.
///
/// # Errors
/// Returns an error if the configuration cannot be parsed or is invalid.
pub fn load_config(config: Option<&str>) -> Result<AppConfig> {
    match config {
        None => ConfigLoader::load(),
        Some(value) if is_config_path(value) => ConfigLoader::load_from(value),
        Some(profile) => ConfigLoader::load_with_profile(profile),
    }
}

fn is_config_path(value: &str) -> bool {
    let path = Path::new(value);
    path.extension().is_some_and(|ext| ext == "toml") || path.is_file()
}
