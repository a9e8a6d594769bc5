use clap::Parser;
use market_sentinel_cli::commands::{
    run_accuracy, run_export, run_history, run_monitor, run_once, run_stats, run_update_signals,
};
use market_sentinel_cli::{init_tracing, load_config, Cli, Commands};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Arc::new(load_config(cli.config.as_deref())?);

    match cli.command {
        Commands::Run(args) => run_once(args, config).await,
        Commands::Monitor(args) => run_monitor(args, config).await,
        Commands::History(args) => run_history(args, config).await,
        Commands::Stats(args) => run_stats(args, config).await,
        Commands::Export(args) => run_export(args, config).await,
        Commands::Accuracy(args) => run_accuracy(args, config).await,
        Commands::UpdateSignals(args) => run_update_signals(args, config).await,
    }
}
