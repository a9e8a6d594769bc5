use clap::Parser;
use market_sentinel_cli::commands::monitor::build_scheduler;
use market_sentinel_cli::commands::{run_export, run_history, ExportArgs, HistoryArgs};
use market_sentinel_cli::{Cli, Commands};
use market_sentinel_core::AppConfig;
use market_sentinel_orchestrator::Monitor;
use std::sync::Arc;
use std::time::Duration;

fn temp_config(dir: &tempfile::TempDir, daily_report: bool) -> Arc<AppConfig> {
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", dir.path().join("sentinel.db").display());
    config.alert.daily_report = daily_report;
    Arc::new(config)
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_run_with_global_flags() {
    let cli = Cli::try_parse_from([
        "market-sentinel",
        "run",
        "--symbol",
        "ETHUSDT",
        "--verbose",
        "--config",
        "prod",
    ])
    .unwrap();

    assert!(cli.verbose);
    assert_eq!(cli.config.as_deref(), Some("prod"));
    match cli.command {
        Commands::Run(args) => assert_eq!(args.symbol.as_deref(), Some("ETHUSDT")),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_parse_defaults() {
    let cli = Cli::try_parse_from(["market-sentinel", "history"]).unwrap();
    match cli.command {
        Commands::History(args) => {
            assert_eq!(args.symbol, "BTCUSDT");
            assert_eq!(args.limit, 10);
        }
        other => panic!("unexpected command: {other:?}"),
    }

    let cli = Cli::try_parse_from(["market-sentinel", "update-signals"]).unwrap();
    match cli.command {
        Commands::UpdateSignals(args) => {
            assert!(args.symbol.is_none());
            assert_eq!(args.hours, 48);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_parse_monitor_interval_and_export_output() {
    let cli = Cli::try_parse_from(["market-sentinel", "monitor", "--interval", "5"]).unwrap();
    assert!(matches!(cli.command, Commands::Monitor(ref a) if a.interval == Some(5)));

    let cli = Cli::try_parse_from(["market-sentinel", "export", "-o", "out.csv", "-l", "20"])
        .unwrap();
    match cli.command {
        Commands::Export(args) => {
            assert_eq!(args.limit, 20);
            assert_eq!(args.output.unwrap().to_str(), Some("out.csv"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["market-sentinel", "backtest"]).is_err());
}

// ========== Command Tests ==========

#[tokio::test]
async fn test_read_commands_on_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = temp_config(&dir, false);
    let output = dir.path().join("export.csv");

    run_history(
        HistoryArgs {
            symbol: "btcusdt".to_string(),
            limit: 5,
        },
        config.clone(),
    )
    .await
    .unwrap();

    run_export(
        ExportArgs {
            symbol: "BTCUSDT".to_string(),
            limit: 5,
            output: Some(output.clone()),
        },
        config,
    )
    .await
    .unwrap();

    assert!(!output.exists());
}

#[tokio::test]
async fn test_scheduler_jobs_follow_config() {
    let dir = tempfile::tempdir().unwrap();

    let monitor = Arc::new(Monitor::from_config(temp_config(&dir, false)).await.unwrap());
    let scheduler = build_scheduler(monitor, Duration::from_secs(300)).await.unwrap();
    assert_eq!(scheduler.job_names().await, vec!["analysis", "outcome-tracking"]);

    let monitor = Arc::new(Monitor::from_config(temp_config(&dir, true)).await.unwrap());
    let scheduler = build_scheduler(monitor, Duration::from_secs(300)).await.unwrap();
    assert_eq!(
        scheduler.job_names().await,
        vec!["analysis", "daily-report", "outcome-tracking"]
    );
}
