//! Opportunity and signal statistics.

use anyhow::Result;
use clap::Args;
use market_sentinel_core::{AppConfig, SignalKind};
use market_sentinel_data::SignalStatistics;
use std::sync::Arc;

use super::open_database;

/// Arguments for the stats command.
#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    /// Look-back window in days
    #[arg(short, long, default_value_t = 7)]
    pub days: i64,

    /// Restrict to one symbol. If not provided, aggregates every symbol.
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Prints aggregate statistics over the look-back window.
///
/// # Errors
/// Returns an error if the store cannot be opened or queried.
pub async fn run_stats(args: StatsArgs, config: Arc<AppConfig>) -> Result<()> {
    let database = open_database(&config).await?;
    let repos = database.repositories();
    let symbol = args.symbol.map(|s| s.to_uppercase());

    let stats = repos
        .analyses
        .get_signal_statistics(symbol.as_deref(), args.days)
        .await?;
    let kinds = repos.analyses.signal_kind_counts(args.days).await?;

    if args.json {
        let body = serde_json::json!({
            "statistics": stats,
            "signal_counts": kinds
                .iter()
                .map(|(kind, n)| (kind.as_str().to_string(), *n))
                .collect::<std::collections::BTreeMap<_, _>>(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print!("{}", render_stats(&stats, &kinds));
    }

    database.close().await;
    Ok(())
}

fn render_stats(stats: &SignalStatistics, kinds: &[(SignalKind, i64)]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Statistics for {} over the last {} days\n",
        stats.symbol.as_deref().unwrap_or("all symbols"),
        stats.period_days
    ));
    out.push_str(&format!("{}\n", "=".repeat(48)));
    out.push_str(&format!("Analyses:          {}\n", stats.total_analyses));
    out.push_str(&format!(
        "Opportunities:     {} ({:.1}%)\n",
        stats.opportunity_count,
        stats.opportunity_rate * 100.0
    ));
    out.push_str(&format!(
        "Avg confidence:    {}\n",
        stats
            .avg_confidence
            .map_or_else(|| "n/a".to_string(), |c| format!("{:.0}%", c * 100.0))
    ));

    if !stats.trend_distribution.is_empty() {
        out.push_str("\nTrend distribution:\n");
        for (trend, n) in &stats.trend_distribution {
            out.push_str(&format!("  {trend:<10} {n}\n"));
        }
    }

    if !kinds.is_empty() {
        out.push_str("\nSignals triggered:\n");
        for (kind, n) in kinds {
            out.push_str(&format!("  {:<24} {n}\n", kind.as_str()));
        }
    }
    out
}
