//! Outcome tracking for flagged opportunities.
//!
//! Open rows are re-priced on a schedule and closed once the advised target
//! or stop is crossed, or once they reach the timeout. Accuracy reporting is
//! a read-only derivation over closed rows.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use market_sentinel_core::{PriceSource, SchedulerConfig, Trend};
use market_sentinel_data::{ClosedOutcome, CloseReason, OpenOutcome, OutcomeClose, OutcomeRepository};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Verdict for one open row at one price.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub price_change_pct: f64,
    pub hit_target: bool,
    pub hit_stop_loss: bool,
    pub is_profitable: bool,
    /// Set when the row must be closed now.
    pub close_reason: Option<CloseReason>,
}

impl Evaluation {
    #[must_use]
    pub fn should_close(&self) -> bool {
        self.close_reason.is_some()
    }

    /// The update to apply when closing at `price`.
    #[must_use]
    pub fn to_close(&self, price: Decimal, now: DateTime<Utc>) -> Option<OutcomeClose> {
        self.close_reason.map(|reason| OutcomeClose {
            exit_price: price,
            exit_time: now,
            price_change_pct: self.price_change_pct,
            hit_target: self.hit_target,
            hit_stop_loss: self.hit_stop_loss,
            is_profitable: self.is_profitable,
            reason,
        })
    }
}

/// Evaluates an open row against the current price.
///
/// Bullish rows win at or above the target and lose at or below the stop;
/// bearish rows mirror that. Otherwise profitability follows the sign of the
/// move in the advised direction. Rows without a directional trend are never
/// profitable. Any row older than `timeout` is closed regardless.
#[must_use]
pub fn evaluate(
    row: &OpenOutcome,
    price: Decimal,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Evaluation {
    let price_change_pct = if row.entry_price.is_zero() {
        0.0
    } else {
        ((price - row.entry_price) * Decimal::ONE_HUNDRED / row.entry_price)
            .to_f64()
            .unwrap_or(0.0)
    };

    let mut hit_target = false;
    let mut hit_stop_loss = false;
    let is_profitable = match row.trend {
        Some(Trend::Bullish) => {
            if row.target_price.is_some_and(|t| price >= t) {
                hit_target = true;
                true
            } else if row.stop_loss.is_some_and(|s| price <= s) {
                hit_stop_loss = true;
                false
            } else {
                price_change_pct > 0.0
            }
        }
        Some(Trend::Bearish) => {
            if row.target_price.is_some_and(|t| price <= t) {
                hit_target = true;
                true
            } else if row.stop_loss.is_some_and(|s| price >= s) {
                hit_stop_loss = true;
                false
            } else {
                price_change_pct < 0.0
            }
        }
        Some(Trend::Ranging) | None => false,
    };

    let close_reason = if hit_target {
        Some(CloseReason::TargetHit)
    } else if hit_stop_loss {
        Some(CloseReason::StopHit)
    } else if now - row.entry_time >= timeout {
        Some(CloseReason::Timeout)
    } else {
        None
    };

    Evaluation {
        price_change_pct,
        hit_target,
        hit_stop_loss,
        is_profitable,
        close_reason,
    }
}

/// Counts from one tracking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerUpdate {
    pub evaluated: usize,
    pub closed: usize,
}

/// Re-prices and closes open outcome rows.
pub struct AccuracyTracker {
    outcomes: OutcomeRepository,
    prices: Arc<dyn PriceSource>,
    lookback: Duration,
    timeout: Duration,
}

impl AccuracyTracker {
    #[must_use]
    pub fn new(
        outcomes: OutcomeRepository,
        prices: Arc<dyn PriceSource>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            outcomes,
            prices,
            lookback: config.tracking_lookback(),
            timeout: config.outcome_timeout(),
        }
    }

    /// Tracks open rows entered within the configured lookback.
    ///
    /// # Errors
    /// Returns an error if the store or the price source fails.
    pub async fn update(&self, symbol: &str, now: DateTime<Utc>) -> Result<TrackerUpdate> {
        self.update_within(symbol, now, self.lookback).await
    }

    /// Tracks open rows entered within `lookback` of `now`.
    ///
    /// # Errors
    /// Returns an error if the store or the price source fails.
    pub async fn update_within(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<TrackerUpdate> {
        let open = self.outcomes.open_with_analysis(symbol, now - lookback).await?;
        if open.is_empty() {
            debug!(symbol, "No open outcomes to track");
            return Ok(TrackerUpdate::default());
        }

        info!(symbol, open = open.len(), "Tracking open outcomes");

        let price = self
            .prices
            .current_price(symbol)
            .await
            .with_context(|| format!("Failed to fetch current price for {symbol}"))?;

        let mut update = TrackerUpdate {
            evaluated: open.len(),
            closed: 0,
        };

        for row in &open {
            let evaluation = evaluate(row, price, now, self.timeout);
            let Some(close) = evaluation.to_close(price, now) else {
                continue;
            };

            if self.outcomes.close(row.id, &close).await? {
                update.closed += 1;
                info!(
                    symbol,
                    outcome_id = row.id,
                    reason = %close.reason,
                    profitable = close.is_profitable,
                    "Outcome closed: {:.2}%",
                    close.price_change_pct
                );
            } else {
                warn!(symbol, outcome_id = row.id, "Outcome was already closed");
            }
        }

        info!(symbol, closed = update.closed, "Outcome tracking complete");
        Ok(update)
    }

    /// Builds an accuracy report over rows entered in the last `days`.
    ///
    /// # Errors
    /// Returns an error if the store query fails.
    pub async fn report(
        &self,
        symbol: Option<&str>,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<AccuracyReport> {
        let since = now - Duration::days(days);
        let total = self.outcomes.count_since(symbol, since).await?;
        let closed = self.outcomes.closed_since(symbol, since).await?;
        Ok(AccuracyReport::from_rows(symbol, days, total, &closed))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendStats {
    pub total: usize,
    pub profitable: usize,
    pub accuracy_pct: f64,
}

/// Realised performance of flagged opportunities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub symbol: Option<String>,
    pub period_days: i64,
    pub total: usize,
    pub closed: usize,
    pub pending: usize,
    pub profitable: usize,
    pub accuracy_pct: f64,
    pub hit_target: usize,
    pub hit_target_rate_pct: f64,
    pub hit_stop: usize,
    pub avg_price_change_pct: f64,
    /// Keyed by trend tag, `unknown` when the analysis had none.
    pub by_trend: BTreeMap<String, TrendStats>,
}

impl AccuracyReport {
    /// Derives the report from closed rows. `total` also counts open rows.
    #[must_use]
    pub fn from_rows(symbol: Option<&str>, days: i64, total: i64, closed: &[ClosedOutcome]) -> Self {
        let closed_count = closed.len();
        let total = usize::try_from(total).unwrap_or(0).max(closed_count);
        let profitable = closed.iter().filter(|r| r.is_profitable).count();
        let hit_target = closed.iter().filter(|r| r.hit_target).count();
        let hit_stop = closed.iter().filter(|r| r.hit_stop_loss).count();
        let avg_price_change_pct = if closed_count == 0 {
            0.0
        } else {
            closed.iter().map(|r| r.price_change_pct).sum::<f64>() / closed_count as f64
        };

        let mut by_trend: BTreeMap<String, TrendStats> = BTreeMap::new();
        for row in closed {
            let key = row.trend.map_or("unknown", |t| t.as_str()).to_string();
            let stats = by_trend.entry(key).or_default();
            stats.total += 1;
            if row.is_profitable {
                stats.profitable += 1;
            }
        }
        for stats in by_trend.values_mut() {
            stats.accuracy_pct = percent(stats.profitable, stats.total);
        }

        Self {
            symbol: symbol.map(str::to_string),
            period_days: days,
            total,
            closed: closed_count,
            pending: total - closed_count,
            profitable,
            accuracy_pct: percent(profitable, closed_count),
            hit_target,
            hit_target_rate_pct: percent(hit_target, closed_count),
            hit_stop,
            avg_price_change_pct,
            by_trend,
        }
    }

    /// Plain-text rendering for the CLI and the daily report message.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let scope = self.symbol.as_deref().unwrap_or("all symbols");
        let _ = writeln!(out, "Accuracy report for {scope} (last {} days)", self.period_days);
        let _ = writeln!(
            out,
            "Signals: {} total, {} closed, {} pending",
            self.total, self.closed, self.pending
        );
        let _ = writeln!(
            out,
            "Profitable: {} ({:.1}% accuracy)",
            self.profitable, self.accuracy_pct
        );
        let _ = writeln!(
            out,
            "Target hit: {} ({:.1}%), stop hit: {}",
            self.hit_target, self.hit_target_rate_pct, self.hit_stop
        );
        let _ = writeln!(out, "Average price change: {:.2}%", self.avg_price_change_pct);
        for (trend, stats) in &self.by_trend {
            let _ = writeln!(
                out,
                "  {trend}: {}/{} profitable ({:.1}%)",
                stats.profitable, stats.total, stats.accuracy_pct
            );
        }
        out
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}
