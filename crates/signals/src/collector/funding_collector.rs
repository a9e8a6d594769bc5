//! Funding-rate collector.
//!
//! Pulls the recent settled funding history and summarises it: extremes,
//! average, and whether the rate has been drifting up or down.

use crate::collector::client::{FundingRateEntry, MarketDataClient, UpstreamError};
use crate::collector::retry::RetryPolicy;
use crate::collector::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_sentinel_core::{FactorKind, FactorSnapshot, FundingSnapshot, FundingTrend, PipelineError};
use std::sync::Arc;

/// Number of points averaged at each end of the history when judging trend.
const TREND_WINDOW: usize = 6;

pub struct FundingCollector {
    client: Arc<MarketDataClient>,
    retry: RetryPolicy,
    history_limit: u32,
    extreme_threshold: f64,
}

impl FundingCollector {
    pub fn new(client: Arc<MarketDataClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            history_limit: 24,
            extreme_threshold: 0.001,
        }
    }

    #[must_use]
    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = limit;
        self
    }

    #[must_use]
    pub fn with_extreme_threshold(mut self, threshold: f64) -> Self {
        self.extreme_threshold = threshold;
        self
    }

    /// Collects and summarises funding data for a symbol.
    ///
    /// # Errors
    /// Returns the last upstream error once retries are exhausted.
    pub async fn collect_funding(&self, symbol: &str) -> Result<FundingSnapshot, UpstreamError> {
        let label = format!("funding:{symbol}");
        let client = &self.client;
        let limit = self.history_limit;
        let history = self
            .retry
            .retry(&label, move || async move {
                let history = client.funding_history(symbol, limit).await?;
                if history.is_empty() {
                    return Err(UpstreamError::Empty(format!("funding history {symbol}")));
                }
                Ok(history)
            })
            .await?;

        summarize_funding(symbol, &history, self.extreme_threshold, Utc::now())
            .ok_or_else(|| UpstreamError::Empty(format!("funding history {symbol}")))
    }
}

#[async_trait]
impl Collector for FundingCollector {
    fn kind(&self) -> FactorKind {
        FactorKind::Funding
    }

    async fn collect(&self, symbol: &str) -> Result<FactorSnapshot, PipelineError> {
        tracing::info!(symbol, "Collecting funding rate");
        self.collect_funding(symbol)
            .await
            .map(FactorSnapshot::Funding)
            .map_err(|e| PipelineError::collection(FactorKind::Funding, e))
    }
}

/// Builds a funding snapshot from history ordered oldest first.
///
/// The latest settled rate is the current rate. Returns `None` for an empty history.
#[must_use]
pub fn summarize_funding(
    symbol: &str,
    history: &[FundingRateEntry],
    extreme_threshold: f64,
    captured_at: DateTime<Utc>,
) -> Option<FundingSnapshot> {
    let current_rate = history.last()?.rate;
    let rates: Vec<f64> = history.iter().map(|e| e.rate).collect();

    let max_rate = rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_rate = rates.iter().copied().fold(f64::INFINITY, f64::min);
    let avg_rate = rates.iter().sum::<f64>() / rates.len() as f64;

    let is_extreme = current_rate.abs() >= extreme_threshold;
    let trend = funding_trend(&rates);

    let signal = if is_extreme && current_rate > 0.0 {
        "longs crowded, short-term pullback risk"
    } else if is_extreme {
        "shorts crowded, short-term bounce risk"
    } else {
        "funding normal"
    };

    Some(FundingSnapshot {
        symbol: symbol.to_string(),
        captured_at,
        current_rate,
        avg_rate,
        max_rate,
        min_rate,
        is_extreme,
        trend,
        signal: signal.to_string(),
        available: true,
    })
}

/// Compares the mean of the newest points with the mean of the oldest points.
///
/// Each window is `min(6, n)` points, so histories under twelve points overlap.
/// Fewer than two points is flat.
#[must_use]
pub fn funding_trend(rates: &[f64]) -> FundingTrend {
    if rates.len() < 2 {
        return FundingTrend::Flat;
    }

    let window = TREND_WINDOW.min(rates.len());
    let older = rates[..window].iter().sum::<f64>() / window as f64;
    let recent = rates[rates.len() - window..].iter().sum::<f64>() / window as f64;

    if recent > older {
        FundingTrend::Rising
    } else if recent < older {
        FundingTrend::Falling
    } else {
        FundingTrend::Flat
    }
}
