//! Market-pressure collector: open interest, account positioning, and taker flow.
//!
//! Optional factor. When the exchange statistics cannot be fetched the
//! collector hands back a degraded snapshot instead of failing the run.

use crate::collector::client::{LongShortRatio, MarketDataClient, TakerVolume, UpstreamError};
use crate::collector::retry::RetryPolicy;
use crate::collector::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_sentinel_core::{
    FactorKind, FactorSnapshot, MarketPressureSnapshot, PipelineError, RiskLevel,
};
use std::sync::Arc;

pub struct MarketPressureCollector {
    client: Arc<MarketDataClient>,
    retry: RetryPolicy,
}

impl MarketPressureCollector {
    pub fn new(client: Arc<MarketDataClient>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Fetches positioning data, failing on the first unrecoverable upstream error.
    ///
    /// # Errors
    /// Returns the last upstream error once retries are exhausted.
    pub async fn try_collect(&self, symbol: &str) -> Result<MarketPressureSnapshot, UpstreamError> {
        let label = format!("market_pressure:{symbol}");
        let client = &self.client;

        let (open_interest, ratio, taker) = self
            .retry
            .retry(&label, move || async move {
                let open_interest = client.open_interest(symbol).await?;
                let ratio = client.long_short_ratio(symbol).await?;
                let taker = client.taker_volume(symbol).await?;
                Ok::<_, UpstreamError>((open_interest, ratio, taker))
            })
            .await?;

        Ok(summarize_pressure(symbol, open_interest, &ratio, &taker, Utc::now()))
    }
}

#[async_trait]
impl Collector for MarketPressureCollector {
    fn kind(&self) -> FactorKind {
        FactorKind::MarketPressure
    }

    async fn collect(&self, symbol: &str) -> Result<FactorSnapshot, PipelineError> {
        tracing::info!(symbol, "Collecting market pressure");
        let snapshot = match self.try_collect(symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(symbol, "Market pressure unavailable, continuing degraded: {}", e);
                MarketPressureSnapshot::degraded(symbol, Utc::now())
            }
        };
        Ok(FactorSnapshot::MarketPressure(snapshot))
    }
}

/// Classifies crowding risk from positioning and taker flow.
#[must_use]
pub fn classify_risk(long_short_ratio: f64, long_pct: f64, buy_sell_ratio: f64) -> RiskLevel {
    if long_short_ratio > 2.5 || long_short_ratio < 0.5 || long_pct > 75.0 || long_pct < 25.0 {
        RiskLevel::High
    } else if long_short_ratio > 1.5
        || long_short_ratio < 0.67
        || buy_sell_ratio > 1.2
        || buy_sell_ratio < 0.8
    {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[must_use]
pub fn summarize_pressure(
    symbol: &str,
    open_interest: f64,
    ratio: &LongShortRatio,
    taker: &TakerVolume,
    captured_at: DateTime<Utc>,
) -> MarketPressureSnapshot {
    let long_account_pct = ratio.long_account * 100.0;
    let short_account_pct = ratio.short_account * 100.0;
    let risk_level = classify_risk(ratio.ratio, long_account_pct, taker.buy_sell_ratio);

    let signal = match risk_level {
        RiskLevel::High if ratio.ratio >= 1.0 => "longs heavily crowded, squeeze risk to the downside",
        RiskLevel::High => "shorts heavily crowded, squeeze risk to the upside",
        RiskLevel::Medium if taker.buy_sell_ratio > 1.0 => "taker buyers in control",
        RiskLevel::Medium => "taker sellers in control",
        RiskLevel::Low => "positioning balanced",
    };

    MarketPressureSnapshot {
        symbol: symbol.to_string(),
        captured_at,
        open_interest,
        long_short_ratio: ratio.ratio,
        long_account_pct,
        short_account_pct,
        buy_sell_ratio: taker.buy_sell_ratio,
        buy_volume: taker.buy_volume,
        sell_volume: taker.sell_volume,
        risk_level,
        signal: signal.to_string(),
        available: true,
    }
}
