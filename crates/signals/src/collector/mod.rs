//! Factor collectors.
//!
//! One collector per market dimension:
//! - Funding rate history (load-bearing)
//! - Price and volume over the kline window (load-bearing)
//! - Market pressure: open interest, positioning, taker flow (optional)
//! - News sentiment (optional)
//!
//! Every collector wraps its upstream calls in a [`RetryPolicy`]. Load-bearing
//! collectors return [`PipelineError::CollectionFailed`] once retries are
//! exhausted; optional collectors return a degraded snapshot instead.

mod client;
mod funding_collector;
mod kline_collector;
mod news_collector;
mod pressure_collector;
mod retry;

pub use client::{
    FundingRateEntry, Kline, LongShortRatio, MarketDataClient, TakerVolume, UpstreamError,
    BINANCE_FUTURES_API,
};
pub use funding_collector::{funding_trend, summarize_funding, FundingCollector};
pub use kline_collector::{summarize_klines, KlineCollector};
pub use news_collector::{
    base_coin, classify_headline, sentiment_score, summarize_headlines, HeadlineSentiment,
    NewsSentimentCollector, CRYPTOCOMPARE_API_URL,
};
pub use pressure_collector::{classify_risk, summarize_pressure, MarketPressureCollector};
pub use retry::{Backoff, RetryPolicy};

use anyhow::Result;
use async_trait::async_trait;
use market_sentinel_core::{AppConfig, FactorKind, FactorSnapshot, PipelineError};
use std::sync::Arc;

/// Fetches one factor for a symbol.
///
/// Implementations are idempotent and safe to call concurrently for
/// distinct symbols.
#[async_trait]
pub trait Collector: Send + Sync {
    fn kind(&self) -> FactorKind;

    async fn collect(&self, symbol: &str) -> Result<FactorSnapshot, PipelineError>;
}

/// The four collectors a workflow run fans out to.
#[derive(Clone)]
pub struct CollectorSet {
    pub funding: Arc<dyn Collector>,
    pub price_volume: Arc<dyn Collector>,
    pub market_pressure: Arc<dyn Collector>,
    pub sentiment: Arc<dyn Collector>,
}

impl CollectorSet {
    /// Builds the live collectors from configuration, sharing one market data client.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Arc::new(MarketDataClient::new(&config.collector)?);
        Self::with_client(config, client)
    }

    /// Builds the live collectors around an existing market data client.
    ///
    /// # Errors
    /// Returns an error if the news HTTP client cannot be constructed.
    pub fn with_client(config: &AppConfig, client: Arc<MarketDataClient>) -> Result<Self> {
        let retry = RetryPolicy::from_config(&config.retry);

        let funding = FundingCollector::new(client.clone(), retry)
            .with_history_limit(config.collector.funding_history_limit)
            .with_extreme_threshold(config.detector.funding_extreme_threshold);
        let price_volume = KlineCollector::new(client.clone(), retry)
            .with_window(config.collector.kline_interval.clone(), config.collector.kline_limit);
        let market_pressure = MarketPressureCollector::new(client, retry);
        let sentiment = NewsSentimentCollector::new(&config.news, retry)?;

        Ok(Self {
            funding: Arc::new(funding),
            price_volume: Arc::new(price_volume),
            market_pressure: Arc::new(market_pressure),
            sentiment: Arc::new(sentiment),
        })
    }
}
