//! Price and volume collector over the recent kline window.

use crate::collector::client::{Kline, MarketDataClient, UpstreamError};
use crate::collector::retry::RetryPolicy;
use crate::collector::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_sentinel_core::{
    FactorKind, FactorSnapshot, PipelineError, PriceTrend, PriceVolumeSnapshot, VolumeTrend,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Percent move over the window separating a trend from a range.
const TREND_THRESHOLD_PCT: f64 = 1.0;

pub struct KlineCollector {
    client: Arc<MarketDataClient>,
    retry: RetryPolicy,
    interval: String,
    limit: u32,
}

impl KlineCollector {
    pub fn new(client: Arc<MarketDataClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            interval: "1h".to_string(),
            limit: 24,
        }
    }

    #[must_use]
    pub fn with_window(mut self, interval: impl Into<String>, limit: u32) -> Self {
        self.interval = interval.into();
        self.limit = limit;
        self
    }

    /// Collects and summarises the kline window for a symbol.
    ///
    /// # Errors
    /// Returns the last upstream error once retries are exhausted.
    pub async fn collect_price_volume(
        &self,
        symbol: &str,
    ) -> Result<PriceVolumeSnapshot, UpstreamError> {
        let label = format!("klines:{symbol}");
        let client = &self.client;
        let interval = self.interval.as_str();
        let limit = self.limit;

        let klines = self
            .retry
            .retry(&label, move || async move {
                let klines = client.klines(symbol, interval, limit).await?;
                if klines.is_empty() {
                    return Err(UpstreamError::Empty(format!("klines {symbol}")));
                }
                Ok(klines)
            })
            .await?;

        summarize_klines(symbol, &klines, Utc::now())
            .ok_or_else(|| UpstreamError::Empty(format!("klines {symbol}")))
    }
}

#[async_trait]
impl Collector for KlineCollector {
    fn kind(&self) -> FactorKind {
        FactorKind::PriceVolume
    }

    async fn collect(&self, symbol: &str) -> Result<FactorSnapshot, PipelineError> {
        tracing::info!(symbol, "Collecting klines and volume");
        self.collect_price_volume(symbol)
            .await
            .map(FactorSnapshot::PriceVolume)
            .map_err(|e| PipelineError::collection(FactorKind::PriceVolume, e))
    }
}

/// Summarises klines ordered oldest first using close prices and quote volume.
///
/// Returns `None` for an empty window or a zero opening close.
#[must_use]
pub fn summarize_klines(
    symbol: &str,
    klines: &[Kline],
    captured_at: DateTime<Utc>,
) -> Option<PriceVolumeSnapshot> {
    let first = klines.first()?.close;
    let last = klines.last()?;
    if first.is_zero() {
        return None;
    }

    let current_price = last.close;
    let high_price = klines.iter().map(|k| k.close).max()?;
    let low_price = klines.iter().map(|k| k.close).min()?;
    let price_change = current_price - first;
    let price_change_pct = (price_change * Decimal::ONE_HUNDRED / first).to_f64()?;

    let price_trend = if price_change_pct > TREND_THRESHOLD_PCT {
        PriceTrend::Up
    } else if price_change_pct < -TREND_THRESHOLD_PCT {
        PriceTrend::Down
    } else {
        PriceTrend::Ranging
    };

    let total_volume = klines.iter().map(|k| k.quote_volume).sum::<f64>();
    let avg_volume = total_volume / klines.len() as f64;
    let current_volume = last.quote_volume;
    let volume_trend = if current_volume > avg_volume {
        VolumeTrend::Expanding
    } else {
        VolumeTrend::Contracting
    };

    Some(PriceVolumeSnapshot {
        symbol: symbol.to_string(),
        captured_at,
        current_price,
        high_price,
        low_price,
        price_change,
        price_change_pct,
        price_trend,
        avg_volume,
        current_volume,
        total_volume,
        volume_trend,
        support: low_price,
        resistance: high_price,
        signal: volume_signal(volume_trend, price_trend).to_string(),
        available: true,
    })
}

fn volume_signal(volume: VolumeTrend, price: PriceTrend) -> &'static str {
    match (volume, price) {
        (VolumeTrend::Expanding, PriceTrend::Up) => "rising on expanding volume, trend continuation",
        (VolumeTrend::Expanding, PriceTrend::Down) => "falling on expanding volume, panic selling",
        (VolumeTrend::Expanding, PriceTrend::Ranging) => "expanding volume in a range, direction unclear",
        (VolumeTrend::Contracting, PriceTrend::Up) => "rising on thin volume, pullback risk",
        (VolumeTrend::Contracting, PriceTrend::Down) => "falling on thin volume, selling slowing",
        (VolumeTrend::Contracting, PriceTrend::Ranging) => "quiet range, wait and see",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn kline(i: i64, close: Decimal, quote_volume: f64) -> Kline {
        Kline {
            open_time: Utc.timestamp_opt(1_700_000_000 + i * 3_600, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: quote_volume / 100.0,
            quote_volume,
        }
    }

    #[test]
    fn test_summary_uptrend_with_volume_expansion() {
        let klines = vec![
            kline(0, dec!(100), 1_000.0),
            kline(1, dec!(98), 1_000.0),
            kline(2, dec!(103), 1_000.0),
            kline(3, dec!(106), 5_000.0),
        ];

        let snapshot = summarize_klines("BTCUSDT", &klines, Utc::now()).unwrap();

        assert_eq!(snapshot.current_price, dec!(106));
        assert_eq!(snapshot.high_price, dec!(106));
        assert_eq!(snapshot.low_price, dec!(98));
        assert_eq!(snapshot.price_change, dec!(6));
        assert!((snapshot.price_change_pct - 6.0).abs() < 1e-9);
        assert_eq!(snapshot.price_trend, PriceTrend::Up);
        assert!((snapshot.avg_volume - 2_000.0).abs() < 1e-9);
        assert_eq!(snapshot.volume_trend, VolumeTrend::Expanding);
        assert_eq!(snapshot.support, dec!(98));
        assert_eq!(snapshot.resistance, dec!(106));
        assert!(snapshot.signal.contains("expanding volume"));
    }

    #[test]
    fn test_summary_ranging_inside_one_percent() {
        let klines = vec![kline(0, dec!(100), 2_000.0), kline(1, dec!(100.5), 1_000.0)];
        let snapshot = summarize_klines("BTCUSDT", &klines, Utc::now()).unwrap();
        assert_eq!(snapshot.price_trend, PriceTrend::Ranging);
        assert_eq!(snapshot.volume_trend, VolumeTrend::Contracting);
    }

    #[test]
    fn test_summary_downtrend() {
        let klines = vec![kline(0, dec!(200), 1_000.0), kline(1, dec!(188), 1_000.0)];
        let snapshot = summarize_klines("ETHUSDT", &klines, Utc::now()).unwrap();
        assert_eq!(snapshot.price_trend, PriceTrend::Down);
        assert!((snapshot.price_change_pct + 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_empty_window() {
        assert!(summarize_klines("BTCUSDT", &[], Utc::now()).is_none());
    }
}
