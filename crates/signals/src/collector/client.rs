//! REST client for Binance USDⓈ-M futures market data.
//!
//! All collectors share one client so the rate limiter covers every request
//! the process makes to the exchange.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use market_sentinel_core::{CollectorConfig, PriceSource};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::str::FromStr;
use thiserror::Error;

/// Binance Futures API base URL
pub const BINANCE_FUTURES_API: &str = "https://fapi.binance.com";

/// Period used for the positioning statistics endpoints.
const STATS_PERIOD: &str = "1h";

/// Failures talking to an upstream data provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("missing credentials for {0}")]
    MissingCredentials(&'static str),

    #[error("upstream returned no data for {0}")]
    Empty(String),
}

/// One settled funding rate.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingRateEntry {
    pub funding_time: DateTime<Utc>,
    pub rate: f64,
}

/// One candle. Prices are exact, volumes are descriptive only.
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: f64,
    pub quote_volume: f64,
}

/// Global long/short account ratio sample. Account shares are fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct LongShortRatio {
    pub ratio: f64,
    pub long_account: f64,
    pub short_account: f64,
}

/// Taker buy/sell volume sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TakerVolume {
    pub buy_sell_ratio: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFundingRate {
    funding_rate: String,
    funding_time: i64,
}

#[derive(Debug, Deserialize)]
struct RawTickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOpenInterest {
    open_interest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLongShortRatio {
    long_short_ratio: String,
    long_account: String,
    short_account: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTakerVolume {
    buy_sell_ratio: String,
    buy_vol: String,
    sell_vol: String,
}

/// Market data client for Binance Futures.
pub struct MarketDataClient {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl MarketDataClient {
    /// Creates a client from collector settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built or the rate limit is zero.
    pub fn new(config: &CollectorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let per_second = NonZeroU32::new(config.rate_limit_per_second)
            .ok_or_else(|| anyhow::anyhow!("Rate limit must be > 0"))?;

        Ok(Self {
            client,
            base_url: config.futures_api_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// Overrides the base URL (used by tests against a mock server).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    /// Fetches settled funding rates, oldest first.
    ///
    /// # Errors
    /// Returns an error if the request fails or any rate is malformed.
    pub async fn funding_history(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<FundingRateEntry>, UpstreamError> {
        let raw: Vec<RawFundingRate> = self
            .get_json(
                "/fapi/v1/fundingRate",
                &[("symbol", symbol.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        let mut entries = raw
            .into_iter()
            .map(|r| {
                Ok(FundingRateEntry {
                    funding_time: timestamp_ms(r.funding_time)?,
                    rate: parse_f64(&r.funding_rate)?,
                })
            })
            .collect::<Result<Vec<_>, UpstreamError>>()?;

        entries.sort_by_key(|e| e.funding_time);
        Ok(entries)
    }

    /// Fetches the most recent candles, oldest first.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, UpstreamError> {
        let raw: Vec<Vec<serde_json::Value>> = self
            .get_json(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(raw.iter().filter_map(|k| parse_kline(k)).collect())
    }

    /// Fetches the latest traded price.
    ///
    /// # Errors
    /// Returns an error if the request fails or the price is malformed.
    pub async fn ticker_price(&self, symbol: &str) -> Result<Decimal, UpstreamError> {
        let raw: RawTickerPrice = self
            .get_json("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Decimal::from_str(&raw.price).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    /// Fetches current open interest in contracts.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn open_interest(&self, symbol: &str) -> Result<f64, UpstreamError> {
        let raw: RawOpenInterest = self
            .get_json("/fapi/v1/openInterest", &[("symbol", symbol.to_string())])
            .await?;
        parse_f64(&raw.open_interest)
    }

    /// Fetches the latest global long/short account ratio.
    ///
    /// # Errors
    /// Returns an error if the request fails or no sample is returned.
    pub async fn long_short_ratio(&self, symbol: &str) -> Result<LongShortRatio, UpstreamError> {
        let raw: Vec<RawLongShortRatio> = self
            .get_json(
                "/futures/data/globalLongShortAccountRatio",
                &[
                    ("symbol", symbol.to_string()),
                    ("period", STATS_PERIOD.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        let latest = raw
            .last()
            .ok_or_else(|| UpstreamError::Empty(format!("long/short ratio {symbol}")))?;

        Ok(LongShortRatio {
            ratio: parse_f64(&latest.long_short_ratio)?,
            long_account: parse_f64(&latest.long_account)?,
            short_account: parse_f64(&latest.short_account)?,
        })
    }

    /// Fetches the latest taker buy/sell volume sample.
    ///
    /// # Errors
    /// Returns an error if the request fails or no sample is returned.
    pub async fn taker_volume(&self, symbol: &str) -> Result<TakerVolume, UpstreamError> {
        let raw: Vec<RawTakerVolume> = self
            .get_json(
                "/futures/data/takerlongshortRatio",
                &[
                    ("symbol", symbol.to_string()),
                    ("period", STATS_PERIOD.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        let latest = raw
            .last()
            .ok_or_else(|| UpstreamError::Empty(format!("taker volume {symbol}")))?;

        Ok(TakerVolume {
            buy_sell_ratio: parse_f64(&latest.buy_sell_ratio)?,
            buy_volume: parse_f64(&latest.buy_vol)?,
            sell_volume: parse_f64(&latest.sell_vol)?,
        })
    }
}

#[async_trait]
impl PriceSource for MarketDataClient {
    async fn current_price(&self, symbol: &str) -> anyhow::Result<Decimal> {
        Ok(self.ticker_price(symbol).await?)
    }
}

fn parse_f64(s: &str) -> Result<f64, UpstreamError> {
    s.parse::<f64>()
        .map_err(|e| UpstreamError::Decode(format!("'{s}': {e}")))
}

fn timestamp_ms(ms: i64) -> Result<DateTime<Utc>, UpstreamError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| UpstreamError::Decode(format!("invalid timestamp {ms}")))
}

/// Parses a single kline from the Binance API response.
///
/// Binance kline format:
/// ```text
/// [
///   1499040000000,      // 0: Open time
///   "0.01634000",       // 1: Open
///   "0.80000000",       // 2: High
///   "0.01575800",       // 3: Low
///   "0.01577100",       // 4: Close
///   "148976.11427815",  // 5: Volume
///   1499644799999,      // 6: Close time
///   "2434.19055334",    // 7: Quote asset volume
///   ...
/// ]
/// ```
pub(crate) fn parse_kline(kline: &[serde_json::Value]) -> Option<Kline> {
    if kline.len() < 8 {
        return None;
    }

    let open_time = Utc.timestamp_millis_opt(kline[0].as_i64()?).single()?;

    Some(Kline {
        open_time,
        open: parse_decimal_from_json(&kline[1])?,
        high: parse_decimal_from_json(&kline[2])?,
        low: parse_decimal_from_json(&kline[3])?,
        close: parse_decimal_from_json(&kline[4])?,
        volume: parse_f64_from_json(&kline[5])?,
        quote_volume: parse_f64_from_json(&kline[7])?,
    })
}

/// Parses a Decimal from a JSON value (handles both string and number formats).
fn parse_decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn parse_f64_from_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> MarketDataClient {
        MarketDataClient::new(&CollectorConfig::default())
            .unwrap()
            .with_base_url(server.uri())
    }

    // ========== Parsing Tests ==========

    #[test]
    fn test_parse_kline_valid() {
        let kline = vec![
            json!(1_700_000_000_000_i64),
            json!("100.5"),
            json!("101.0"),
            json!("99.5"),
            json!("100.8"),
            json!("1234.5"),
            json!(1_700_003_599_999_i64),
            json!("124000.75"),
        ];

        let parsed = parse_kline(&kline).unwrap();
        assert_eq!(parsed.close, dec!(100.8));
        assert_eq!(parsed.high, dec!(101.0));
        assert!((parsed.quote_volume - 124_000.75).abs() < 1e-9);
    }

    #[test]
    fn test_parse_kline_too_short() {
        let kline = vec![json!(1_700_000_000_000_i64), json!("1"), json!("2")];
        assert!(parse_kline(&kline).is_none());
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let client = MarketDataClient::new(&CollectorConfig::default())
            .unwrap()
            .with_base_url("http://localhost:9999/");
        assert_eq!(client.base_url(), "http://localhost:9999");
    }

    // ========== HTTP Tests ==========

    #[tokio::test]
    async fn test_funding_history_sorted_oldest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/fundingRate"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "BTCUSDT", "fundingRate": "0.0003", "fundingTime": 1_700_028_800_000_i64},
                {"symbol": "BTCUSDT", "fundingRate": "0.0001", "fundingTime": 1_700_000_000_000_i64}
            ])))
            .mount(&server)
            .await;

        let history = client_for(&server).funding_history("BTCUSDT", 24).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!((history[0].rate - 0.0001).abs() < 1e-12);
        assert!((history[1].rate - 0.0003).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_ticker_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/ticker/price"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"symbol": "ETHUSDT", "price": "3150.25", "time": 1})),
            )
            .mount(&server)
            .await;

        let price = client_for(&server).current_price("ETHUSDT").await.unwrap();
        assert_eq!(price, dec!(3150.25));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fapi/v1/openInterest"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = client_for(&server).open_interest("BTCUSDT").await.unwrap_err();
        match err {
            UpstreamError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_ratio_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/futures/data/globalLongShortAccountRatio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = client_for(&server).long_short_ratio("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Empty(_)));
    }
}
