//! CryptoCompare news sentiment collector.
//!
//! Scores the latest headlines for the instrument's base coin with a keyword
//! classifier. Optional factor: a missing API key or an upstream failure
//! yields a degraded snapshot.

use crate::collector::client::UpstreamError;
use crate::collector::retry::RetryPolicy;
use crate::collector::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_sentinel_core::{
    FactorKind, FactorSnapshot, NewsConfig, PipelineError, SentimentSnapshot, SentimentTone,
};
use serde::Deserialize;
use std::time::Duration;

/// CryptoCompare API base URL.
pub const CRYPTOCOMPARE_API_URL: &str = "https://min-api.cryptocompare.com";

/// Score beyond which the overall tone is no longer neutral.
const TONE_THRESHOLD: f64 = 0.3;

const POSITIVE_KEYWORDS: [&str; 12] = [
    "surge", "rally", "bullish", "gain", "rise", "up", "high", "breakthrough", "adoption",
    "partnership", "launch", "success",
];

const NEGATIVE_KEYWORDS: [&str; 13] = [
    "crash", "drop", "fall", "bearish", "decline", "down", "low", "hack", "scam", "ban",
    "regulation", "lawsuit", "concern",
];

/// Per-headline classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadlineSentiment {
    Positive,
    Negative,
    Neutral,
}

/// Classifies a headline by counting positive and negative keyword hits.
#[must_use]
pub fn classify_headline(title: &str) -> HeadlineSentiment {
    let lower = title.to_lowercase();
    let positive = POSITIVE_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count();
    let negative = NEGATIVE_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count();

    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => HeadlineSentiment::Positive,
        std::cmp::Ordering::Less => HeadlineSentiment::Negative,
        std::cmp::Ordering::Equal => HeadlineSentiment::Neutral,
    }
}

/// `(positive - negative) / total`, zero for no headlines.
#[must_use]
pub fn sentiment_score(positive: u32, negative: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(positive) - f64::from(negative)) / f64::from(total)
}

/// Strips the quote asset from a futures symbol (`BTCUSDT` -> `BTC`).
#[must_use]
pub fn base_coin(symbol: &str) -> &str {
    ["USDT", "BUSD", "USDC"]
        .iter()
        .find_map(|quote| symbol.strip_suffix(quote))
        .filter(|base| !base.is_empty())
        .unwrap_or(symbol)
}

#[must_use]
pub fn summarize_headlines(symbol: &str, titles: &[String], captured_at: DateTime<Utc>) -> SentimentSnapshot {
    let mut positive_count = 0;
    let mut negative_count = 0;
    for title in titles {
        match classify_headline(title) {
            HeadlineSentiment::Positive => positive_count += 1,
            HeadlineSentiment::Negative => negative_count += 1,
            HeadlineSentiment::Neutral => {}
        }
    }

    let headline_count = u32::try_from(titles.len()).unwrap_or(u32::MAX);
    let score = sentiment_score(positive_count, negative_count, headline_count);
    let tone = if score > TONE_THRESHOLD {
        SentimentTone::Positive
    } else if score < -TONE_THRESHOLD {
        SentimentTone::Negative
    } else {
        SentimentTone::Neutral
    };

    let signal = match tone {
        SentimentTone::Positive => "news flow leaning bullish",
        SentimentTone::Negative => "news flow leaning bearish",
        SentimentTone::Neutral => "news flow neutral",
    };

    SentimentSnapshot {
        symbol: symbol.to_string(),
        captured_at,
        score,
        positive_count,
        negative_count,
        headline_count,
        tone,
        headlines: titles.to_vec(),
        signal: signal.to_string(),
        available: true,
    }
}

pub struct NewsSentimentCollector {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    headline_count: usize,
    retry: RetryPolicy,
}

impl NewsSentimentCollector {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &NewsConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            headline_count: config.headline_count,
            retry,
        })
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetches the latest headline titles for a coin.
    ///
    /// # Errors
    /// Returns an error when no API key is configured or the request fails.
    pub async fn fetch_headlines(&self, coin: &str) -> Result<Vec<String>, UpstreamError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(UpstreamError::MissingCredentials("CryptoCompare"))?;

        let url = format!("{}/data/v2/news/", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("categories", coin), ("lang", "EN")])
            .header("authorization", format!("Apikey {api_key}"))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }

        let body: CryptoCompareNewsResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        let titles: Vec<String> = body
            .data
            .unwrap_or_default()
            .into_iter()
            .take(self.headline_count)
            .map(|item| item.title)
            .collect();

        if titles.is_empty() {
            return Err(UpstreamError::Empty(format!(
                "news for {coin}: {}",
                body.message.unwrap_or_default()
            )));
        }
        Ok(titles)
    }

    /// # Errors
    /// Returns the last upstream error once retries are exhausted.
    pub async fn try_collect(&self, symbol: &str) -> Result<SentimentSnapshot, UpstreamError> {
        if self.api_key.is_none() {
            return Err(UpstreamError::MissingCredentials("CryptoCompare"));
        }

        let coin = base_coin(symbol);
        let label = format!("news:{symbol}");
        let titles = self
            .retry
            .retry(&label, move || async move { self.fetch_headlines(coin).await })
            .await?;

        Ok(summarize_headlines(symbol, &titles, Utc::now()))
    }
}

#[async_trait]
impl Collector for NewsSentimentCollector {
    fn kind(&self) -> FactorKind {
        FactorKind::Sentiment
    }

    async fn collect(&self, symbol: &str) -> Result<FactorSnapshot, PipelineError> {
        tracing::info!(symbol, "Collecting news sentiment");
        let snapshot = match self.try_collect(symbol).await {
            Ok(snapshot) => snapshot,
            Err(UpstreamError::MissingCredentials(provider)) => {
                tracing::warn!(symbol, "No {} API key configured, sentiment unavailable", provider);
                SentimentSnapshot::degraded(symbol, Utc::now())
            }
            Err(e) => {
                tracing::warn!(symbol, "News sentiment unavailable, continuing degraded: {}", e);
                SentimentSnapshot::degraded(symbol, Utc::now())
            }
        };
        Ok(FactorSnapshot::Sentiment(snapshot))
    }
}

// ========== CryptoCompare API Response Types ==========

#[derive(Debug, Deserialize)]
struct CryptoCompareNewsResponse {
    #[serde(rename = "Data")]
    data: Option<Vec<CryptoCompareArticle>>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CryptoCompareArticle {
    title: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with_key(key: Option<&str>) -> NewsConfig {
        NewsConfig {
            api_key: key.map(str::to_string),
            ..NewsConfig::default()
        }
    }

    // ========== Classification Tests ==========

    #[test]
    fn test_classify_headline() {
        assert_eq!(classify_headline("Bitcoin surges to record as adoption grows"), HeadlineSentiment::Positive);
        assert_eq!(classify_headline("Exchange hack triggers crash"), HeadlineSentiment::Negative);
        assert_eq!(classify_headline("Miners hold quarterly meeting"), HeadlineSentiment::Neutral);
    }

    #[test]
    fn test_sentiment_score() {
        assert_eq!(sentiment_score(0, 0, 0), 0.0);
        assert!((sentiment_score(4, 1, 5) - 0.6).abs() < 1e-12);
        assert!((sentiment_score(0, 3, 5) + 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_base_coin() {
        assert_eq!(base_coin("BTCUSDT"), "BTC");
        assert_eq!(base_coin("ETHBUSD"), "ETH");
        assert_eq!(base_coin("USDT"), "USDT");
        assert_eq!(base_coin("SOL"), "SOL");
    }

    #[test]
    fn test_summarize_headlines_tone() {
        let titles = vec![
            "Rally continues as adoption grows".to_string(),
            "Bullish breakthrough for layer two".to_string(),
            "Quiet weekend for markets".to_string(),
        ];
        let snapshot = summarize_headlines("BTCUSDT", &titles, Utc::now());
        assert_eq!(snapshot.positive_count, 2);
        assert_eq!(snapshot.headline_count, 3);
        assert_eq!(snapshot.tone, SentimentTone::Positive);
    }

    // ========== Collection Tests ==========

    #[tokio::test]
    async fn test_missing_key_degrades_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let collector = NewsSentimentCollector::new(&config_with_key(None), RetryPolicy::default())
            .unwrap()
            .with_base_url(server.uri());

        let snapshot = collector.collect("BTCUSDT").await.unwrap();
        assert!(!snapshot.is_available());
    }

    #[tokio::test]
    async fn test_collects_top_headlines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/v2/news/"))
            .and(query_param("categories", "BTC"))
            .and(header("authorization", "Apikey test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Type": 100,
                "Message": "News list successfully returned",
                "Data": [
                    {"title": "Bitcoin crash wipes out leverage"},
                    {"title": "Regulators ban offshore exchange"},
                    {"title": "Market decline deepens"},
                    {"title": "Funds rally behind miners"},
                    {"title": "Developers publish roadmap"},
                    {"title": "Sixth headline is ignored"}
                ]
            })))
            .mount(&server)
            .await;

        let collector = NewsSentimentCollector::new(&config_with_key(Some("test-key")), RetryPolicy::default())
            .unwrap()
            .with_base_url(server.uri());

        let snapshot = collector.try_collect("BTCUSDT").await.unwrap();
        assert_eq!(snapshot.headline_count, 5);
        assert_eq!(snapshot.negative_count, 3);
        assert_eq!(snapshot.positive_count, 1);
        assert!((snapshot.score + 0.4).abs() < 1e-12);
        assert_eq!(snapshot.tone, SentimentTone::Negative);
    }
}
