//! Operator notifications.
//!
//! Alerts are fire-and-forget. [`CompositeAlerter`] logs and swallows every
//! channel failure so a broken webhook never reaches the pipeline.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use market_sentinel_core::{AlertConfig, Alerter, AnalysisResult, PipelineError};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TRUNCATION_NOTE: &str = "\n\n...(truncated)";

/// Writes alerts to the log.
#[derive(Debug, Default, Clone)]
pub struct ConsoleAlerter;

#[async_trait]
impl Alerter for ConsoleAlerter {
    async fn send(&self, symbol: &str, result: &AnalysisResult, _full_text: &str) -> Result<()> {
        let signals: Vec<&str> = result
            .detection
            .signals
            .iter()
            .map(|s| s.kind.label())
            .collect();

        info!(
            symbol,
            price = %display_opt(result.current_price),
            change_pct = %result.price_change_pct.map_or_else(|| "n/a".to_string(), |p| format!("{p:.2}%")),
            trend = result.advice.trend.map_or("unknown", |t| t.as_str()),
            confidence = %result.advice.confidence.map_or_else(|| "n/a".to_string(), |c| format!("{:.0}%", c * 100.0)),
            signals = %signals.join(", "),
            "Trading signal alert"
        );
        Ok(())
    }

    async fn send_text(&self, title: &str, body: &str) -> Result<()> {
        info!("{}\n{}", title, body);
        Ok(())
    }
}

/// Posts interactive cards to a Feishu/Lark-style incoming webhook.
#[derive(Clone)]
pub struct WebhookAlerter {
    client: Client,
    url: String,
    max_chars: usize,
}

impl WebhookAlerter {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, max_chars: usize) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
            max_chars,
        })
    }

    /// Builds the card payload for an opportunity alert.
    #[must_use]
    pub fn build_card(&self, symbol: &str, result: &AnalysisResult, full_text: &str) -> Value {
        let mut elements = vec![
            markdown(format!(
                "**Time**: {}",
                result.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            json!({"tag": "hr"}),
            fields(&[
                format!("**Price**\n{}", display_opt(result.current_price)),
                format!(
                    "**Change**\n{}",
                    result
                        .price_change_pct
                        .map_or_else(|| "n/a".to_string(), |p| format!("{p:.2}%"))
                ),
            ]),
            fields(&[
                format!(
                    "**Trend**\n{}",
                    result.advice.trend.map_or("unknown", |t| t.as_str())
                ),
                format!(
                    "**Confidence**\n{}",
                    result
                        .advice
                        .confidence
                        .map_or_else(|| "n/a".to_string(), |c| format!("{:.0}%", c * 100.0))
                ),
            ]),
        ];

        if !result.detection.signals.is_empty() {
            let mut text = String::from("**Triggered signals**\n");
            for signal in &result.detection.signals {
                text.push_str(&format!("- {}\n", signal.kind.label()));
            }
            elements.push(json!({"tag": "hr"}));
            elements.push(markdown(text));
        }

        let mut advice = Vec::new();
        if let Some(size) = result.advice.position_size {
            advice.push(format!("**Position**\n{}", size.as_str()));
        }
        if let Some(stop) = result.advice.stop_loss {
            advice.push(format!("**Stop-loss**\n{stop}"));
        }
        if let Some(target) = result.advice.target {
            advice.push(format!("**Target**\n{target}"));
        }
        if !advice.is_empty() {
            elements.push(json!({"tag": "hr"}));
            elements.push(fields(&advice));
        }

        if !full_text.trim().is_empty() {
            elements.push(json!({"tag": "hr"}));
            elements.push(markdown(truncate(&clean_markdown(full_text), self.max_chars)));
        }

        elements.push(json!({"tag": "hr"}));
        elements.push(json!({
            "tag": "note",
            "elements": [{"tag": "plain_text", "content": "Advisory only. Not financial advice."}]
        }));

        card(&format!("Trading signal - {symbol}"), "red", elements)
    }

    async fn post(&self, payload: &Value) -> Result<()> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Webhook failed: {} - {}", status, body));
        }

        // Feishu answers 200 with a non-zero code on rejected payloads.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if let Some(code) = body.get("code").and_then(Value::as_i64) {
            if code != 0 {
                return Err(anyhow!("Webhook rejected message: {}", body));
            }
        }

        debug!("Webhook alert sent successfully");
        Ok(())
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    async fn send(&self, symbol: &str, result: &AnalysisResult, full_text: &str) -> Result<()> {
        let payload = self.build_card(symbol, result, full_text);
        self.post(&payload).await
    }

    async fn send_text(&self, title: &str, body: &str) -> Result<()> {
        let payload = card(
            title,
            "blue",
            vec![markdown(truncate(body, self.max_chars))],
        );
        self.post(&payload).await
    }
}

/// Fans out to several channels, logging failures.
#[derive(Clone, Default)]
pub struct CompositeAlerter {
    channels: Vec<Arc<dyn Alerter>>,
}

impl CompositeAlerter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Console output always; the webhook when one is configured.
    ///
    /// # Errors
    /// Returns an error if the webhook client cannot be built.
    pub fn from_config(config: &AlertConfig) -> Result<Self> {
        let mut composite = Self::new().with(Arc::new(ConsoleAlerter));
        if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.is_empty()) {
            composite = composite.with(Arc::new(WebhookAlerter::new(url, config.max_chars)?));
            info!("Webhook alerts enabled");
        }
        Ok(composite)
    }

    #[must_use]
    pub fn with(mut self, channel: Arc<dyn Alerter>) -> Self {
        self.channels.push(channel);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[async_trait]
impl Alerter for CompositeAlerter {
    async fn send(&self, symbol: &str, result: &AnalysisResult, full_text: &str) -> Result<()> {
        for channel in &self.channels {
            if let Err(e) = channel.send(symbol, result, full_text).await {
                warn!(symbol, "{}", PipelineError::AlertFailed(format!("{e:#}")));
            }
        }
        Ok(())
    }

    async fn send_text(&self, title: &str, body: &str) -> Result<()> {
        for channel in &self.channels {
            if let Err(e) = channel.send_text(title, body).await {
                warn!("{}", PipelineError::AlertFailed(format!("{e:#}")));
            }
        }
        Ok(())
    }
}

fn card(title: &str, template: &str, elements: Vec<Value>) -> Value {
    json!({
        "msg_type": "interactive",
        "card": {
            "header": {
                "title": {"tag": "plain_text", "content": title},
                "template": template
            },
            "elements": elements
        }
    })
}

fn markdown(content: impl Into<String>) -> Value {
    json!({"tag": "div", "text": {"tag": "lark_md", "content": content.into()}})
}

fn fields(items: &[String]) -> Value {
    let fields: Vec<Value> = items
        .iter()
        .map(|c| json!({"is_short": true, "text": {"tag": "lark_md", "content": c}}))
        .collect();
    json!({"tag": "div", "fields": fields})
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

/// Converts headings to bold and drops rule lines the card renderer shows literally.
fn clean_markdown(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '=' || c == '-') {
            continue;
        }
        let heading = trimmed.trim_start_matches('#');
        if heading.len() < trimmed.len() && heading.starts_with(' ') {
            out.push(format!("**{}**", heading.trim()));
        } else {
            out.push(line.to_string());
        }
    }

    let mut joined = out.join("\n");
    while joined.contains("\n\n\n") {
        joined = joined.replace("\n\n\n", "\n\n");
    }
    joined.trim().to_string()
}

/// Truncates to `max_chars` characters, never splitting a code point.
fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &text[..idx], TRUNCATION_NOTE),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use market_sentinel_core::{
        Detection, ParsedAdvice, PositionSize, SignalEvent, SignalKind, SignalStrength, Trend,
    };
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn result() -> AnalysisResult {
        AnalysisResult {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            current_price: Some(dec!(65000)),
            price_change_pct: Some(6.25),
            volume_24h: Some(1.0e9),
            funding_rate: Some(0.0012),
            detection: Detection {
                has_opportunity: true,
                signals: [
                    SignalEvent::new(SignalKind::PriceSurge, SignalStrength::Strong, 6.25, "up"),
                    SignalEvent::new(
                        SignalKind::FundingExtremeLong,
                        SignalStrength::Strong,
                        0.0012,
                        "crowded",
                    ),
                ]
                .into_iter()
                .collect(),
                bypassed: false,
            },
            advice: ParsedAdvice {
                trend: Some(Trend::Bullish),
                confidence: Some(0.7),
                stop_loss: Some(dec!(62000)),
                target: Some(dec!(70000)),
                position_size: Some(PositionSize::Light),
                ..ParsedAdvice::default()
            },
            text: "analysis".to_string(),
            reasoned: true,
        }
    }

    struct FailingAlerter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Alerter for FailingAlerter {
        async fn send(&self, _: &str, _: &AnalysisResult, _: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("channel down"))
        }

        async fn send_text(&self, _: &str, _: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("channel down"))
        }
    }

    // ========== Card Tests ==========

    #[test]
    fn test_card_contains_signals_and_advice() {
        let alerter = WebhookAlerter::new("http://localhost", 3_000).unwrap();
        let card = alerter.build_card("BTCUSDT", &result(), "## Summary\nLooks strong");
        let text = card.to_string();

        assert_eq!(card["msg_type"], "interactive");
        assert!(text.contains("Trading signal - BTCUSDT"));
        assert!(text.contains("6.25%"));
        assert!(text.contains("Price surge"));
        assert!(text.contains("**Target**\\n70000"));
        assert!(text.contains("**Summary**"));
    }

    #[test]
    fn test_long_text_is_truncated() {
        let alerter = WebhookAlerter::new("http://localhost", 10).unwrap();
        let card = alerter.build_card("BTCUSDT", &result(), &"x".repeat(50));
        let text = card.to_string();
        assert!(text.contains(&format!("{}{}", "x".repeat(10), "\\n\\n...(truncated)")));
        assert!(!text.contains(&"x".repeat(11)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("市场趋势", 2), format!("市场{TRUNCATION_NOTE}"));
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn test_clean_markdown() {
        let cleaned = clean_markdown("### Levels\n=====\nSupport: 1\n\n\n\nDone");
        assert_eq!(cleaned, "**Levels**\nSupport: 1\n\nDone");
    }

    // ========== Delivery Tests ==========

    #[tokio::test]
    async fn test_webhook_posts_card() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0})))
            .expect(1)
            .mount(&server)
            .await;

        let alerter = WebhookAlerter::new(format!("{}/hook", server.uri()), 3_000).unwrap();
        alerter.send("BTCUSDT", &result(), "text").await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"code": 19001, "msg": "bad"})),
            )
            .mount(&server)
            .await;

        let alerter = WebhookAlerter::new(server.uri(), 3_000).unwrap();
        assert!(alerter.send_text("Report", "body").await.is_err());
    }

    #[tokio::test]
    async fn test_composite_swallows_failures() {
        let failing = Arc::new(FailingAlerter {
            calls: AtomicUsize::new(0),
        });
        let composite = CompositeAlerter::new()
            .with(failing.clone())
            .with(Arc::new(ConsoleAlerter));

        assert!(composite.send("BTCUSDT", &result(), "").await.is_ok());
        assert!(composite.send_text("Report", "body").await.is_ok());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_config_without_webhook_is_console_only() {
        let composite = CompositeAlerter::from_config(&AlertConfig::default()).unwrap();
        assert_eq!(composite.len(), 1);
    }
}
