//! LLM reasoning client (Anthropic Messages API).

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use market_sentinel_core::{Reasoner, ReasonerConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_VERSION: &str = "2023-06-01";

/// Asks for the sections the result parser scans for.
const SYSTEM_PROMPT: &str = "\
You are a cryptocurrency derivatives analyst. You receive a market brief for one \
perpetual futures instrument and write a concise trading assessment.

Always include these lines, each on its own line:
Market trend: bullish, bearish or ranging
Confidence: NN%
Support: $PRICE
Resistance: $PRICE
Stop-loss: $PRICE
Target: $PRICE
Position size: light, medium or heavy

Follow them with a short rationale that cites the data in the brief. \
This is advisory only; never claim certainty.";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Text-in, text-out completion client.
pub struct LlmReasoner {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl LlmReasoner {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ReasonerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn reason(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("reasoner API key is not configured"))?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let url = format!("{}/v1/messages", self.base_url);
        tracing::debug!(model = %self.model, "POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .context("reasoner request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("reasoner returned {}: {}", status, body);
        }

        let body: MessagesResponse = response
            .json()
            .await
            .context("could not decode reasoner response")?;

        let text = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            bail!("reasoner returned no text content");
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
