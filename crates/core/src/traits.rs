use crate::analysis::AnalysisResult;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Text-in, text-out reasoning boundary (an LLM completion).
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, prompt: &str) -> Result<String>;
    fn name(&self) -> &str;
}

/// Operator notification channel. Callers treat failures as non-fatal.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn send(&self, symbol: &str, result: &AnalysisResult, full_text: &str) -> Result<()>;

    /// Sends a free-form text message (daily reports).
    async fn send_text(&self, title: &str, body: &str) -> Result<()>;
}

/// Source of the latest traded price for a symbol.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<Decimal>;
}
