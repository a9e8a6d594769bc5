//! Structured analysis result handed from the workflow to storage and alerting.

use crate::events::{Detection, SignalKind};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Advised market direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Ranging,
}

impl Trend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Bullish => "bullish",
            Trend::Bearish => "bearish",
            Trend::Ranging => "ranging",
        }
    }

    /// # Errors
    /// Returns an error for unknown trend tags.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bullish" => Ok(Trend::Bullish),
            "bearish" => Ok(Trend::Bearish),
            "ranging" => Ok(Trend::Ranging),
            _ => Err(anyhow!("Unknown trend: {s}")),
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggested position size tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSize {
    Light,
    Medium,
    Heavy,
}

impl PositionSize {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSize::Light => "light",
            PositionSize::Medium => "medium",
            PositionSize::Heavy => "heavy",
        }
    }

    /// # Errors
    /// Returns an error for unknown size tags.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "light" => Ok(PositionSize::Light),
            "medium" => Ok(PositionSize::Medium),
            "heavy" => Ok(PositionSize::Heavy),
            _ => Err(anyhow!("Unknown position size: {s}")),
        }
    }
}

/// Fields scraped from free-form reasoning text.
///
/// Every field is best effort: absent when the marker was not found and
/// possibly wrong when it was.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedAdvice {
    pub trend: Option<Trend>,
    /// Confidence in `[0, 1]`.
    pub confidence: Option<f64>,
    pub support: Option<Decimal>,
    pub resistance: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub target: Option<Decimal>,
    pub position_size: Option<PositionSize>,
}

/// Terminal output of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub current_price: Option<Decimal>,
    pub price_change_pct: Option<f64>,
    pub volume_24h: Option<f64>,
    pub funding_rate: Option<f64>,
    pub detection: Detection,
    pub advice: ParsedAdvice,
    /// Reasoner output, or the synthetic text when the gate was closed.
    pub text: String,
    /// True when `text` came from the reasoner.
    pub reasoned: bool,
}

impl AnalysisResult {
    #[must_use]
    pub fn has_opportunity(&self) -> bool {
        self.detection.has_opportunity
    }

    /// Signal count as persisted: zero unless an opportunity was flagged.
    #[must_use]
    pub fn signal_count(&self) -> usize {
        if self.detection.has_opportunity {
            self.detection.signal_count()
        } else {
            0
        }
    }

    /// Triggered signal kinds as persisted: empty unless an opportunity was flagged.
    #[must_use]
    pub fn triggered_signals(&self) -> Vec<SignalKind> {
        if self.detection.has_opportunity {
            self.detection.signals.kinds()
        } else {
            Vec::new()
        }
    }
}
