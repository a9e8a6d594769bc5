//! Outcome tracker data model.
//!
//! An outcome row is opened when an opportunity is persisted and closed
//! exactly once by the accuracy tracker.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use market_sentinel_core::Trend;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::database::{decimal_column, from_millis};

/// Why an outcome row was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TargetHit,
    StopHit,
    Timeout,
}

impl CloseReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TargetHit => "target_hit",
            CloseReason::StopHit => "stop_hit",
            CloseReason::Timeout => "timeout",
        }
    }

    /// # Errors
    /// Returns an error for unknown reason tags.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "target_hit" => Ok(CloseReason::TargetHit),
            "stop_hit" => Ok(CloseReason::StopHit),
            "timeout" => Ok(CloseReason::Timeout),
            _ => Err(anyhow!("Unknown close reason: {s}")),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open outcome row joined with the advice of its analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOutcome {
    pub id: i64,
    pub analysis_id: i64,
    pub symbol: String,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub trend: Option<Trend>,
    pub target_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OpenOutcomeRow {
    pub id: i64,
    pub analysis_id: i64,
    pub symbol: String,
    pub entry_price: String,
    pub entry_time: i64,
    pub trend: Option<String>,
    pub target_price: Option<String>,
    pub stop_loss: Option<String>,
}

impl TryFrom<OpenOutcomeRow> for OpenOutcome {
    type Error = anyhow::Error;

    fn try_from(row: OpenOutcomeRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            analysis_id: row.analysis_id,
            symbol: row.symbol,
            entry_price: Decimal::from_str(&row.entry_price)
                .with_context(|| format!("Invalid entry price: {}", row.entry_price))?,
            entry_time: from_millis(row.entry_time)?,
            trend: row.trend.as_deref().and_then(|t| Trend::parse(t).ok()),
            target_price: decimal_column(row.target_price)?,
            stop_loss: decimal_column(row.stop_loss)?,
        })
    }
}

/// Terminal values written when a row is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeClose {
    pub exit_price: Decimal,
    pub exit_time: DateTime<Utc>,
    pub price_change_pct: f64,
    pub hit_target: bool,
    pub hit_stop_loss: bool,
    pub is_profitable: bool,
    pub reason: CloseReason,
}

/// A closed outcome row joined with its analysis trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedOutcome {
    pub id: i64,
    pub analysis_id: i64,
    pub symbol: String,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Decimal,
    pub exit_time: DateTime<Utc>,
    pub price_change_pct: f64,
    pub hit_target: bool,
    pub hit_stop_loss: bool,
    pub is_profitable: bool,
    pub reason: Option<CloseReason>,
    pub trend: Option<Trend>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ClosedOutcomeRow {
    pub id: i64,
    pub analysis_id: i64,
    pub symbol: String,
    pub entry_price: String,
    pub entry_time: i64,
    pub exit_price: String,
    pub exit_timestamp: i64,
    pub price_change_pct: f64,
    pub hit_target: bool,
    pub hit_stop_loss: bool,
    pub is_profitable: bool,
    pub close_reason: Option<String>,
    pub trend: Option<String>,
}

impl TryFrom<ClosedOutcomeRow> for ClosedOutcome {
    type Error = anyhow::Error;

    fn try_from(row: ClosedOutcomeRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            analysis_id: row.analysis_id,
            symbol: row.symbol,
            entry_price: Decimal::from_str(&row.entry_price)
                .with_context(|| format!("Invalid entry price: {}", row.entry_price))?,
            entry_time: from_millis(row.entry_time)?,
            exit_price: Decimal::from_str(&row.exit_price)
                .with_context(|| format!("Invalid exit price: {}", row.exit_price))?,
            exit_time: from_millis(row.exit_timestamp)?,
            price_change_pct: row.price_change_pct,
            hit_target: row.hit_target,
            hit_stop_loss: row.hit_stop_loss,
            is_profitable: row.is_profitable,
            reason: row.close_reason.as_deref().and_then(|r| CloseReason::parse(r).ok()),
            trend: row.trend.as_deref().and_then(|t| Trend::parse(t).ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_tags() {
        for reason in [CloseReason::TargetHit, CloseReason::StopHit, CloseReason::Timeout] {
            assert_eq!(CloseReason::parse(reason.as_str()).unwrap(), reason);
        }
        assert!(CloseReason::parse("expired").is_err());
    }
}
