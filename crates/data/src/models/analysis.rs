//! Analysis record data model.

use anyhow::Result;
use chrono::{DateTime, Utc};
use market_sentinel_core::{PositionSize, SignalKind, SignalStrength, Trend};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::database::{decimal_column, from_millis};

/// One stored analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub current_price: Option<Decimal>,
    pub price_change_pct: Option<f64>,
    pub has_opportunity: bool,
    pub detection_bypassed: bool,
    /// Zero unless `has_opportunity`.
    pub signal_count: i64,
    /// Empty unless `has_opportunity`.
    pub triggered_signals: Vec<SignalKind>,
    pub trend: Option<Trend>,
    pub confidence: Option<f64>,
    pub support_level: Option<Decimal>,
    pub resistance_level: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub position_size: Option<PositionSize>,
    pub analysis_text: String,
    pub reasoned: bool,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AnalysisRow {
    pub id: i64,
    pub symbol: String,
    pub timestamp: i64,
    pub current_price: Option<String>,
    pub price_change_pct: Option<f64>,
    pub has_opportunity: bool,
    pub detection_bypassed: bool,
    pub signal_count: i64,
    pub triggered_signals: String,
    pub trend: Option<String>,
    pub confidence: Option<f64>,
    pub support_level: Option<String>,
    pub resistance_level: Option<String>,
    pub stop_loss: Option<String>,
    pub target_price: Option<String>,
    pub position_size: Option<String>,
    pub analysis_text: String,
    pub reasoned: bool,
}

impl AnalysisRow {
    pub(crate) const COLUMNS: &'static str = "id, symbol, timestamp, current_price, \
        price_change_pct, has_opportunity, detection_bypassed, signal_count, triggered_signals, \
        trend, confidence, support_level, resistance_level, stop_loss, target_price, \
        position_size, analysis_text, reasoned";
}

impl TryFrom<AnalysisRow> for AnalysisRecord {
    type Error = anyhow::Error;

    fn try_from(row: AnalysisRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            timestamp: from_millis(row.timestamp)?,
            current_price: decimal_column(row.current_price)?,
            price_change_pct: row.price_change_pct,
            has_opportunity: row.has_opportunity,
            detection_bypassed: row.detection_bypassed,
            signal_count: row.signal_count,
            triggered_signals: parse_signal_list(&row.triggered_signals),
            trend: row.trend.as_deref().and_then(|t| Trend::parse(t).ok()),
            confidence: row.confidence,
            support_level: decimal_column(row.support_level)?,
            resistance_level: decimal_column(row.resistance_level)?,
            stop_loss: decimal_column(row.stop_loss)?,
            target_price: decimal_column(row.target_price)?,
            position_size: row
                .position_size
                .as_deref()
                .and_then(|p| PositionSize::parse(p).ok()),
            analysis_text: row.analysis_text,
            reasoned: row.reasoned,
            symbol: row.symbol,
        })
    }
}

/// Comma-joined signal tags, as stored in `triggered_signals`.
pub(crate) fn join_signal_list(kinds: &[SignalKind]) -> String {
    kinds.iter().map(SignalKind::as_str).collect::<Vec<_>>().join(",")
}

pub(crate) fn parse_signal_list(raw: &str) -> Vec<SignalKind> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .filter_map(|tag| match SignalKind::parse(tag) {
            Ok(kind) => Some(kind),
            Err(e) => {
                tracing::warn!("Skipping stored signal tag: {}", e);
                None
            }
        })
        .collect()
}

/// A signal event row linked to its analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSignal {
    pub id: i64,
    pub analysis_id: i64,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub kind: SignalKind,
    pub strength: SignalStrength,
    pub value: f64,
    pub description: String,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SignalRow {
    pub id: i64,
    pub analysis_id: i64,
    pub symbol: String,
    pub timestamp: i64,
    pub kind: String,
    pub strength: String,
    pub value: f64,
    pub description: String,
}

impl TryFrom<SignalRow> for StoredSignal {
    type Error = anyhow::Error;

    fn try_from(row: SignalRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            analysis_id: row.analysis_id,
            symbol: row.symbol,
            timestamp: from_millis(row.timestamp)?,
            kind: SignalKind::parse(&row.kind)?,
            strength: SignalStrength::parse(&row.strength)?,
            value: row.value,
            description: row.description,
        })
    }
}

/// Aggregate over recent analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStatistics {
    /// `None` when aggregated over every symbol.
    pub symbol: Option<String>,
    pub period_days: i64,
    pub total_analyses: i64,
    pub opportunity_count: i64,
    /// `opportunity_count / total_analyses`, zero when there are none.
    pub opportunity_rate: f64,
    pub trend_distribution: BTreeMap<String, i64>,
    pub avg_confidence: Option<f64>,
}
