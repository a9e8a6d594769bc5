use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::database::from_millis;

/// Price observed at analysis time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: i64,
    pub analysis_id: Option<i64>,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub volume_24h: Option<f64>,
    pub funding_rate: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PriceRow {
    pub id: i64,
    pub analysis_id: Option<i64>,
    pub symbol: String,
    pub timestamp: i64,
    pub price: String,
    pub volume_24h: Option<f64>,
    pub funding_rate: Option<f64>,
}

impl TryFrom<PriceRow> for PriceRecord {
    type Error = anyhow::Error;

    fn try_from(row: PriceRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            analysis_id: row.analysis_id,
            symbol: row.symbol,
            timestamp: from_millis(row.timestamp)?,
            price: Decimal::from_str(&row.price)
                .with_context(|| format!("Invalid stored price: {}", row.price))?,
            volume_24h: row.volume_24h,
            funding_rate: row.funding_rate,
        })
    }
}
