//! Factor snapshots produced by the collectors.
//!
//! Each snapshot is immutable once built. A snapshot with `available == false`
//! carries zeroed placeholder metrics and must never be read as live data;
//! [`FactorSnapshot::is_available`] is the single switch consumers check.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four independently collected market dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Funding,
    PriceVolume,
    MarketPressure,
    Sentiment,
}

impl FactorKind {
    pub const ALL: [FactorKind; 4] = [
        FactorKind::Funding,
        FactorKind::PriceVolume,
        FactorKind::MarketPressure,
        FactorKind::Sentiment,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorKind::Funding => "funding_rate",
            FactorKind::PriceVolume => "price_volume",
            FactorKind::MarketPressure => "market_pressure",
            FactorKind::Sentiment => "sentiment",
        }
    }

    /// Load-bearing factors abort the run when they cannot be collected.
    #[must_use]
    pub fn is_load_bearing(&self) -> bool {
        matches!(self, FactorKind::Funding | FactorKind::PriceVolume)
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the funding rate over the collected history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FundingTrend {
    Rising,
    Falling,
    #[default]
    Flat,
}

impl FundingTrend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FundingTrend::Rising => "rising",
            FundingTrend::Falling => "falling",
            FundingTrend::Flat => "flat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Up,
    Down,
    #[default]
    Ranging,
}

impl PriceTrend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTrend::Up => "up",
            PriceTrend::Down => "down",
            PriceTrend::Ranging => "ranging",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VolumeTrend {
    Expanding,
    #[default]
    Contracting,
}

impl VolumeTrend {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeTrend::Expanding => "expanding",
            VolumeTrend::Contracting => "contracting",
        }
    }
}

/// Crowding risk derived from positioning data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    #[default]
    Low,
}

impl RiskLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SentimentTone {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl SentimentTone {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentTone::Positive => "positive",
            SentimentTone::Negative => "negative",
            SentimentTone::Neutral => "neutral",
        }
    }
}

/// Funding-rate factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub symbol: String,
    pub captured_at: DateTime<Utc>,
    pub current_rate: f64,
    pub avg_rate: f64,
    pub max_rate: f64,
    pub min_rate: f64,
    pub is_extreme: bool,
    pub trend: FundingTrend,
    pub signal: String,
    pub available: bool,
}

/// Price and volume factor over the kline window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceVolumeSnapshot {
    pub symbol: String,
    pub captured_at: DateTime<Utc>,
    pub current_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub price_change: Decimal,
    pub price_change_pct: f64,
    pub price_trend: PriceTrend,
    pub avg_volume: f64,
    pub current_volume: f64,
    /// Quote volume summed over the whole window.
    pub total_volume: f64,
    pub volume_trend: VolumeTrend,
    pub support: Decimal,
    pub resistance: Decimal,
    pub signal: String,
    pub available: bool,
}

/// Positioning and order-flow factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPressureSnapshot {
    pub symbol: String,
    pub captured_at: DateTime<Utc>,
    pub open_interest: f64,
    pub long_short_ratio: f64,
    pub long_account_pct: f64,
    pub short_account_pct: f64,
    pub buy_sell_ratio: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub risk_level: RiskLevel,
    pub signal: String,
    pub available: bool,
}

/// News sentiment factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub symbol: String,
    pub captured_at: DateTime<Utc>,
    pub score: f64,
    pub positive_count: u32,
    pub negative_count: u32,
    pub headline_count: u32,
    pub tone: SentimentTone,
    pub headlines: Vec<String>,
    pub signal: String,
    pub available: bool,
}

impl MarketPressureSnapshot {
    /// Placeholder used when positioning data could not be collected.
    #[must_use]
    pub fn degraded(symbol: &str, captured_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            captured_at,
            open_interest: 0.0,
            long_short_ratio: 0.0,
            long_account_pct: 0.0,
            short_account_pct: 0.0,
            buy_sell_ratio: 0.0,
            buy_volume: 0.0,
            sell_volume: 0.0,
            risk_level: RiskLevel::Low,
            signal: "market pressure data unavailable".to_string(),
            available: false,
        }
    }
}

impl SentimentSnapshot {
    /// Placeholder used when news could not be collected or no API key is configured.
    #[must_use]
    pub fn degraded(symbol: &str, captured_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            captured_at,
            score: 0.0,
            positive_count: 0,
            negative_count: 0,
            headline_count: 0,
            tone: SentimentTone::Neutral,
            headlines: Vec::new(),
            signal: "news sentiment unavailable".to_string(),
            available: false,
        }
    }
}

impl FundingSnapshot {
    /// Placeholder for the detector and tests; the funding collector never
    /// hands one to the workflow because funding is load-bearing.
    #[must_use]
    pub fn degraded(symbol: &str, captured_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            captured_at,
            current_rate: 0.0,
            avg_rate: 0.0,
            max_rate: 0.0,
            min_rate: 0.0,
            is_extreme: false,
            trend: FundingTrend::Flat,
            signal: "funding data unavailable".to_string(),
            available: false,
        }
    }
}

impl PriceVolumeSnapshot {
    #[must_use]
    pub fn degraded(symbol: &str, captured_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            captured_at,
            current_price: Decimal::ZERO,
            high_price: Decimal::ZERO,
            low_price: Decimal::ZERO,
            price_change: Decimal::ZERO,
            price_change_pct: 0.0,
            price_trend: PriceTrend::Ranging,
            avg_volume: 0.0,
            current_volume: 0.0,
            total_volume: 0.0,
            volume_trend: VolumeTrend::Contracting,
            support: Decimal::ZERO,
            resistance: Decimal::ZERO,
            signal: "price data unavailable".to_string(),
            available: false,
        }
    }
}

/// Any one of the four factor snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "factor", rename_all = "snake_case")]
pub enum FactorSnapshot {
    Funding(FundingSnapshot),
    PriceVolume(PriceVolumeSnapshot),
    MarketPressure(MarketPressureSnapshot),
    Sentiment(SentimentSnapshot),
}

impl FactorSnapshot {
    #[must_use]
    pub fn kind(&self) -> FactorKind {
        match self {
            FactorSnapshot::Funding(_) => FactorKind::Funding,
            FactorSnapshot::PriceVolume(_) => FactorKind::PriceVolume,
            FactorSnapshot::MarketPressure(_) => FactorKind::MarketPressure,
            FactorSnapshot::Sentiment(_) => FactorKind::Sentiment,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        match self {
            FactorSnapshot::Funding(s) => s.available,
            FactorSnapshot::PriceVolume(s) => s.available,
            FactorSnapshot::MarketPressure(s) => s.available,
            FactorSnapshot::Sentiment(s) => s.available,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            FactorSnapshot::Funding(s) => &s.symbol,
            FactorSnapshot::PriceVolume(s) => &s.symbol,
            FactorSnapshot::MarketPressure(s) => &s.symbol,
            FactorSnapshot::Sentiment(s) => &s.symbol,
        }
    }

    /// The qualitative signal string the collector derived.
    #[must_use]
    pub fn signal(&self) -> &str {
        match self {
            FactorSnapshot::Funding(s) => &s.signal,
            FactorSnapshot::PriceVolume(s) => &s.signal,
            FactorSnapshot::MarketPressure(s) => &s.signal,
            FactorSnapshot::Sentiment(s) => &s.signal,
        }
    }

    /// Placeholder snapshot of the given kind.
    #[must_use]
    pub fn degraded(kind: FactorKind, symbol: &str, captured_at: DateTime<Utc>) -> Self {
        match kind {
            FactorKind::Funding => FactorSnapshot::Funding(FundingSnapshot::degraded(symbol, captured_at)),
            FactorKind::PriceVolume => {
                FactorSnapshot::PriceVolume(PriceVolumeSnapshot::degraded(symbol, captured_at))
            }
            FactorKind::MarketPressure => {
                FactorSnapshot::MarketPressure(MarketPressureSnapshot::degraded(symbol, captured_at))
            }
            FactorKind::Sentiment => {
                FactorSnapshot::Sentiment(SentimentSnapshot::degraded(symbol, captured_at))
            }
        }
    }
}
