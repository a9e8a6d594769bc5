//! Best-effort extraction of advice fields from reasoning text.
//!
//! The reasoner writes prose. This scans it line by line for section markers
//! (English or Chinese) and pulls out whatever it can. Every field may be
//! absent, and a present field may still be wrong.

use anyhow::{anyhow, Result};
use market_sentinel_core::{ParsedAdvice, PositionSize, Trend};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

const TREND_MARKERS: [&str; 3] = ["market trend", "trend:", "市场趋势"];
const CONFIDENCE_MARKERS: [&str; 2] = ["confidence", "信心度"];
const SUPPORT_MARKERS: [&str; 2] = ["support", "支撑位"];
const RESISTANCE_MARKERS: [&str; 2] = ["resistance", "阻力位"];
const STOP_MARKERS: [&str; 2] = ["stop", "止损"];
const TARGET_MARKERS: [&str; 2] = ["target", "目标位"];
const POSITION_MARKERS: [&str; 2] = ["position", "仓位"];

#[derive(Debug, Clone)]
pub struct ResultParser {
    percent: Regex,
    dollar_price: Regex,
    plain_price: Regex,
}

impl ResultParser {
    /// # Errors
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            percent: compile(r"(\d+(?:\.\d+)?)\s*%")?,
            dollar_price: compile(r"\$\s*(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)")?,
            plain_price: compile(r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)")?,
        })
    }

    #[must_use]
    pub fn parse(&self, text: &str) -> ParsedAdvice {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let mut advice = ParsedAdvice::default();

        for (i, line) in lines.iter().enumerate() {
            let lower = line.to_lowercase();

            if advice.trend.is_none() {
                if let Some(tail) = tail_after(&lower, &TREND_MARKERS) {
                    advice.trend = detect_trend(tail).or_else(|| {
                        lines[i + 1..]
                            .iter()
                            .find(|l| !l.is_empty())
                            .and_then(|next| detect_trend(&next.to_lowercase()))
                    });
                }
            }

            if advice.confidence.is_none() {
                if let Some(tail) = tail_after(&lower, &CONFIDENCE_MARKERS) {
                    advice.confidence = self.extract_confidence(tail);
                }
            }

            if advice.support.is_none() {
                if let Some(tail) = tail_after(&lower, &SUPPORT_MARKERS) {
                    advice.support = self.extract_price(tail);
                }
            }

            if advice.resistance.is_none() {
                if let Some(tail) = tail_after(&lower, &RESISTANCE_MARKERS) {
                    advice.resistance = self.extract_price(tail);
                }
            }

            if advice.stop_loss.is_none() {
                if let Some(tail) = tail_after(&lower, &STOP_MARKERS) {
                    advice.stop_loss = self.extract_price(tail);
                }
            }

            if advice.target.is_none() {
                if let Some(tail) = tail_after(&lower, &TARGET_MARKERS) {
                    advice.target = self.extract_price(tail);
                }
            }

            if advice.position_size.is_none() {
                if let Some(tail) = tail_after(&lower, &POSITION_MARKERS) {
                    advice.position_size = detect_position(tail);
                }
            }
        }

        advice
    }

    fn extract_confidence(&self, text: &str) -> Option<f64> {
        let caps = self.percent.captures(text)?;
        let pct: f64 = caps.get(1)?.as_str().parse().ok()?;
        Some((pct / 100.0).clamp(0.0, 1.0))
    }

    /// Prefers a `$`-prefixed amount, else the first bare number.
    fn extract_price(&self, text: &str) -> Option<Decimal> {
        let caps = self
            .dollar_price
            .captures(text)
            .or_else(|| self.plain_price.captures(text))?;
        let raw = caps.get(1)?.as_str().replace(',', "");
        Decimal::from_str(&raw).ok().filter(|p| p.is_sign_positive() && !p.is_zero())
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| anyhow!("Invalid regex pattern '{}': {}", pattern, e))
}

/// Text following the first marker found in `line`.
fn tail_after<'a>(line: &'a str, markers: &[&str]) -> Option<&'a str> {
    markers
        .iter()
        .find_map(|marker| line.find(marker).map(|idx| &line[idx + marker.len()..]))
}

fn detect_trend(text: &str) -> Option<Trend> {
    if text.contains("bullish") || text.contains("看多") || text.contains("上涨") {
        Some(Trend::Bullish)
    } else if text.contains("bearish") || text.contains("看空") || text.contains("下跌") {
        Some(Trend::Bearish)
    } else if text.contains("ranging") || text.contains("sideways") || text.contains("震荡") {
        Some(Trend::Ranging)
    } else {
        None
    }
}

fn detect_position(text: &str) -> Option<PositionSize> {
    if text.contains("light") || text.contains("轻仓") {
        Some(PositionSize::Light)
    } else if text.contains("medium") || text.contains("中仓") {
        Some(PositionSize::Medium)
    } else if text.contains("heavy") || text.contains("重仓") {
        Some(PositionSize::Heavy)
    } else {
        None
    }
}
