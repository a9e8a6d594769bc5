//! Renders factor snapshots into the plain-text market brief handed to the reasoner.

use market_sentinel_core::{
    Detection, FactorKind, FactorSnapshot, FundingSnapshot, MarketPressureSnapshot,
    PipelineError, PriceVolumeSnapshot, SentimentSnapshot,
};
use std::fmt::Write;

/// Headlines listed in the sentiment section.
const MAX_HEADLINES: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct MarketBriefFormatter;

impl MarketBriefFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Formats the brief for one symbol.
    ///
    /// Funding and price/volume must be present and live. Degraded optional
    /// factors are rendered as unavailable rather than with placeholder zeros.
    ///
    /// # Errors
    /// Returns [`PipelineError::ReasoningFailed`] when a load-bearing factor is
    /// missing or degraded.
    pub fn format(&self, snapshots: &[FactorSnapshot]) -> Result<String, PipelineError> {
        let funding = find_live(snapshots, FactorKind::Funding).and_then(|s| match s {
            FactorSnapshot::Funding(f) => Some(f),
            _ => None,
        });
        let price_volume = find_live(snapshots, FactorKind::PriceVolume).and_then(|s| match s {
            FactorSnapshot::PriceVolume(p) => Some(p),
            _ => None,
        });

        let (Some(funding), Some(price_volume)) = (funding, price_volume) else {
            return Err(PipelineError::ReasoningFailed(
                "market brief needs live funding and price/volume data".to_string(),
            ));
        };

        let mut out = String::new();
        let _ = writeln!(out, "[Instrument] {}", funding.symbol);
        out.push('\n');
        write_funding(&mut out, funding);
        out.push('\n');
        write_price_volume(&mut out, price_volume);

        let pressure = snapshots.iter().find_map(|s| match s {
            FactorSnapshot::MarketPressure(p) => Some(p),
            _ => None,
        });
        out.push('\n');
        match pressure {
            Some(p) if p.available => write_pressure(&mut out, p),
            _ => out.push_str("[Market Pressure]\n- unavailable\n"),
        }

        let sentiment = snapshots.iter().find_map(|s| match s {
            FactorSnapshot::Sentiment(s) => Some(s),
            _ => None,
        });
        out.push('\n');
        match sentiment {
            Some(s) if s.available => write_sentiment(&mut out, s),
            _ => out.push_str("[News Sentiment]\n- unavailable\n"),
        }

        Ok(out)
    }

    /// Formats the brief and appends the signals that opened the gate.
    ///
    /// # Errors
    /// See [`format`](Self::format).
    pub fn format_with_signals(
        &self,
        snapshots: &[FactorSnapshot],
        detection: &Detection,
    ) -> Result<String, PipelineError> {
        let mut out = self.format(snapshots)?;
        if !detection.signals.is_empty() {
            out.push_str("\n[Triggered Signals]\n");
            for signal in &detection.signals {
                let _ = writeln!(
                    out,
                    "- [{}] {}: {}",
                    signal.strength.as_str(),
                    signal.kind.label(),
                    signal.description
                );
            }
        }
        Ok(out)
    }
}

fn find_live(snapshots: &[FactorSnapshot], kind: FactorKind) -> Option<&FactorSnapshot> {
    snapshots.iter().find(|s| s.kind() == kind && s.is_available())
}

fn write_funding(out: &mut String, f: &FundingSnapshot) {
    out.push_str("[Funding Rate]\n");
    let _ = writeln!(out, "- Current: {:.6} ({:.4}%)", f.current_rate, f.current_rate * 100.0);
    let _ = writeln!(out, "- Window high: {:.6}", f.max_rate);
    let _ = writeln!(out, "- Window low: {:.6}", f.min_rate);
    let _ = writeln!(out, "- Window average: {:.6}", f.avg_rate);
    let _ = writeln!(out, "- Trend: {}", f.trend.as_str());
    let _ = writeln!(out, "- Extreme: {}", if f.is_extreme { "yes" } else { "no" });
    let _ = writeln!(out, "- Signal: {}", f.signal);
}

fn write_price_volume(out: &mut String, p: &PriceVolumeSnapshot) {
    out.push_str("[Price And Volume]\n");
    let _ = writeln!(out, "- Current price: ${:.2}", p.current_price);
    let _ = writeln!(out, "- Window high: ${:.2}", p.high_price);
    let _ = writeln!(out, "- Window low: ${:.2}", p.low_price);
    let _ = writeln!(out, "- Change: ${:.2} ({:.2}%)", p.price_change, p.price_change_pct);
    let _ = writeln!(out, "- Price trend: {}", p.price_trend.as_str());
    let _ = writeln!(out, "- Support: ${:.2}", p.support);
    let _ = writeln!(out, "- Resistance: ${:.2}", p.resistance);
    let _ = writeln!(out, "- Volume trend: {}", p.volume_trend.as_str());
    let _ = writeln!(out, "- Volume signal: {}", p.signal);
}

fn write_pressure(out: &mut String, p: &MarketPressureSnapshot) {
    out.push_str("[Market Pressure]\n");
    let _ = writeln!(out, "- Open interest: {:.2}", p.open_interest);
    let _ = writeln!(
        out,
        "- Long/short ratio: {:.2} (longs {:.1}%, shorts {:.1}%)",
        p.long_short_ratio, p.long_account_pct, p.short_account_pct
    );
    let _ = writeln!(
        out,
        "- Taker buy/sell ratio: {:.2} (buy {:.2}, sell {:.2})",
        p.buy_sell_ratio, p.buy_volume, p.sell_volume
    );
    let _ = writeln!(out, "- Risk level: {}", p.risk_level.as_str());
    let _ = writeln!(out, "- Signal: {}", p.signal);
}

fn write_sentiment(out: &mut String, s: &SentimentSnapshot) {
    out.push_str("[News Sentiment]\n");
    let _ = writeln!(
        out,
        "- Score: {:.2} ({} positive, {} negative of {})",
        s.score, s.positive_count, s.negative_count, s.headline_count
    );
    let _ = writeln!(out, "- Tone: {}", s.tone.as_str());
    for (i, title) in s.headlines.iter().take(MAX_HEADLINES).enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use market_sentinel_core::{
        FundingTrend, PriceTrend, RiskLevel, SentimentTone, SignalEvent, SignalKind, SignalSet,
        SignalStrength, VolumeTrend,
    };
    use rust_decimal_macros::dec;

    fn live_funding() -> FactorSnapshot {
        FactorSnapshot::Funding(FundingSnapshot {
            symbol: "BTCUSDT".to_string(),
            captured_at: Utc::now(),
            current_rate: 0.0012,
            avg_rate: 0.0008,
            max_rate: 0.0012,
            min_rate: 0.0004,
            is_extreme: true,
            trend: FundingTrend::Rising,
            signal: "longs crowded".to_string(),
            available: true,
        })
    }

    fn live_price_volume() -> FactorSnapshot {
        FactorSnapshot::PriceVolume(PriceVolumeSnapshot {
            symbol: "BTCUSDT".to_string(),
            captured_at: Utc::now(),
            current_price: dec!(65000),
            high_price: dec!(66000),
            low_price: dec!(61000),
            price_change: dec!(3250),
            price_change_pct: 5.26,
            price_trend: PriceTrend::Up,
            avg_volume: 1_000.0,
            current_volume: 2_500.0,
            total_volume: 24_000.0,
            volume_trend: VolumeTrend::Expanding,
            support: dec!(61000),
            resistance: dec!(66000),
            signal: "rising on expanding volume".to_string(),
            available: true,
        })
    }

    #[test]
    fn test_brief_contains_every_section() {
        let now = Utc::now();
        let snapshots = vec![
            live_funding(),
            live_price_volume(),
            FactorSnapshot::MarketPressure(MarketPressureSnapshot {
                symbol: "BTCUSDT".to_string(),
                captured_at: now,
                open_interest: 85_000.0,
                long_short_ratio: 1.8,
                long_account_pct: 64.3,
                short_account_pct: 35.7,
                buy_sell_ratio: 1.1,
                buy_volume: 1_100.0,
                sell_volume: 1_000.0,
                risk_level: RiskLevel::Medium,
                signal: "taker buyers in control".to_string(),
                available: true,
            }),
            FactorSnapshot::Sentiment(SentimentSnapshot {
                symbol: "BTCUSDT".to_string(),
                captured_at: now,
                score: 0.4,
                positive_count: 2,
                negative_count: 0,
                headline_count: 5,
                tone: SentimentTone::Positive,
                headlines: vec!["ETF inflows".to_string()],
                signal: String::new(),
                available: true,
            }),
        ];

        let brief = MarketBriefFormatter::new().format(&snapshots).unwrap();
        assert!(brief.starts_with("[Instrument] BTCUSDT"));
        assert!(brief.contains("- Current: 0.001200 (0.1200%)"));
        assert!(brief.contains("- Current price: $65000.00"));
        assert!(brief.contains("- Risk level: medium"));
        assert!(brief.contains("  1. ETF inflows"));
    }

    #[test]
    fn test_degraded_optional_factors_render_unavailable() {
        let now = Utc::now();
        let snapshots = vec![
            live_funding(),
            live_price_volume(),
            FactorSnapshot::degraded(FactorKind::MarketPressure, "BTCUSDT", now),
            FactorSnapshot::degraded(FactorKind::Sentiment, "BTCUSDT", now),
        ];

        let brief = MarketBriefFormatter::new().format(&snapshots).unwrap();
        assert!(brief.contains("[Market Pressure]\n- unavailable"));
        assert!(brief.contains("[News Sentiment]\n- unavailable"));
        assert!(!brief.contains("Open interest"));
    }

    #[test]
    fn test_missing_load_bearing_factor_fails() {
        let now = Utc::now();
        let snapshots = vec![
            live_funding(),
            FactorSnapshot::degraded(FactorKind::PriceVolume, "BTCUSDT", now),
        ];
        assert!(matches!(
            MarketBriefFormatter::new().format(&snapshots),
            Err(PipelineError::ReasoningFailed(_))
        ));
    }

    #[test]
    fn test_signals_appended() {
        let detection = Detection {
            has_opportunity: true,
            signals: [SignalEvent::new(
                SignalKind::PriceSurge,
                SignalStrength::Strong,
                5.26,
                "Price up 5.26%",
            )]
            .into_iter()
            .collect::<SignalSet>(),
            bypassed: false,
        };

        let brief = MarketBriefFormatter::new()
            .format_with_signals(&[live_funding(), live_price_volume()], &detection)
            .unwrap();
        assert!(brief.contains("[Triggered Signals]\n- [strong] Price surge: Price up 5.26%"));
    }
}
