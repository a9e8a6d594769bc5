//! Rule-based opportunity detector.
//!
//! A pure function of the four factor snapshots. Five independent checks each
//! compare one metric against a configured threshold and raise at most one
//! [`SignalEvent`]. The opportunity gate is a quorum: at least
//! `min_signal_count` independent signals must agree before the expensive
//! reasoning stage is worth running.
//!
//! Degraded snapshots (`available == false`) never raise a signal.

use market_sentinel_core::{
    Detection, DetectorConfig, FactorKind, FactorSnapshot, FundingSnapshot, FundingTrend,
    MarketPressureSnapshot, PipelineError, PriceVolumeSnapshot, RiskLevel, SentimentSnapshot,
    SignalEvent, SignalKind, SignalSet, SignalStrength, VolumeTrend,
};
use std::collections::HashSet;

/// Positioning thresholds applied under high crowding risk.
const CROWDED_RATIO_HIGH: f64 = 2.5;
const CROWDED_RATIO_LOW: f64 = 0.5;
const CROWDED_LONG_PCT_HIGH: f64 = 75.0;
const CROWDED_LONG_PCT_LOW: f64 = 25.0;

/// Taker flow thresholds applied under medium crowding risk.
const TAKER_BUY_RATIO: f64 = 1.2;
const TAKER_SELL_RATIO: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct SignalDetector {
    config: DetectorConfig,
}

impl SignalDetector {
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Runs all checks over the snapshots, in any order.
    ///
    /// # Errors
    /// Returns [`PipelineError::DetectionFailed`] when the same factor appears
    /// twice or a live snapshot carries a non-finite metric.
    pub fn detect(&self, snapshots: &[FactorSnapshot]) -> Result<Detection, PipelineError> {
        if !self.config.enabled {
            return Ok(Detection {
                has_opportunity: true,
                signals: SignalSet::new(),
                bypassed: true,
            });
        }

        validate(snapshots)?;

        let mut signals = SignalSet::new();
        for snapshot in snapshots.iter().filter(|s| s.is_available()) {
            match snapshot {
                FactorSnapshot::Funding(s) => {
                    signals.extend(self.check_funding(s));
                }
                FactorSnapshot::PriceVolume(s) => {
                    signals.extend(self.check_price(s));
                    signals.extend(self.check_volume(s));
                }
                FactorSnapshot::MarketPressure(s) => {
                    signals.extend(self.check_market_pressure(s));
                }
                FactorSnapshot::Sentiment(s) => {
                    signals.extend(self.check_sentiment(s));
                }
            }
        }

        Ok(Detection {
            has_opportunity: signals.len() >= self.config.min_signal_count,
            signals,
            bypassed: false,
        })
    }

    /// Like [`detect`](Self::detect) but fails open: on error the gate is
    /// opened with no signals and the error is handed back for the run log.
    #[must_use]
    pub fn detect_or_open(&self, snapshots: &[FactorSnapshot]) -> (Detection, Option<PipelineError>) {
        match self.detect(snapshots) {
            Ok(detection) => (detection, None),
            Err(e) => {
                tracing::error!("Detector failed, assuming opportunity: {}", e);
                let detection = Detection {
                    has_opportunity: true,
                    signals: SignalSet::new(),
                    bypassed: false,
                };
                (detection, Some(e))
            }
        }
    }

    fn check_funding(&self, s: &FundingSnapshot) -> Option<SignalEvent> {
        let rate = s.current_rate;
        let extreme = self.config.funding_extreme_threshold;

        if s.is_extreme || rate.abs() >= extreme {
            if rate > extreme {
                return Some(SignalEvent::new(
                    SignalKind::FundingExtremeLong,
                    SignalStrength::Strong,
                    rate,
                    format!("Funding at {:.4}%, longs crowded, pullback risk", rate * 100.0),
                ));
            }
            if rate < -extreme {
                return Some(SignalEvent::new(
                    SignalKind::FundingExtremeShort,
                    SignalStrength::Strong,
                    rate,
                    format!("Funding at {:.4}%, shorts crowded, bounce risk", rate * 100.0),
                ));
            }
        }

        if rate.abs() > self.config.funding_change_threshold {
            if s.trend == FundingTrend::Rising && rate > 0.0 {
                return Some(SignalEvent::new(
                    SignalKind::FundingRisingFast,
                    SignalStrength::Medium,
                    rate,
                    format!("Funding climbing to {:.4}%, long sentiment heating up", rate * 100.0),
                ));
            }
            if s.trend == FundingTrend::Falling && rate < 0.0 {
                return Some(SignalEvent::new(
                    SignalKind::FundingFallingFast,
                    SignalStrength::Medium,
                    rate,
                    format!("Funding dropping to {:.4}%, short sentiment heating up", rate * 100.0),
                ));
            }
        }

        None
    }

    fn check_price(&self, s: &PriceVolumeSnapshot) -> Option<SignalEvent> {
        let pct = s.price_change_pct;
        if pct.abs() < self.config.price_change_threshold_pct {
            return None;
        }

        let (kind, verb) = if pct > 0.0 {
            (SignalKind::PriceSurge, "up")
        } else {
            (SignalKind::PricePlunge, "down")
        };

        Some(SignalEvent::new(
            kind,
            SignalStrength::Strong,
            pct,
            format!("Price {verb} {:.2}% over the window, volatility breakout", pct.abs()),
        ))
    }

    fn check_volume(&self, s: &PriceVolumeSnapshot) -> Option<SignalEvent> {
        if s.avg_volume <= 0.0 {
            return None;
        }

        let ratio = s.current_volume / s.avg_volume;
        if s.volume_trend == VolumeTrend::Expanding && ratio >= self.config.volume_surge_ratio {
            return Some(SignalEvent::new(
                SignalKind::VolumeSurge,
                SignalStrength::Medium,
                ratio,
                format!("Volume at {ratio:.2}x the average, {}", s.signal),
            ));
        }

        None
    }

    fn check_market_pressure(&self, s: &MarketPressureSnapshot) -> Option<SignalEvent> {
        let ratio = s.long_short_ratio;
        let long_pct = s.long_account_pct;

        match s.risk_level {
            RiskLevel::High => {
                if ratio > CROWDED_RATIO_HIGH || long_pct > CROWDED_LONG_PCT_HIGH {
                    Some(SignalEvent::new(
                        SignalKind::LongCrowding,
                        SignalStrength::Strong,
                        ratio,
                        format!(
                            "Long/short ratio {ratio:.2}, longs at {long_pct:.1}%, pullback risk"
                        ),
                    ))
                } else if ratio < CROWDED_RATIO_LOW || long_pct < CROWDED_LONG_PCT_LOW {
                    Some(SignalEvent::new(
                        SignalKind::ShortCrowding,
                        SignalStrength::Strong,
                        ratio,
                        format!(
                            "Long/short ratio {ratio:.2}, shorts at {:.1}%, squeeze risk",
                            100.0 - long_pct
                        ),
                    ))
                } else {
                    None
                }
            }
            RiskLevel::Medium => {
                let flow = s.buy_sell_ratio;
                if flow > TAKER_BUY_RATIO {
                    Some(SignalEvent::new(
                        SignalKind::AggressiveBuying,
                        SignalStrength::Medium,
                        flow,
                        format!("Taker buy/sell ratio {flow:.2}, buyers in control"),
                    ))
                } else if flow < TAKER_SELL_RATIO {
                    Some(SignalEvent::new(
                        SignalKind::AggressiveSelling,
                        SignalStrength::Medium,
                        flow,
                        format!("Taker buy/sell ratio {flow:.2}, sellers in control"),
                    ))
                } else {
                    None
                }
            }
            RiskLevel::Low => None,
        }
    }

    fn check_sentiment(&self, s: &SentimentSnapshot) -> Option<SignalEvent> {
        let score = s.score;
        if score.abs() < self.config.sentiment_threshold {
            return None;
        }

        let kind = if score > 0.0 {
            SignalKind::SentimentBullish
        } else {
            SignalKind::SentimentBearish
        };

        Some(SignalEvent::new(
            kind,
            SignalStrength::Medium,
            score,
            format!("News sentiment score {score:.2}, tone {}", s.tone.as_str()),
        ))
    }

    /// Human-readable summary of a detection.
    #[must_use]
    pub fn summary(&self, detection: &Detection) -> String {
        if detection.bypassed {
            return "Opportunity detection disabled, analysis always runs".to_string();
        }

        if !detection.has_opportunity {
            return format!(
                "No clear trading opportunity ({}/{} signals)",
                detection.signal_count(),
                self.config.min_signal_count
            );
        }

        let mut summary = format!(
            "Trading opportunity detected: {} signal(s)",
            detection.signal_count()
        );
        for signal in &detection.signals {
            summary.push_str(&format!(
                "\n  - [{}] {}: {}",
                signal.strength.as_str(),
                signal.kind.label(),
                signal.description
            ));
        }
        summary
    }
}

fn validate(snapshots: &[FactorSnapshot]) -> Result<(), PipelineError> {
    let mut seen: HashSet<FactorKind> = HashSet::new();
    for snapshot in snapshots {
        if !seen.insert(snapshot.kind()) {
            return Err(PipelineError::DetectionFailed(format!(
                "duplicate {} snapshot",
                snapshot.kind()
            )));
        }
        if snapshot.is_available() && !metrics_finite(snapshot) {
            return Err(PipelineError::DetectionFailed(format!(
                "non-finite metric in {} snapshot",
                snapshot.kind()
            )));
        }
    }
    Ok(())
}

fn metrics_finite(snapshot: &FactorSnapshot) -> bool {
    match snapshot {
        FactorSnapshot::Funding(s) => s.current_rate.is_finite(),
        FactorSnapshot::PriceVolume(s) => {
            s.price_change_pct.is_finite() && s.avg_volume.is_finite() && s.current_volume.is_finite()
        }
        FactorSnapshot::MarketPressure(s) => {
            s.long_short_ratio.is_finite() && s.long_account_pct.is_finite() && s.buy_sell_ratio.is_finite()
        }
        FactorSnapshot::Sentiment(s) => s.score.is_finite(),
    }
}
