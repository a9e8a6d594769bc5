//! Signal events emitted by the opportunity detector.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of signal types the detector can raise.
///
/// Variant order is the canonical ordering of a [`SignalSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    FundingExtremeLong,
    FundingExtremeShort,
    FundingRisingFast,
    FundingFallingFast,
    PriceSurge,
    PricePlunge,
    VolumeSurge,
    LongCrowding,
    ShortCrowding,
    AggressiveBuying,
    AggressiveSelling,
    SentimentBullish,
    SentimentBearish,
}

impl SignalKind {
    pub const ALL: [SignalKind; 13] = [
        SignalKind::FundingExtremeLong,
        SignalKind::FundingExtremeShort,
        SignalKind::FundingRisingFast,
        SignalKind::FundingFallingFast,
        SignalKind::PriceSurge,
        SignalKind::PricePlunge,
        SignalKind::VolumeSurge,
        SignalKind::LongCrowding,
        SignalKind::ShortCrowding,
        SignalKind::AggressiveBuying,
        SignalKind::AggressiveSelling,
        SignalKind::SentimentBullish,
        SignalKind::SentimentBearish,
    ];

    /// Stable tag used in storage and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::FundingExtremeLong => "funding_extreme_long",
            SignalKind::FundingExtremeShort => "funding_extreme_short",
            SignalKind::FundingRisingFast => "funding_rising_fast",
            SignalKind::FundingFallingFast => "funding_falling_fast",
            SignalKind::PriceSurge => "price_surge",
            SignalKind::PricePlunge => "price_plunge",
            SignalKind::VolumeSurge => "volume_surge",
            SignalKind::LongCrowding => "long_crowding",
            SignalKind::ShortCrowding => "short_crowding",
            SignalKind::AggressiveBuying => "aggressive_buying",
            SignalKind::AggressiveSelling => "aggressive_selling",
            SignalKind::SentimentBullish => "sentiment_bullish",
            SignalKind::SentimentBearish => "sentiment_bearish",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            SignalKind::FundingExtremeLong => "Extreme long crowding (funding)",
            SignalKind::FundingExtremeShort => "Extreme short crowding (funding)",
            SignalKind::FundingRisingFast => "Funding rate rising fast",
            SignalKind::FundingFallingFast => "Funding rate falling fast",
            SignalKind::PriceSurge => "Price surge",
            SignalKind::PricePlunge => "Price plunge",
            SignalKind::VolumeSurge => "Volume surge",
            SignalKind::LongCrowding => "Longs overcrowded",
            SignalKind::ShortCrowding => "Shorts overcrowded",
            SignalKind::AggressiveBuying => "Aggressive taker buying",
            SignalKind::AggressiveSelling => "Aggressive taker selling",
            SignalKind::SentimentBullish => "News extremely bullish",
            SignalKind::SentimentBearish => "News extremely bearish",
        }
    }

    /// Parses a stored tag.
    ///
    /// # Errors
    /// Returns an error for unknown tags.
    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown signal kind: {s}"))
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal strength tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    Weak,
    Medium,
    Strong,
}

impl SignalStrength {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStrength::Weak => "weak",
            SignalStrength::Medium => "medium",
            SignalStrength::Strong => "strong",
        }
    }

    /// # Errors
    /// Returns an error for unknown tiers.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "weak" => Ok(SignalStrength::Weak),
            "medium" => Ok(SignalStrength::Medium),
            "strong" => Ok(SignalStrength::Strong),
            _ => Err(anyhow!("Unknown signal strength: {s}")),
        }
    }
}

/// A single triggered detector check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub kind: SignalKind,
    pub strength: SignalStrength,
    /// The metric value that crossed the threshold.
    pub value: f64,
    pub description: String,
}

impl SignalEvent {
    #[must_use]
    pub fn new(kind: SignalKind, strength: SignalStrength, value: f64, description: impl Into<String>) -> Self {
        Self {
            kind,
            strength,
            value,
            description: description.into(),
        }
    }
}

/// Signals raised in one detector pass, kept in canonical kind order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    signals: Vec<SignalEvent>,
}

impl SignalSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a signal, keeping canonical order. A second signal of the same
    /// kind replaces the first.
    pub fn push(&mut self, event: SignalEvent) {
        match self.signals.binary_search_by(|s| s.kind.cmp(&event.kind)) {
            Ok(idx) => self.signals[idx] = event,
            Err(idx) => self.signals.insert(idx, event),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalEvent> {
        self.signals.iter()
    }

    #[must_use]
    pub fn contains(&self, kind: SignalKind) -> bool {
        self.signals.iter().any(|s| s.kind == kind)
    }

    #[must_use]
    pub fn get(&self, kind: SignalKind) -> Option<&SignalEvent> {
        self.signals.iter().find(|s| s.kind == kind)
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<SignalKind> {
        self.signals.iter().map(|s| s.kind).collect()
    }
}

impl FromIterator<SignalEvent> for SignalSet {
    fn from_iter<T: IntoIterator<Item = SignalEvent>>(iter: T) -> Self {
        let mut set = SignalSet::new();
        for event in iter {
            set.push(event);
        }
        set
    }
}

impl Extend<SignalEvent> for SignalSet {
    fn extend<T: IntoIterator<Item = SignalEvent>>(&mut self, iter: T) {
        for event in iter {
            self.push(event);
        }
    }
}

impl<'a> IntoIterator for &'a SignalSet {
    type Item = &'a SignalEvent;
    type IntoIter = std::slice::Iter<'a, SignalEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.signals.iter()
    }
}

/// Detector verdict for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub has_opportunity: bool,
    pub signals: SignalSet,
    /// True when detection was disabled and the gate was bypassed.
    pub bypassed: bool,
}

impl Detection {
    #[must_use]
    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_round_trip() {
        for kind in SignalKind::ALL {
            assert_eq!(SignalKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(SignalKind::parse("bogus").is_err());
    }

    #[test]
    fn test_strength_ordering() {
        assert!(SignalStrength::Strong > SignalStrength::Medium);
        assert!(SignalStrength::Medium > SignalStrength::Weak);
    }

    #[test]
    fn test_signal_set_canonical_order() {
        let a = SignalEvent::new(SignalKind::VolumeSurge, SignalStrength::Medium, 2.5, "v");
        let b = SignalEvent::new(SignalKind::FundingExtremeLong, SignalStrength::Strong, 0.0012, "f");
        let c = SignalEvent::new(SignalKind::SentimentBearish, SignalStrength::Medium, -0.6, "s");

        let forward: SignalSet = vec![a.clone(), b.clone(), c.clone()].into_iter().collect();
        let reverse: SignalSet = vec![c, b, a].into_iter().collect();

        assert_eq!(forward, reverse);
        assert_eq!(
            forward.kinds(),
            vec![SignalKind::FundingExtremeLong, SignalKind::VolumeSurge, SignalKind::SentimentBearish]
        );
    }

    #[test]
    fn test_signal_set_replaces_duplicate_kind() {
        let mut set = SignalSet::new();
        set.push(SignalEvent::new(SignalKind::PriceSurge, SignalStrength::Strong, 5.5, "first"));
        set.push(SignalEvent::new(SignalKind::PriceSurge, SignalStrength::Strong, 6.0, "second"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(SignalKind::PriceSurge).unwrap().description, "second");
    }
}
