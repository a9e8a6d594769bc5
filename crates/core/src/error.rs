//! Stage-level error taxonomy for the analysis pipeline.
//!
//! Stages never propagate these as `Err` out of a run. Each is rendered with
//! `Display` into the run's accumulated error list.

use crate::factor::FactorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A collector exhausted its retries.
    #[error("collection failed for {factor}: {reason}")]
    CollectionFailed {
        factor: FactorKind,
        reason: String,
    },

    /// The detector could not evaluate its inputs; the gate fails open.
    #[error("detection failed: {0}")]
    DetectionFailed(String),

    /// Formatting or the reasoning call failed; no result is produced.
    #[error("reasoning failed: {0}")]
    ReasoningFailed(String),

    /// Writing the analysis to the store failed.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// An alert could not be delivered.
    #[error("alert failed: {0}")]
    AlertFailed(String),
}

impl PipelineError {
    pub fn collection(factor: FactorKind, reason: impl ToString) -> Self {
        Self::CollectionFailed {
            factor,
            reason: reason.to_string(),
        }
    }

    /// True for failures that end the run without a result.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::CollectionFailed { factor, .. } => factor.is_load_bearing(),
            Self::ReasoningFailed(_) => true,
            Self::DetectionFailed(_) | Self::PersistenceFailed(_) | Self::AlertFailed(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_fatality_follows_load_bearing() {
        assert!(PipelineError::collection(FactorKind::Funding, "timeout").is_fatal());
        assert!(!PipelineError::collection(FactorKind::Sentiment, "timeout").is_fatal());
    }

    #[test]
    fn test_display_includes_factor() {
        let err = PipelineError::collection(FactorKind::PriceVolume, "HTTP 503");
        assert_eq!(err.to_string(), "collection failed for price_volume: HTTP 503");
    }

    #[test]
    fn test_non_fatal_stages() {
        assert!(!PipelineError::AlertFailed("x".into()).is_fatal());
        assert!(!PipelineError::PersistenceFailed("x".into()).is_fatal());
        assert!(!PipelineError::DetectionFailed("x".into()).is_fatal());
        assert!(PipelineError::ReasoningFailed("x".into()).is_fatal());
    }
}
