pub mod analysis;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod factor;
pub mod traits;

pub use analysis::{AnalysisResult, ParsedAdvice, PositionSize, Trend};
pub use config::{
    AlertConfig, AppConfig, BackoffKind, CollectorConfig, DatabaseConfig, DetectorConfig,
    NewsConfig, ReasonerConfig, ReportConfig, RetryConfig, SchedulerConfig,
};
pub use config_loader::ConfigLoader;
pub use error::PipelineError;
pub use events::{Detection, SignalEvent, SignalKind, SignalSet, SignalStrength};
pub use factor::{
    FactorKind, FactorSnapshot, FundingSnapshot, FundingTrend, MarketPressureSnapshot,
    PriceTrend, PriceVolumeSnapshot, RiskLevel, SentimentSnapshot, SentimentTone, VolumeTrend,
};
pub use traits::{Alerter, PriceSource, Reasoner};
