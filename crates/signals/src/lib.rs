pub mod collector;
pub mod detector;
pub mod formatter;

// Re-export collectors for convenience
pub use collector::{
    Backoff, Collector, CollectorSet, FundingCollector, KlineCollector, MarketDataClient,
    MarketPressureCollector, NewsSentimentCollector, RetryPolicy, UpstreamError,
};

// Re-export detector
pub use detector::SignalDetector;

// Re-export formatter
pub use formatter::MarketBriefFormatter;
