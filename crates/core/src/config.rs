//! Application configuration.
//!
//! One immutable [`AppConfig`] is built at start-up (see
//! [`ConfigLoader`](crate::ConfigLoader)) and handed to every component. No
//! component reads environment variables or files on its own.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Instruments monitored by the scheduler.
    pub symbols: Vec<String>,
    pub database: DatabaseConfig,
    pub collector: CollectorConfig,
    pub retry: RetryConfig,
    pub detector: DetectorConfig,
    pub reasoner: ReasonerConfig,
    pub news: NewsConfig,
    pub alert: AlertConfig,
    pub scheduler: SchedulerConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Upstream market-data settings shared by the four collectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub futures_api_url: String,
    pub kline_interval: String,
    pub kline_limit: u32,
    pub funding_history_limit: u32,
    pub request_timeout_secs: u64,
    pub rate_limit_per_second: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff: BackoffKind,
    /// Multiplier applied per attempt when `backoff = "exponential"`.
    pub factor: f64,
    pub max_delay_ms: u64,
}

/// Thresholds used by the opportunity detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub enabled: bool,
    pub funding_extreme_threshold: f64,
    pub funding_change_threshold: f64,
    pub price_change_threshold_pct: f64,
    pub volume_surge_ratio: f64,
    pub sentiment_threshold: f64,
    pub min_signal_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub headline_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub webhook_url: Option<String>,
    pub max_chars: usize,
    pub daily_report: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub analysis_interval_mins: u64,
    pub tracking_interval_mins: u64,
    pub tracking_lookback_hours: i64,
    pub outcome_timeout_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub accuracy_window_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            database: DatabaseConfig::default(),
            collector: CollectorConfig::default(),
            retry: RetryConfig::default(),
            detector: DetectorConfig::default(),
            reasoner: ReasonerConfig::default(),
            news: NewsConfig::default(),
            alert: AlertConfig::default(),
            scheduler: SchedulerConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/market_sentinel.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            futures_api_url: "https://fapi.binance.com".to_string(),
            kline_interval: "1h".to_string(),
            kline_limit: 24,
            funding_history_limit: 24,
            request_timeout_secs: 30,
            rate_limit_per_second: 20,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1_000,
            backoff: BackoffKind::Fixed,
            factor: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            funding_extreme_threshold: 0.001,
            funding_change_threshold: 0.0005,
            price_change_threshold_pct: 5.0,
            volume_surge_ratio: 2.0,
            sentiment_threshold: 0.5,
            min_signal_count: 2,
        }
    }
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: None,
            model: "claude-sonnet-4-5-20250929".to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://min-api.cryptocompare.com".to_string(),
            api_key: None,
            headline_count: 5,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_chars: 3_000,
            daily_report: false,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            analysis_interval_mins: 15,
            tracking_interval_mins: 60,
            tracking_lookback_hours: 48,
            outcome_timeout_hours: 24,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            accuracy_window_days: 30,
        }
    }
}

impl AppConfig {
    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("at least one symbol must be configured");
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            bail!("symbols must not be blank");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.detector.min_signal_count == 0 {
            bail!("detector.min_signal_count must be at least 1");
        }
        if self.scheduler.analysis_interval_mins == 0 || self.scheduler.tracking_interval_mins == 0 {
            bail!("scheduler intervals must be non-zero");
        }
        if self.scheduler.outcome_timeout_hours <= 0 {
            bail!("scheduler.outcome_timeout_hours must be positive");
        }
        if self.scheduler.tracking_lookback_hours <= self.scheduler.outcome_timeout_hours {
            bail!("scheduler.tracking_lookback_hours must exceed outcome_timeout_hours");
        }
        if self.collector.rate_limit_per_second == 0 {
            bail!("collector.rate_limit_per_second must be non-zero");
        }
        Ok(())
    }
}

impl RetryConfig {
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl CollectorConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_mins * 60)
    }

    #[must_use]
    pub fn tracking_interval(&self) -> Duration {
        Duration::from_secs(self.tracking_interval_mins * 60)
    }

    #[must_use]
    pub fn tracking_lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.tracking_lookback_hours)
    }

    #[must_use]
    pub fn outcome_timeout(&self) -> chrono::Duration {
        chrono::Duration::hours(self.outcome_timeout_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detector.min_signal_count, 2);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.scheduler.tracking_interval(), Duration::from_secs(3600));
        assert_eq!(config.scheduler.outcome_timeout(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_validate_rejects_empty_symbols() {
        let config = AppConfig {
            symbols: vec![],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quorum() {
        let mut config = AppConfig::default();
        config.detector.min_signal_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = AppConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_section_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"detector": {"min_signal_count": 3}}"#)
            .expect("partial config should deserialize");
        assert_eq!(config.detector.min_signal_count, 3);
        assert!((config.detector.funding_extreme_threshold - 0.001).abs() < f64::EPSILON);
        assert_eq!(config.symbols.len(), 2);
    }
}
