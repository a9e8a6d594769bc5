//! Bounded retry policy for upstream calls.
//!
//! The policy itself is pure data; [`RetryPolicy::retry`] drives any async
//! operation under it and sleeps on the tokio timer between attempts.

use market_sentinel_core::{BackoffKind, RetryConfig};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    Exponential { factor: f64, max_delay: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    #[must_use]
    pub fn exponential(max_attempts: u32, delay: Duration, factor: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Exponential { factor, max_delay },
        }
    }

    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        match config.backoff {
            BackoffKind::Fixed => Self::fixed(config.max_attempts, config.delay()),
            BackoffKind::Exponential => Self::exponential(
                config.max_attempts,
                config.delay(),
                config.factor,
                config.max_delay(),
            ),
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { factor, max_delay } => {
                let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
                let secs = self.delay.as_secs_f64() * factor.powi(exponent);
                if secs.is_finite() && secs >= 0.0 {
                    Duration::from_secs_f64(secs).min(max_delay)
                } else {
                    max_delay
                }
            }
        }
    }

    /// Runs `op` until it succeeds or attempts are exhausted, returning the last error.
    ///
    /// # Errors
    /// Returns the error from the final attempt.
    pub async fn retry<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation = label,
                        attempt,
                        max_attempts = attempts,
                        "Attempt failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        operation = label,
                        attempts,
                        "All attempts failed: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}
