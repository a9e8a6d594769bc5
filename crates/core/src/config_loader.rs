use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::Path;

/// Default location of the main configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

/// Prefix for structured environment overrides, e.g. `SENTINEL_DETECTOR__MIN_SIGNAL_COUNT=3`.
pub const ENV_PREFIX: &str = "SENTINEL_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads application configuration by merging defaults, TOML, JSON, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the result is invalid.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration rooted at a specific TOML file.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the result is invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let json = path.with_extension("json");
        Self::extract(
            Self::base()
                .merge(Toml::file(path))
                .join(Json::file(json)),
        )
        .with_context(|| format!("failed to load configuration from {}", path.display()))
    }

    /// Loads application configuration with a specific profile overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the result is invalid.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        Self::extract(
            Self::base()
                .merge(Toml::file(DEFAULT_CONFIG_PATH))
                .merge(Toml::file(format!("config/Config.{profile}.toml"))),
        )
        .with_context(|| format!("failed to load configuration profile '{profile}'"))
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
    }

    fn extract(figment: Figment) -> Result<AppConfig> {
        let config: AppConfig = figment
            .merge(credential("ANTHROPIC_API_KEY", "reasoner.api_key"))
            .merge(credential("LLM_API_KEY", "reasoner.api_key"))
            .merge(credential("LLM_API_BASE_URL", "reasoner.base_url"))
            .merge(credential("CRYPTOCOMPARE_API_KEY", "news.api_key"))
            .merge(credential("ALERT_WEBHOOK_URL", "alert.webhook_url"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        tracing::debug!(symbols = ?config.symbols, "configuration loaded");
        Ok(config)
    }
}

/// Maps a conventional unprefixed variable onto a nested config key.
fn credential(var: &'static str, key: &'static str) -> Env {
    Env::raw().only(&[var]).map(move |_| key.into())
}
