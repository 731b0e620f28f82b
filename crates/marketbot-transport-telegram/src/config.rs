//! Telegram transport settings.

use config::{Config, ConfigError};
use marketbot_core::config::PipelineSettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Seconds between repeated throttling/registration notices to one user.
pub const NOTICE_COOLDOWN_SECS: u64 = 60;
/// Maximum number of identities tracked by the notice cooldown.
pub const NOTICE_COOLDOWN_CAPACITY: u64 = 10_000;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: String,
    /// Cooldown for repeated short-circuit notices, in seconds.
    #[serde(default = "default_notice_cooldown_secs")]
    pub notice_cooldown_secs: u64,
    /// Capacity of the notice cooldown cache.
    #[serde(default = "default_notice_cooldown_capacity")]
    pub notice_cooldown_capacity: u64,
}

const fn default_notice_cooldown_secs() -> u64 {
    NOTICE_COOLDOWN_SECS
}

const fn default_notice_cooldown_capacity() -> u64 {
    NOTICE_COOLDOWN_CAPACITY
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the token is missing.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(marketbot_core::config::build_config()?)
    }

    /// Deserialize settings from an already built source.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the token is missing or a value has the wrong type.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }

    /// Notice cooldown as a `Duration`.
    #[must_use]
    pub const fn notice_cooldown(&self) -> Duration {
        Duration::from_secs(self.notice_cooldown_secs)
    }
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Pipeline and backend settings.
    pub pipeline: Arc<PipelineSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(pipeline: PipelineSettings, telegram: TelegramSettings) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            telegram: Arc::new(telegram),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn settings_from(source: &str) -> Result<TelegramSettings, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        TelegramSettings::from_config(config)
    }

    #[test]
    fn test_cooldown_defaults() -> Result<(), ConfigError> {
        let settings = settings_from(r#"telegram_token = "123:abc""#)?;

        assert_eq!(settings.telegram_token, "123:abc");
        assert_eq!(settings.notice_cooldown(), Duration::from_secs(60));
        assert_eq!(settings.notice_cooldown_capacity, 10_000);
        Ok(())
    }

    #[test]
    fn test_cooldown_overrides() -> Result<(), ConfigError> {
        let settings = settings_from(
            r#"
            telegram_token = "123:abc"
            notice_cooldown_secs = 5
            notice_cooldown_capacity = 50
            "#,
        )?;

        assert_eq!(settings.notice_cooldown(), Duration::from_secs(5));
        assert_eq!(settings.notice_cooldown_capacity, 50);
        Ok(())
    }

    #[test]
    fn test_missing_token_is_an_error() {
        assert!(settings_from("notice_cooldown_secs = 5").is_err());
    }
}
