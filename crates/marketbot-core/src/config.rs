//! Configuration and settings management
//!
//! Settings are layered from optional config files and the environment and
//! fixed for the lifetime of the process.

use crate::pipeline::auth::DEFAULT_LOOKUP_TIMEOUT;
use crate::pipeline::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use crate::pipeline::{AuthGate, RateLimiter};
use crate::users::{HttpUserDirectory, LookupError};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Build the layered configuration source shared by all settings structs.
///
/// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
/// `config/local` (all optional), `APP__*` variables, then plain
/// environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case keys
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Pipeline and backend settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineSettings {
    /// Rate limit window length in seconds
    #[serde(default = "default_window_secs")]
    pub rate_limit_window_secs: u64,
    /// Requests allowed per identity per window
    #[serde(default = "default_max_requests")]
    pub rate_limit_max_requests: u32,
    /// Upper bound on one user lookup, in milliseconds
    #[serde(default = "default_lookup_timeout_ms")]
    pub user_lookup_timeout_ms: u64,
    /// Marketplace backend base URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Bearer token for the backend API
    pub backend_api_token: Option<String>,
}

const fn default_window_secs() -> u64 {
    DEFAULT_WINDOW.as_secs()
}

const fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

#[allow(clippy::cast_possible_truncation)]
const fn default_lookup_timeout_ms() -> u64 {
    DEFAULT_LOOKUP_TIMEOUT.as_millis() as u64
}

fn default_backend_url() -> String {
    "http://localhost:3000/api".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            rate_limit_window_secs: default_window_secs(),
            rate_limit_max_requests: default_max_requests(),
            user_lookup_timeout_ms: default_lookup_timeout_ms(),
            backend_url: default_backend_url(),
            backend_api_token: None,
        }
    }
}

impl PipelineSettings {
    /// Load settings from files and environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(build_config()?)
    }

    /// Deserialize settings from an already built source.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a value has the wrong type.
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.try_deserialize()
    }

    /// Rate limit window as a `Duration`.
    #[must_use]
    pub const fn window_size(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Lookup timeout as a `Duration`.
    #[must_use]
    pub const fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.user_lookup_timeout_ms)
    }

    /// Rate limiter configured from these settings.
    #[must_use]
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.window_size(), self.rate_limit_max_requests)
    }

    /// Auth gate over the HTTP backend configured from these settings.
    ///
    /// # Errors
    ///
    /// Returns a `LookupError` if the backend client cannot be created.
    pub fn auth_gate(&self) -> Result<AuthGate, LookupError> {
        let directory = HttpUserDirectory::new(
            &self.backend_url,
            self.backend_api_token.clone(),
            self.lookup_timeout(),
        )?;
        Ok(AuthGate::new(Arc::new(directory), self.lookup_timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults_from_empty_source() -> Result<(), ConfigError> {
        let settings = PipelineSettings::from_config(Config::builder().build()?)?;

        assert_eq!(settings.window_size(), Duration::from_secs(60));
        assert_eq!(settings.rate_limit_max_requests, 20);
        assert_eq!(settings.lookup_timeout(), Duration::from_secs(5));
        assert!(settings.backend_api_token.is_none());
        Ok(())
    }

    #[test]
    fn test_values_from_file_source() -> Result<(), ConfigError> {
        let source = r#"
            rate_limit_window_secs = 30
            rate_limit_max_requests = 3
            user_lookup_timeout_ms = 750
            backend_url = "https://market.example/api"
            backend_api_token = "secret"
        "#;
        let config = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        let settings = PipelineSettings::from_config(config)?;

        assert_eq!(settings.window_size(), Duration::from_secs(30));
        assert_eq!(settings.lookup_timeout(), Duration::from_millis(750));
        assert_eq!(settings.rate_limiter().max_requests(), 3);
        assert_eq!(settings.backend_url, "https://market.example/api");
        assert_eq!(settings.backend_api_token.as_deref(), Some("secret"));
        Ok(())
    }

    #[test]
    fn test_auth_gate_uses_lookup_timeout() -> Result<(), LookupError> {
        let settings = PipelineSettings {
            user_lookup_timeout_ms: 1200,
            ..PipelineSettings::default()
        };
        assert_eq!(
            settings.auth_gate()?.lookup_timeout(),
            Duration::from_millis(1200)
        );
        Ok(())
    }

    #[test]
    fn test_auth_gate_rejects_bad_backend_url() {
        let settings = PipelineSettings {
            backend_url: "localhost api".to_string(),
            ..PipelineSettings::default()
        };
        assert!(settings.auth_gate().is_err());
    }

    #[test]
    fn test_zero_window_falls_back_to_minimum() {
        let settings = PipelineSettings {
            rate_limit_window_secs: 0,
            ..PipelineSettings::default()
        };
        assert_eq!(settings.rate_limiter().window_size(), Duration::from_secs(1));
    }
}
