//! Application configuration loaded from a TOML file.
//!
//! The farm layer's `[retry]`, `[session]` and `[fleet]` tables sit next to
//! `[service]` (where to connect and how to present) and `[logging]`. Every
//! key is optional.

use std::path::Path;

use serde::Deserialize;
use sprout_farm::{FarmConfig, FleetConfig, RetryConfig, SessionTimings};
use sprout_session::DEFAULT_EXTENSION_ID;

use crate::SproutError;

/// Default location of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

/// Remote endpoints and client presentation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Streaming endpoint (`ws://` or `wss://`).
    pub ws_url: String,
    /// Base URL of the account API, without a trailing slash.
    pub api_url: String,
    pub extension_id: String,
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://ws.sixpence.ai/".into(),
            api_url: "https://backend.sixpence.ai/api/service".into(),
            extension_id: DEFAULT_EXTENSION_ID.into(),
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

impl ServiceConfig {
    /// `Origin` presented to both the streaming endpoint and the API.
    pub fn origin(&self) -> String {
        format!("chrome-extension://{}", self.extension_id)
    }
}

/// `[logging]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// The whole config file.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub retry: RetryConfig,
    pub session: SessionTimings,
    pub fleet: FleetConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads, parses and validates the file at `path`.
    pub fn load(path: &Path) -> Result<Self, SproutError> {
        let text = std::fs::read_to_string(path).map_err(|source| SproutError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses and validates TOML text.
    pub fn parse(text: &str) -> Result<Self, SproutError> {
        let config: Self =
            toml::from_str(text).map_err(|e| SproutError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SproutError> {
        self.farm().validate()?;
        let service = &self.service;
        if !(service.ws_url.starts_with("ws://") || service.ws_url.starts_with("wss://")) {
            return Err(SproutError::Config(format!(
                "service.ws_url must be a ws:// or wss:// URL, got `{}`",
                service.ws_url
            )));
        }
        if !(service.api_url.starts_with("http://") || service.api_url.starts_with("https://")) {
            return Err(SproutError::Config(format!(
                "service.api_url must be an http(s) URL, got `{}`",
                service.api_url
            )));
        }
        if service.extension_id.is_empty() {
            return Err(SproutError::Config("service.extension_id is empty".into()));
        }
        Ok(())
    }

    /// The farm-layer subset.
    pub fn farm(&self) -> FarmConfig {
        FarmConfig {
            retry: self.retry.clone(),
            session: self.session.clone(),
            fleet: self.fleet.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.session.heartbeat_interval, 30);
        assert_eq!(config.fleet.threads, 3);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.service.origin(), format!("chrome-extension://{DEFAULT_EXTENSION_ID}"));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = AppConfig::parse(include_str!("../../../config/config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_parse_full_file() {
        let config = AppConfig::parse(
            r#"
            [retry]
            max_attempts = 4
            rate_limit_delay = 90

            [session]
            receive_timeout = 50

            [fleet]
            threads = 8
            delay_before_start = { min = 1, max = 2 }

            [service]
            ws_url = "ws://127.0.0.1:9000/"
            api_url = "http://127.0.0.1:9001/api"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.rate_limit_delay, 90);
        assert_eq!(config.retry.delay_seconds, 5);
        assert_eq!(config.session.receive_timeout, 50);
        assert_eq!(config.fleet.threads, 8);
        assert_eq!(config.service.ws_url, "ws://127.0.0.1:9000/");
        assert_eq!(config.service.extension_id, DEFAULT_EXTENSION_ID);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.farm().fleet.delay_before_start.max, 2);
    }

    #[test]
    fn test_parse_rejects_out_of_range_farm_values() {
        let err = AppConfig::parse("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, SproutError::Farm(_)));
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_parse_rejects_bad_ws_url() {
        let err = AppConfig::parse("[service]\nws_url = \"https://example.com\"\n").unwrap_err();
        assert!(matches!(err, SproutError::Config(_)));
    }

    #[test]
    fn test_parse_rejects_invalid_toml() {
        let err = AppConfig::parse("[retry\n").unwrap_err();
        assert!(matches!(err, SproutError::Config(_)));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = AppConfig::load(Path::new("/nonexistent/sprout/config.toml")).unwrap_err();
        assert!(matches!(err, SproutError::Io { .. }));
    }
}
