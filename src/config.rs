use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::AppError;

/// Application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Listener configuration
    pub server: ServerConfig,
    /// Affix data provider configuration
    pub upstream: UpstreamConfig,
    /// SMS gateway configuration
    pub twilio: TwilioConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 8080)
    pub port: u16,
    /// Route the SMS gateway posts to (default: /sms)
    pub webhook_path: String,
}

/// Affix provider configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpstreamConfig {
    /// API base URL (default: https://raider.io)
    pub base_url: String,
    /// Region query parameter (default: us)
    pub region: String,
    /// Locale query parameter (default: en)
    pub locale: String,
    /// Outbound request timeout in seconds (default: 10)
    pub timeout_seconds: u64,
}

/// Twilio webhook configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TwilioConfig {
    /// Check X-Twilio-Signature on inbound requests (default: false)
    pub verify_signatures: bool,
    /// Twilio Auth Token, required when verifying
    pub auth_token: Option<String>,
    /// Public webhook URL as configured in Twilio, required when verifying
    pub webhook_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level or filter directive (default: info)
    pub level: String,
    /// Log format: pretty or json (default: pretty)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            webhook_path: "/sms".to_string(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://raider.io".to_string(),
            region: "us".to_string(),
            locale: "en".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, AppError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides (gitignored)
            .add_source(File::with_name("config/local").required(false))
            // e.g. AFFIXSMS__SERVER__PORT=9000
            .add_source(Environment::with_prefix("AFFIXSMS").separator("__"));

        Self::build(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, AppError> {
        Ok(Config::builder().add_source(Config::try_from(&AppConfig::default())?))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, AppError> {
        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.server.webhook_path.starts_with('/') {
            return Err(AppError::Invalid(format!(
                "server.webhook_path must start with '/': {}",
                self.server.webhook_path
            )));
        }
        if self.server.webhook_path == "/healthz" {
            return Err(AppError::Invalid(
                "server.webhook_path collides with /healthz".to_string(),
            ));
        }
        if self.upstream.timeout_seconds == 0 {
            return Err(AppError::Invalid(
                "upstream.timeout_seconds must be >= 1".to_string(),
            ));
        }
        url::Url::parse(&self.upstream.base_url)
            .map_err(|e| AppError::Invalid(format!("upstream.base_url: {e}")))?;
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Invalid(format!(
                "logging.format={} is not supported; supported: pretty, json",
                self.logging.format
            )));
        }
        if self.twilio.verify_signatures {
            let missing = |v: &Option<String>| v.as_deref().map(str::is_empty).unwrap_or(true);
            if missing(&self.twilio.auth_token) {
                return Err(AppError::Invalid(
                    "twilio.auth_token is required when twilio.verify_signatures=true".to_string(),
                ));
            }
            if missing(&self.twilio.webhook_url) {
                return Err(AppError::Invalid(
                    "twilio.webhook_url is required when twilio.verify_signatures=true"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}
