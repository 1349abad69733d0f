//! Configuration management for the Field Health Analysis Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with FHA_ prefix

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;

use crate::external::token::ServiceAccount;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Remote sensing backend configuration
    pub earth_engine: EarthEngineConfig,

    /// Optical imagery compositing parameters
    pub imagery: ImageryConfig,

    /// Field refresh scheduling
    pub refresh: RefreshConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EarthEngineConfig {
    /// Cloud project the requests are billed to
    pub project: String,

    /// Service account issuer email
    pub service_account_email: Option<String>,

    /// Service account RSA private key (PEM)
    pub private_key: Option<String>,

    /// REST API base URL
    pub api_base_url: String,

    /// OAuth2 token endpoint
    pub token_url: String,

    /// OAuth2 scope requested for the access token
    pub scope: String,

    /// Any highly-available HTTPS endpoint returning a `Date` header
    pub clock_probe_url: String,

    /// Clock probe timeout in seconds
    pub clock_probe_timeout_secs: u64,

    /// Timeout for individual backend requests in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageryConfig {
    /// Scenes with a larger cloudy pixel percentage are rejected
    pub cloud_cover_ceiling: f64,

    /// Length of the analysis window when no start date is given
    pub default_window_days: i64,

    /// Zonal reduction scale in meters
    pub scale_meters: f64,

    /// Upper bound on pixels processed by a zonal reduction
    pub max_pixels: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// Seconds between periodic refresh cycles
    pub interval_secs: u64,

    /// Seconds before a single field analysis is abandoned
    pub analysis_timeout_secs: u64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("FHA_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("earth_engine.project", "earthengine-legacy")?
            .set_default("earth_engine.api_base_url", EarthEngineConfig::DEFAULT_API_BASE_URL)?
            .set_default("earth_engine.token_url", EarthEngineConfig::DEFAULT_TOKEN_URL)?
            .set_default("earth_engine.scope", EarthEngineConfig::DEFAULT_SCOPE)?
            .set_default("earth_engine.clock_probe_url", EarthEngineConfig::DEFAULT_CLOCK_PROBE_URL)?
            .set_default("earth_engine.clock_probe_timeout_secs", 3)?
            .set_default("earth_engine.request_timeout_secs", 60)?
            .set_default("imagery.cloud_cover_ceiling", 20.0)?
            .set_default("imagery.default_window_days", shared::DEFAULT_WINDOW_DAYS)?
            .set_default("imagery.scale_meters", 10.0)?
            .set_default("imagery.max_pixels", 1e9)?
            .set_default("refresh.interval_secs", 300)?
            .set_default("refresh.analysis_timeout_secs", 120)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (FHA_ prefix)
            .add_source(
                Environment::with_prefix("FHA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl EarthEngineConfig {
    pub const DEFAULT_API_BASE_URL: &'static str = "https://earthengine.googleapis.com/v1";
    pub const DEFAULT_TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/earthengine";
    pub const DEFAULT_CLOCK_PROBE_URL: &'static str = "https://www.google.com";

    /// Service account credentials, or `None` when either half is missing.
    ///
    /// Keys pasted into environment variables usually carry escaped newlines,
    /// which are restored here.
    pub fn service_account(&self) -> Option<ServiceAccount> {
        let email = self.service_account_email.as_deref().map(str::trim)?;
        let key = self.private_key.as_deref().map(str::trim)?;
        if email.is_empty() || key.is_empty() {
            return None;
        }
        Some(ServiceAccount {
            client_email: email.to_string(),
            private_key: key.replace("\\n", "\n"),
        })
    }

    pub fn clock_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.clock_probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig::default(),
            earth_engine: EarthEngineConfig::default(),
            imagery: ImageryConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for EarthEngineConfig {
    fn default() -> Self {
        Self {
            project: "earthengine-legacy".to_string(),
            service_account_email: None,
            private_key: None,
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
            token_url: Self::DEFAULT_TOKEN_URL.to_string(),
            scope: Self::DEFAULT_SCOPE.to_string(),
            clock_probe_url: Self::DEFAULT_CLOCK_PROBE_URL.to_string(),
            clock_probe_timeout_secs: 3,
            request_timeout_secs: 60,
        }
    }
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            cloud_cover_ceiling: 20.0,
            default_window_days: shared::DEFAULT_WINDOW_DAYS,
            scale_meters: 10.0,
            max_pixels: 1e9,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            analysis_timeout_secs: 120,
        }
    }
}
