//! Host settings
//!
//! Loaded from an optional TOML/YAML/JSON file, then overridden by
//! `STARGATE__`-prefixed environment variables with `__` between nested keys:
//!
//! ```text
//! STARGATE__LISTEN_ADDR=0.0.0.0:9000
//! STARGATE__AUTH__AUTHORITY=https://idp.example.com
//! STARGATE__AUTH__VALID_AUDIENCES=stargate-api,admin-console
//! STARGATE__LOGGING__JSON=false
//! STARGATE__METRICS__PATH=/internal/metrics
//! ```

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use stargate_auth::{AuthOptions, ConfigError};
use stargate_telemetry::TelemetryConfig;

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "STARGATE";

/// Settings loading errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// The sources could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Authentication options are incomplete
    #[error(transparent)]
    Auth(#[from] ConfigError),

    /// The metrics path would not be routable or would shadow another route
    #[error("Invalid metrics path: {0}")]
    MetricsPath(String),
}

/// Logging sink settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level filter, overridden by `RUST_LOG`
    pub level: String,
    /// JSON records instead of human-readable output
    pub json: bool,
    /// Write to stderr instead of stdout
    pub stderr: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            stderr: false,
        }
    }
}

/// Prometheus scrape endpoint settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Install the recorder and serve the scrape endpoint
    pub enabled: bool,
    /// Path of the scrape endpoint, served without authentication
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

impl MetricsSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        let path = self.path.as_str();
        if !path.starts_with('/') || path.len() < 2 {
            return Err(SettingsError::MetricsPath(format!(
                "{path} must start with '/' and name a route"
            )));
        }
        if path == "/health" || path == "/api" || path.starts_with("/api/") {
            return Err(SettingsError::MetricsPath(format!(
                "{path} collides with an application route"
            )));
        }
        Ok(())
    }
}

/// Everything the host process is configured with
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    /// Socket address the HTTP server binds
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Logging sink
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Prometheus scrape endpoint
    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Bearer authentication
    #[serde(default)]
    pub auth: AuthOptions,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl AppSettings {
    /// Load settings from `path` (if any) and the process environment
    ///
    /// # Errors
    ///
    /// - [`SettingsError::FileNotFound`] / [`SettingsError::UnsupportedFormat`]
    ///   for a bad `path`
    /// - [`SettingsError::Load`] if a source cannot be parsed
    /// - [`SettingsError::Auth`] if the authentication options are incomplete
    /// - [`SettingsError::MetricsPath`] if the scrape path is unusable
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with(path, environment())
    }

    fn load_with(path: Option<&Path>, environment: Environment) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(SettingsError::FileNotFound(path.to_path_buf()));
            }
            let format = match path.extension().and_then(|s| s.to_str()) {
                Some("toml") => FileFormat::Toml,
                Some("yaml" | "yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(SettingsError::UnsupportedFormat),
            };
            let name = path.to_str().ok_or(SettingsError::UnsupportedFormat)?;
            builder = builder.add_source(File::new(name, format));
        }

        // Environment variables override file settings
        let settings: Self = builder.add_source(environment).build()?.try_deserialize()?;
        settings.auth.validate()?;
        if settings.metrics.enabled {
            settings.metrics.validate()?;
        }
        Ok(settings)
    }

    /// Telemetry configuration for this service
    pub fn telemetry_config(&self, service_name: &str) -> TelemetryConfig {
        let builder = TelemetryConfig::builder()
            .service_name(service_name)
            .service_version(env!("CARGO_PKG_VERSION"))
            .log_level(self.logging.level.clone())
            .json_logs(self.logging.json)
            .stderr_output(self.logging.stderr);

        if self.metrics.enabled {
            builder.prometheus_path(self.metrics.path.clone()).build()
        } else {
            builder.build()
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("auth.valid_audiences")
}
