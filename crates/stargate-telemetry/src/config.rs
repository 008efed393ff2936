//! Telemetry configuration

/// Logging sink configuration
///
/// Use [`TelemetryConfigBuilder`] for ergonomic construction.
///
/// # Example
///
/// ```rust
/// use stargate_telemetry::TelemetryConfig;
///
/// let config = TelemetryConfig::builder()
///     .service_name("stargate-api")
///     .service_version("1.0.0")
///     .log_level("info,stargate_auth=debug")
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup and shutdown records
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Log level filter (e.g., "info", "info,audit::auth=info"); `RUST_LOG` wins
    pub log_level: String,
    /// Enable JSON-formatted log output
    pub json_logs: bool,
    /// Write to stderr instead of stdout
    pub stderr_output: bool,
    /// Path the host serves the Prometheus scrape endpoint on; `None` leaves
    /// the recorder uninstalled
    #[cfg(feature = "prometheus")]
    pub prometheus_path: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "stargate-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            json_logs: true,
            stderr_output: false,
            #[cfg(feature = "prometheus")]
            prometheus_path: None,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }

    /// Install the logging sink described by this configuration
    ///
    /// Returns a guard that flushes buffered records when dropped.
    ///
    /// # Errors
    ///
    /// See [`TelemetryGuard::init`](crate::TelemetryGuard::init)
    pub fn init(self) -> Result<crate::TelemetryGuard, crate::TelemetryError> {
        crate::TelemetryGuard::init(self)
    }
}

/// Builder for [`TelemetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    service_version: Option<String>,
    log_level: Option<String>,
    json_logs: Option<bool>,
    stderr_output: Option<bool>,
    #[cfg(feature = "prometheus")]
    prometheus_path: Option<String>,
}

impl TelemetryConfigBuilder {
    /// Set the service name
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the service version
    #[must_use]
    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Set the log level filter
    ///
    /// Examples: "info", "debug", "warn,stargate_auth=debug,audit::auth=info"
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Enable or disable JSON log output
    #[must_use]
    pub fn json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = Some(enabled);
        self
    }

    /// Write to stderr instead of stdout
    #[must_use]
    pub fn stderr_output(mut self, enabled: bool) -> Self {
        self.stderr_output = Some(enabled);
        self
    }

    /// Install the Prometheus recorder, scraped at `path` on the host's router
    #[cfg(feature = "prometheus")]
    #[cfg_attr(docsrs, doc(cfg(feature = "prometheus")))]
    #[must_use]
    pub fn prometheus_path(mut self, path: impl Into<String>) -> Self {
        self.prometheus_path = Some(path.into());
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();

        TelemetryConfig {
            service_name: self.service_name.unwrap_or(defaults.service_name),
            service_version: self.service_version.unwrap_or(defaults.service_version),
            log_level: self.log_level.unwrap_or(defaults.log_level),
            json_logs: self.json_logs.unwrap_or(defaults.json_logs),
            stderr_output: self.stderr_output.unwrap_or(defaults.stderr_output),
            #[cfg(feature = "prometheus")]
            prometheus_path: self.prometheus_path.or(defaults.prometheus_path),
        }
    }
}
