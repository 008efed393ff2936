//! Telemetry initialization
//!
//! Provides the [`TelemetryGuard`] for managing the logging sink's lifecycle
//! and, with the `prometheus` feature, the [`MetricsHandle`] the host renders
//! its scrape endpoint from.

use crate::{TelemetryConfig, TelemetryError};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    Registry, filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Guard that owns the logging sink
///
/// Records are written by a background worker. When the guard is dropped it
/// logs a shutdown record, then the worker flushes everything still buffered
/// and closes the output.
///
/// **The guard MUST outlive all traced code in the application.** Records
/// emitted after it is dropped are lost.
///
/// ```rust,ignore
/// let _telemetry = TelemetryConfig::default().init()?;
/// run_server().await?;
/// // guard dropped here, after the server has stopped
/// ```
pub struct TelemetryGuard {
    config: TelemetryConfig,
    #[cfg(feature = "prometheus")]
    metrics: Option<MetricsHandle>,
    // Dropped after `Drop::drop` runs, so the shutdown record is flushed too
    _worker: WorkerGuard,
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handle to the installed Prometheus recorder
#[cfg(feature = "prometheus")]
#[derive(Clone)]
pub struct MetricsHandle {
    handle: metrics_exporter_prometheus::PrometheusHandle,
    path: String,
}

#[cfg(feature = "prometheus")]
impl MetricsHandle {
    /// Wrap a recorder handle served at `path`
    pub fn new(
        handle: metrics_exporter_prometheus::PrometheusHandle,
        path: impl Into<String>,
    ) -> Self {
        Self {
            handle,
            path: path.into(),
        }
    }

    /// Scrape endpoint path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current values in the Prometheus text exposition format
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[cfg(feature = "prometheus")]
impl std::fmt::Debug for MetricsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl TelemetryGuard {
    /// Install the global subscriber described by `config`, and the global
    /// metrics recorder when a Prometheus path is configured
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::InvalidConfiguration`] if the log level does not parse
    /// - [`TelemetryError::TracingError`] if a global subscriber is already set
    /// - `TelemetryError::MetricsError` if a global metrics recorder is already set
    pub fn init(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let env_filter = env_filter(&config)?;

        let (writer, worker) = if config.stderr_output {
            tracing_appender::non_blocking(std::io::stderr())
        } else {
            tracing_appender::non_blocking(std::io::stdout())
        };

        init_subscriber(&config, env_filter, writer)?;

        info!(
            service_name = %config.service_name,
            service_version = %config.service_version,
            json_logs = config.json_logs,
            stderr_output = config.stderr_output,
            "Stargate telemetry initialized"
        );

        #[cfg(feature = "prometheus")]
        let metrics = match config.prometheus_path.as_deref() {
            Some(path) => Some(init_prometheus(path)?),
            None => None,
        };

        Ok(Self {
            config,
            #[cfg(feature = "prometheus")]
            metrics,
            _worker: worker,
        })
    }

    /// Handle to the Prometheus recorder, if one was installed
    #[cfg(feature = "prometheus")]
    #[cfg_attr(docsrs, doc(cfg(feature = "prometheus")))]
    #[must_use]
    pub fn metrics_handle(&self) -> Option<MetricsHandle> {
        self.metrics.clone()
    }

    /// Get the service name
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        info!(
            service_name = %self.config.service_name,
            "Shutting down Stargate telemetry"
        );
    }
}

/// `RUST_LOG` when set, otherwise the configured level
fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::InvalidConfiguration(format!("Invalid log level: {e}")))
}

fn init_subscriber(
    config: &TelemetryConfig,
    env_filter: EnvFilter,
    writer: NonBlocking,
) -> Result<(), TelemetryError> {
    // The layer types differ, so each format needs its own init path
    if config.json_logs {
        let fmt_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .json();

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(false)
            .pretty();

        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::TracingError(e.to_string()))
    }
}

/// Install the process-wide Prometheus recorder
#[cfg(feature = "prometheus")]
fn init_prometheus(path: &str) -> Result<MetricsHandle, TelemetryError> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    if !path.starts_with('/') {
        return Err(TelemetryError::InvalidConfiguration(format!(
            "Prometheus path must start with '/': {path}"
        )));
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsError(e.to_string()))?;

    info!(path = %path, "Prometheus metrics recorder installed");

    Ok(MetricsHandle::new(handle, path))
}
