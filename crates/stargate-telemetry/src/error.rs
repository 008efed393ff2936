//! Telemetry error types

use thiserror::Error;

/// Errors that can occur while installing the logging sink or metrics recorder
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid configuration
    #[error("Invalid telemetry configuration: {0}")]
    InvalidConfiguration(String),

    /// A global subscriber is already installed, or installation failed
    #[error("Tracing subscriber error: {0}")]
    TracingError(String),

    /// The metrics recorder could not be installed
    #[cfg(feature = "prometheus")]
    #[error("Metrics error: {0}")]
    MetricsError(String),
}

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;
