//! Logging sink construction for Stargate services
//!
//! The host builds a [`TelemetryConfig`], calls [`TelemetryConfig::init`] once
//! at startup and keeps the returned [`TelemetryGuard`] alive until every
//! other component has shut down. Dropping the guard flushes buffered records
//! and closes the sink.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stargate_telemetry::TelemetryConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let _telemetry = TelemetryConfig::builder()
//!         .service_name("stargate-api")
//!         .json_logs(true)
//!         .build()
//!         .init()?;
//!
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```
//!
//! # Metrics
//!
//! With the `prometheus` feature and
//! [`TelemetryConfigBuilder::prometheus_path`] set, `init` also installs the
//! global `metrics` recorder. The host serves
//! [`MetricsHandle::render`] at [`MetricsHandle::path`].
//!
//! # Targets
//!
//! - `audit::auth` - authentication audit records
//! - `stargate::security` - insecure transport usage

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

mod config;
mod error;
mod init;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::{TelemetryError, TelemetryResult};
#[cfg(feature = "prometheus")]
pub use init::MetricsHandle;
pub use init::TelemetryGuard;
