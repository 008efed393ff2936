//! Stargate API host
//!
//! Startup order: settings, telemetry (logging sink and metrics recorder),
//! authentication pipeline, HTTP server.
//! Shutdown runs in reverse on Ctrl-C: the server drains, the pipeline's
//! refresh task is cancelled, and the telemetry guard flushes the log sink
//! last.

mod request_context;
mod routes;
mod settings;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use stargate_auth::AuthPipeline;
use stargate_auth::audit::AuditLog;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::settings::AppSettings;

const SERVICE_NAME: &str = "stargate-api";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    name = "stargate-api",
    version,
    about = "Bearer-authenticated Stargate API",
    long_about = "Serves the Stargate API behind OpenID Connect bearer authentication.\n\
                  Settings come from the optional config file and STARGATE__* environment \
                  variables (e.g. STARGATE__AUTH__AUTHORITY)."
)]
struct Cli {
    /// Settings file (.toml, .yaml, .yml or .json)
    #[arg(long, short = 'c', env = "STARGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings =
        AppSettings::load(cli.config.as_deref()).context("failed to load settings")?;

    // Declared first so it is dropped last
    let telemetry = settings
        .telemetry_config(SERVICE_NAME)
        .init()
        .context("failed to initialise telemetry")?;
    let metrics = telemetry.metrics_handle();
    if metrics.is_some() {
        stargate_auth::init_auth_metrics();
    }

    let pipeline = AuthPipeline::assemble(settings.auth.clone(), AuditLog::tracing(SERVICE_NAME))
        .await
        .context("failed to assemble authentication pipeline")?;

    let listener = TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_addr))?;
    info!(listen_addr = %settings.listen_addr, "Stargate API listening");

    let served = axum::serve(listener, routes::router(&pipeline, metrics))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    pipeline.shutdown().await;
    served.context("HTTP server failed")?;

    info!("Stargate API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
