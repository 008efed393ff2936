//! HTTP routes
//!
//! `/health` and the Prometheus scrape endpoint are open; everything under
//! `/api` sits behind the bearer authentication layer.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::{Value, json};
use stargate_auth::{AuthPipeline, AuthenticatedIdentity};
use stargate_telemetry::MetricsHandle;

use crate::request_context;

/// Prometheus text exposition format
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Build the application router around `pipeline`
pub fn router(pipeline: &AuthPipeline, metrics: Option<MetricsHandle>) -> Router {
    let api = Router::new()
        .route("/api/me", get(me))
        .layer(pipeline.layer());

    let mut app = Router::new().route("/health", get(health)).merge(api);
    if let Some(handle) = metrics {
        app = app.merge(
            Router::new()
                .route(handle.path(), get(scrape))
                .with_state(handle),
        );
    }

    app.layer(request_context::layer())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn scrape(State(handle): State<MetricsHandle>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], handle.render())
}

async fn me(Extension(identity): Extension<AuthenticatedIdentity>) -> Json<AuthenticatedIdentity> {
    Json(identity)
}
