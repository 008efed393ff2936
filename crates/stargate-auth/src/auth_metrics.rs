//! Authentication metrics
//!
//! Enable with the `metrics` feature flag. Values go through the `metrics`
//! facade and are only exported once the host installs a recorder, e.g. the
//! Prometheus recorder from `stargate-telemetry`.
//!
//! ## Metrics Provided
//!
//! - `stargate_metadata_retrieval_attempts_total` - Counter of metadata fetch-and-parse attempts
//! - `stargate_metadata_retrievals_total` - Counter of attempt outcomes (labels: status, cause)
//! - `stargate_metadata_retrieval_duration_seconds` - Histogram of attempt duration
//! - `stargate_signing_keys` - Gauge of keys in the snapshot being served
//! - `stargate_token_validations_total` - Counter of token decisions (labels: status, reason)
//!
//! Without the feature every recording function is a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

#[cfg(feature = "metrics")]
use std::sync::Once;

/// Attempts counter
pub const RETRIEVAL_ATTEMPTS: &str = "stargate_metadata_retrieval_attempts_total";
/// Outcome counter
pub const RETRIEVALS: &str = "stargate_metadata_retrievals_total";
/// Attempt duration histogram
pub const RETRIEVAL_DURATION: &str = "stargate_metadata_retrieval_duration_seconds";
/// Served key count gauge
pub const SIGNING_KEYS: &str = "stargate_signing_keys";
/// Token decision counter
pub const TOKEN_VALIDATIONS: &str = "stargate_token_validations_total";

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Register metric descriptions with the installed recorder
///
/// Idempotent; only the first call has an effect.
#[cfg(feature = "metrics")]
pub fn init_auth_metrics() {
    INIT.call_once(|| {
        describe_counter!(RETRIEVAL_ATTEMPTS, "Issuer metadata retrieval attempts");
        describe_counter!(
            RETRIEVALS,
            "Issuer metadata retrieval outcomes by status and cause code"
        );
        describe_histogram!(
            RETRIEVAL_DURATION,
            metrics::Unit::Seconds,
            "Issuer metadata retrieval duration"
        );
        describe_gauge!(SIGNING_KEYS, "Signing keys in the served issuer snapshot");
        describe_counter!(
            TOKEN_VALIDATIONS,
            "Bearer token decisions by status and reason code"
        );
    });
}

#[cfg(feature = "metrics")]
pub(crate) fn record_retrieval_attempt() {
    counter!(RETRIEVAL_ATTEMPTS).increment(1);
}

/// `cause` is `None` on success, otherwise the retrieval error code
#[cfg(feature = "metrics")]
pub(crate) fn record_retrieval_outcome(cause: Option<&'static str>, duration_seconds: f64) {
    let status = if cause.is_none() { "success" } else { "failure" };
    counter!(
        RETRIEVALS,
        "status" => status,
        "cause" => cause.unwrap_or("none")
    )
    .increment(1);
    histogram!(RETRIEVAL_DURATION, "status" => status).record(duration_seconds);
}

#[cfg(feature = "metrics")]
pub(crate) fn record_signing_keys(count: usize) {
    gauge!(SIGNING_KEYS).set(count as f64);
}

/// `reason` is `None` for an accepted token, otherwise the rejection's reason code
#[cfg(feature = "metrics")]
pub(crate) fn record_token_validation(reason: Option<&'static str>) {
    let status = if reason.is_none() { "accepted" } else { "rejected" };
    counter!(
        TOKEN_VALIDATIONS,
        "status" => status,
        "reason" => reason.unwrap_or("none")
    )
    .increment(1);
}

// No-op versions when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_auth_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_retrieval_attempt() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_retrieval_outcome(_cause: Option<&'static str>, _duration_seconds: f64) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_signing_keys(_count: usize) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_token_validation(_reason: Option<&'static str>) {}
