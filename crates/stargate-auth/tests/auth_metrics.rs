//! Metrics recorded by a running pipeline

#![cfg(feature = "metrics")]

mod common;

use common::{MockIdp, TestKey, mint, now};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use stargate_auth::AuthPipeline;
use stargate_auth::auth_metrics::{RETRIEVAL_ATTEMPTS, RETRIEVALS, SIGNING_KEYS, TOKEN_VALIDATIONS};

/// Value of the first sample of `name` whose line contains every label
fn sample(rendered: &str, name: &str, labels: &[&str]) -> Option<String> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find(|line| {
            line.split(['{', ' ']).next() == Some(name)
                && labels.iter().all(|label| line.contains(label))
        })
        .and_then(|line| line.rsplit(' ').next())
        .map(str::to_string)
}

// Current-thread runtime: the refresh task records on this thread's local recorder
#[tokio::test]
async fn test_pipeline_records_retrievals_and_decisions() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let _local = metrics::set_default_local_recorder(&recorder);

    let idp = MockIdp::start(&[(TestKey::Primary, "abc"), (TestKey::Rotated, "def")]).await;
    let pipeline = AuthPipeline::builder(idp.options())
        .background_refresh(false)
        .build()
        .await
        .unwrap();

    let good = mint(TestKey::Primary, Some("abc"), Some("at+jwt"), &idp.claims("alice"));
    pipeline.authenticate(&good).await.unwrap();

    let expired = mint(
        TestKey::Primary,
        Some("abc"),
        Some("at+jwt"),
        &json!({ "iss": idp.issuer(), "sub": "alice", "exp": now() - 3600 }),
    );
    pipeline.authenticate(&expired).await.unwrap_err();
    pipeline.authenticate("not-a-token").await.unwrap_err();

    let rendered = handle.render();
    assert_eq!(sample(&rendered, RETRIEVAL_ATTEMPTS, &[]).as_deref(), Some("1"));
    assert_eq!(
        sample(&rendered, RETRIEVALS, &["status=\"success\""]).as_deref(),
        Some("1")
    );
    assert_eq!(sample(&rendered, SIGNING_KEYS, &[]).as_deref(), Some("2"));
    assert_eq!(
        sample(&rendered, TOKEN_VALIDATIONS, &["status=\"accepted\""]).as_deref(),
        Some("1")
    );
    assert_eq!(
        sample(&rendered, TOKEN_VALIDATIONS, &["reason=\"expired\""]).as_deref(),
        Some("1")
    );
    assert_eq!(
        sample(&rendered, TOKEN_VALIDATIONS, &["reason=\"malformed_token\""]).as_deref(),
        Some("1")
    );

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_failed_retrieval_is_counted_by_cause() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let _local = metrics::set_default_local_recorder(&recorder);

    let idp = MockIdp::start(&[(TestKey::Primary, "abc")]).await;
    idp.set_discovery_status(500);
    let pipeline = AuthPipeline::builder(idp.options())
        .background_refresh(false)
        .build()
        .await
        .unwrap();

    let token = mint(TestKey::Primary, Some("abc"), Some("at+jwt"), &idp.claims("alice"));
    pipeline.authenticate(&token).await.unwrap_err();

    let rendered = handle.render();
    let failures = sample(
        &rendered,
        RETRIEVALS,
        &["status=\"failure\"", "cause=\"http_status\""],
    );
    assert_eq!(failures.as_deref(), Some("1"));
    assert_eq!(
        sample(&rendered, TOKEN_VALIDATIONS, &["reason=\"metadata_unavailable\""]).as_deref(),
        Some("1")
    );
}
