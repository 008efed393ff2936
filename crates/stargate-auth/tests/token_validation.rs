//! End-to-end token validation against a mock identity provider

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{MockIdp, TestKey, mint, now};
use proptest::prelude::*;
use serde_json::json;
use stargate_auth::audit::{AuditEvent, AuditLog, MemoryAuditSink};
use stargate_auth::discovery::parse_key_set;
use stargate_auth::jwt::FixedClock;
use stargate_auth::{
    AuthOptions, AuthPipeline, ConfigError, Initialization, IssuerConfiguration, Rejection,
    RetrievalError, TokenValidator, ValidationPolicy,
};

#[tokio::test]
async fn test_scenario_accept_and_wrong_type() {
    let idp = MockIdp::start(&[(TestKey::Primary, "abc")]).await;
    let pipeline = AuthPipeline::builder(idp.options())
        .background_refresh(false)
        .build()
        .await
        .unwrap();

    let claims = idp.claims("alice");
    let accepted = mint(TestKey::Primary, Some("abc"), Some("at+jwt"), &claims);
    let identity = pipeline.authenticate(&accepted).await.unwrap();
    assert_eq!(identity.subject, "alice");
    assert_eq!(identity.issuer, idp.issuer());
    assert_eq!(identity.scopes, vec!["astronauts:read"]);

    let wrong_type = mint(TestKey::Primary, Some("abc"), Some("jwt"), &claims);
    assert_eq!(
        pipeline.authenticate(&wrong_type).await.unwrap_err(),
        Rejection::WrongTokenType {
            expected: "at+jwt".to_string(),
            found: Some("jwt".to_string()),
        }
    );
}

#[tokio::test]
async fn test_issuer_and_audience_policy() {
    let idp = MockIdp::start(&[(TestKey::Primary, "abc")]).await;
    let pipeline = AuthPipeline::builder(AuthOptions {
        valid_audiences: vec!["stargate-api".to_string()],
        ..idp.options()
    })
    .background_refresh(false)
    .build()
    .await
    .unwrap();

    let foreign = mint(
        TestKey::Primary,
        Some("abc"),
        Some("at+jwt"),
        &json!({ "iss": "https://other.example.com", "sub": "a", "exp": now() + 60, "aud": "stargate-api" }),
    );
    assert!(matches!(
        pipeline.authenticate(&foreign).await,
        Err(Rejection::IssuerMismatch { .. })
    ));

    let wrong_audience = mint(
        TestKey::Primary,
        Some("abc"),
        Some("at+jwt"),
        &json!({ "iss": idp.issuer(), "sub": "a", "exp": now() + 60, "aud": "billing" }),
    );
    assert_eq!(
        pipeline.authenticate(&wrong_audience).await.unwrap_err(),
        Rejection::AudienceMismatch
    );

    let good = mint(
        TestKey::Primary,
        Some("abc"),
        Some("at+jwt"),
        &json!({ "iss": format!("{}/", idp.issuer()), "sub": "a", "exp": now() + 60, "aud": ["billing", "stargate-api"] }),
    );
    assert!(pipeline.authenticate(&good).await.is_ok());
}

#[tokio::test]
async fn test_expired_token_with_injected_clock() {
    let idp = MockIdp::start(&[(TestKey::Primary, "abc")]).await;
    let issued = now();
    let clock = Arc::new(FixedClock::at(issued));
    let pipeline = AuthPipeline::builder(idp.options())
        .clock(clock.clone())
        .background_refresh(false)
        .build()
        .await
        .unwrap();

    let token = mint(
        TestKey::Primary,
        Some("abc"),
        Some("at+jwt"),
        &json!({ "iss": idp.issuer(), "sub": "a", "exp": issued + 60 }),
    );
    assert!(pipeline.authenticate(&token).await.is_ok());

    clock.set(issued + 60 + 120);
    assert!(pipeline.authenticate(&token).await.is_ok());

    clock.set(issued + 60 + 121);
    assert_eq!(
        pipeline.authenticate(&token).await.unwrap_err(),
        Rejection::Expired
    );
}

#[tokio::test]
async fn test_rejections_are_audited_without_token() {
    let idp = MockIdp::start(&[(TestKey::Primary, "abc")]).await;
    let sink = Arc::new(MemoryAuditSink::default());
    let pipeline = AuthPipeline::builder(idp.options())
        .audit(AuditLog::new("test", sink.clone()))
        .background_refresh(false)
        .build()
        .await
        .unwrap();

    let token = mint(TestKey::Primary, Some("abc"), Some("jwt"), &idp.claims("alice"));
    pipeline.authenticate(&token).await.unwrap_err();

    let events = sink.events();
    assert!(matches!(events[0], AuditEvent::RetrievalStarted { .. }));
    assert!(matches!(
        &events[1],
        AuditEvent::RetrievalSucceeded { key_count: 1, keys, .. }
            if keys[0].key_id.as_deref() == Some("abc") && keys[0].algorithm == "RS256"
    ));
    assert!(matches!(
        &events[2],
        AuditEvent::TokenRejected { reason_code, key_id, .. }
            if reason_code == "wrong_token_type" && key_id.as_deref() == Some("abc")
    ));

    let rendered = serde_json::to_string(&events).unwrap();
    assert!(!rendered.contains(&token));
}

#[tokio::test]
async fn test_unreachable_issuer_surfaces_only_without_snapshot() {
    let idp = MockIdp::start(&[(TestKey::Primary, "abc")]).await;
    idp.set_discovery_status(503);
    let pipeline = AuthPipeline::builder(idp.options())
        .background_refresh(false)
        .build()
        .await
        .unwrap();

    let token = mint(TestKey::Primary, Some("abc"), Some("at+jwt"), &idp.claims("alice"));
    assert!(matches!(
        pipeline.authenticate(&token).await,
        Err(Rejection::MetadataUnavailable(RetrievalError::HttpStatus { status: 503, .. }))
    ));

    idp.set_discovery_status(200);
    assert!(pipeline.authenticate(&token).await.is_ok());
}

#[tokio::test]
async fn test_eager_initialization() {
    let idp = MockIdp::start(&[(TestKey::Primary, "abc")]).await;
    let pipeline = AuthPipeline::builder(AuthOptions {
        initialization: Initialization::Eager,
        ..idp.options()
    })
    .background_refresh(false)
    .build()
    .await
    .unwrap();
    assert_eq!(idp.discovery_hits().await, 1);
    assert!(pipeline.manager().get_current().is_ok());

    idp.set_discovery_status(500);
    let err = AuthPipeline::builder(AuthOptions {
        initialization: Initialization::Eager,
        ..idp.options()
    })
    .background_refresh(false)
    .build()
    .await
    .unwrap_err();
    assert!(matches!(err, ConfigError::Retrieval(RetrievalError::HttpStatus { .. })));
}

#[tokio::test]
async fn test_lazy_initialization_defers_fetch() {
    let idp = MockIdp::start(&[(TestKey::Primary, "abc")]).await;
    let pipeline = AuthPipeline::builder(idp.options())
        .background_refresh(false)
        .build()
        .await
        .unwrap();

    assert_eq!(idp.discovery_hits().await, 0);
    assert_eq!(
        pipeline.manager().get_current().unwrap_err(),
        RetrievalError::NotYetInitialized
    );
}

#[tokio::test]
async fn test_missing_authority_is_fatal() {
    let err = AuthPipeline::builder(AuthOptions::default())
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::ConfigurationMissing(_)));
}

#[tokio::test]
async fn test_background_refresh_picks_up_rotation() {
    let idp = MockIdp::start(&[(TestKey::Primary, "abc")]).await;
    let pipeline = AuthPipeline::builder(AuthOptions {
        refresh_interval_secs: 1,
        initialization: Initialization::Eager,
        ..idp.options()
    })
    .build()
    .await
    .unwrap();

    idp.rotate_to(&[(TestKey::Rotated, "def")]);
    let mut rotated = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if pipeline.manager().get_current().unwrap().contains_key_id("def") {
            rotated = true;
            break;
        }
    }
    assert!(rotated);
    assert!(idp.discovery_hits().await >= 2);

    pipeline.shutdown().await;
}

fn primary_snapshot() -> IssuerConfiguration {
    let keys = json!({ "keys": [TestKey::Primary.public_jwk("abc")] });
    IssuerConfiguration {
        issuer: "https://idp.example.com".to_string(),
        token_endpoint: None,
        jwks_uri: "https://idp.example.com/keys".to_string(),
        signing_keys: parse_key_set(&serde_json::to_vec(&keys).unwrap()).unwrap(),
        discovered_at: Utc::now(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_expiration_boundary(exp in 1_600_000_000i64..1_900_000_000, skew in 0u64..600) {
        let snapshot = primary_snapshot();
        let token = mint(
            TestKey::Primary,
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": "https://idp.example.com", "sub": "p", "exp": exp }),
        );
        let clock = Arc::new(FixedClock::at(exp - skew as i64));
        let validator = TokenValidator::with_clock(
            ValidationPolicy {
                clock_skew: Duration::from_secs(skew),
                ..ValidationPolicy::new("https://idp.example.com")
            },
            clock.clone(),
        );

        prop_assert!(validator.validate(&token, &snapshot).is_ok());
        clock.set(exp + skew as i64);
        prop_assert!(validator.validate(&token, &snapshot).is_ok());
        clock.set(exp + skew as i64 + 1);
        prop_assert_eq!(validator.validate(&token, &snapshot).unwrap_err(), Rejection::Expired);
    }
}
