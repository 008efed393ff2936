//! Common test utilities for integration tests
//!
//! A mock OpenID Connect identity provider on `wiremock`, fixed RSA key
//! fixtures and token minting.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde_json::{Value, json};
use stargate_auth::AuthOptions;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const KEYS_PATH: &str = "/keys";

/// Fixed RSA key pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKey {
    Primary,
    Rotated,
    Rogue,
}

impl TestKey {
    pub fn private_pem(self) -> &'static [u8] {
        match self {
            Self::Primary => include_bytes!("../fixtures/primary_private.pem"),
            Self::Rotated => include_bytes!("../fixtures/rotated_private.pem"),
            Self::Rogue => include_bytes!("../fixtures/rogue_private.pem"),
        }
    }

    /// Public JWK with the given `kid`
    pub fn public_jwk(self, kid: &str) -> Value {
        let raw = match self {
            Self::Primary => include_str!("../fixtures/primary_public.jwk.json"),
            Self::Rotated => include_str!("../fixtures/rotated_public.jwk.json"),
            Self::Rogue => include_str!("../fixtures/rogue_public.jwk.json"),
        };
        let mut jwk: Value = serde_json::from_str(raw).expect("fixture is JSON");
        jwk["kid"] = json!(kid);
        jwk
    }
}

/// Sign `claims` with `key`, RS256
pub fn mint(key: TestKey, kid: Option<&str>, typ: Option<&str>, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    header.typ = typ.map(str::to_string);
    let encoding_key = EncodingKey::from_rsa_pem(key.private_pem()).expect("fixture is a PEM key");
    encode(&header, claims, &encoding_key).expect("token encodes")
}

/// Unix time now
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Mutable JSON body served by the mock server
#[derive(Clone)]
struct LiveDocument {
    body: Arc<Mutex<Value>>,
    status: Arc<Mutex<u16>>,
    delay: Duration,
}

impl Respond for LiveDocument {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(*self.status.lock())
            .set_body_json(self.body.lock().clone())
            .set_delay(self.delay)
    }
}

/// Mock identity provider serving discovery and key-set documents
pub struct MockIdp {
    pub server: MockServer,
    discovery: LiveDocument,
    keys: LiveDocument,
}

impl MockIdp {
    /// Provider publishing `keys` immediately
    pub async fn start(keys: &[(TestKey, &str)]) -> Self {
        Self::start_with_delay(keys, Duration::ZERO).await
    }

    /// Provider whose discovery document takes `delay` to arrive
    pub async fn start_with_delay(keys: &[(TestKey, &str)], delay: Duration) -> Self {
        let server = MockServer::start().await;
        let issuer = server.uri();

        let discovery = LiveDocument {
            body: Arc::new(Mutex::new(json!({
                "issuer": issuer,
                "token_endpoint": format!("{issuer}/token"),
                "jwks_uri": format!("{issuer}{KEYS_PATH}"),
                "id_token_signing_alg_values_supported": ["RS256"],
            }))),
            status: Arc::new(Mutex::new(200)),
            delay,
        };
        let key_set = LiveDocument {
            body: Arc::new(Mutex::new(key_set(keys))),
            status: Arc::new(Mutex::new(200)),
            delay: Duration::ZERO,
        };

        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(discovery.clone())
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(KEYS_PATH))
            .respond_with(key_set.clone())
            .mount(&server)
            .await;

        Self {
            server,
            discovery,
            keys: key_set,
        }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Options pointing at this provider (plain HTTP allowed)
    pub fn options(&self) -> AuthOptions {
        AuthOptions {
            require_https_metadata: false,
            ..AuthOptions::for_authority(self.issuer())
        }
    }

    /// Replace the published key set
    pub fn rotate_to(&self, keys: &[(TestKey, &str)]) {
        *self.keys.body.lock() = key_set(keys);
    }

    /// Make the discovery endpoint answer with `status`
    pub fn set_discovery_status(&self, status: u16) {
        *self.discovery.status.lock() = status;
    }

    /// Number of discovery document requests served so far
    pub async fn discovery_hits(&self) -> usize {
        self.hits(DISCOVERY_PATH).await
    }

    /// Number of key-set requests served so far
    pub async fn key_set_hits(&self) -> usize {
        self.hits(KEYS_PATH).await
    }

    async fn hits(&self, wanted: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == wanted)
            .count()
    }

    /// Claims accepted by the default policy
    pub fn claims(&self, subject: &str) -> Value {
        json!({
            "iss": self.issuer(),
            "sub": subject,
            "exp": now() + 300,
            "iat": now(),
            "scope": "astronauts:read",
        })
    }
}

fn key_set(keys: &[(TestKey, &str)]) -> Value {
    json!({
        "keys": keys.iter().map(|(key, kid)| key.public_jwk(kid)).collect::<Vec<_>>()
    })
}
