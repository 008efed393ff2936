//! Bearer token validation against an issuer snapshot
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. Structure: three base64url segments, JSON header and payload
//! 2. Token type: header `typ` equals the required type (`at+jwt`)
//! 3. Signature: an asymmetric algorithm, verified by a key from the snapshot
//! 4. Issuer: `iss` equals the configured issuer, ignoring a trailing slash
//! 5. Expiration: `exp` present and not past, allowing for clock skew
//! 6. Not-before: `nbf`, when present, not in the future beyond the skew
//! 7. Audience: only when accepted audiences are configured
//!
//! Validation is synchronous and CPU-bound. It never touches the network;
//! refresh-on-miss lives in [`BearerAuthenticator`](crate::BearerAuthenticator).

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header, Validation, decode, decode_header};
use serde::Serialize;
use tracing::debug;

use super::TokenClaims;
use crate::discovery::{IssuerConfiguration, SigningKey};
use crate::error::Rejection;

/// Algorithms a bearer token may be signed with
///
/// Symmetric algorithms are excluded: the verification keys are public.
pub const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Source of the current time, in Unix seconds
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Settable clock for tests and replay tooling
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    /// Clock frozen at `now`
    pub fn at(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Move the clock to `now`
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Acceptance rules, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Issuer to accept
    pub issuer: String,
    /// Required header `typ`; `None` skips the check
    pub required_token_type: Option<String>,
    /// Tolerance applied to `exp` and `nbf`
    pub clock_skew: Duration,
    /// Accepted audiences; empty disables the audience check
    pub valid_audiences: Vec<String>,
}

impl ValidationPolicy {
    /// Policy for `issuer` with `at+jwt` tokens, two minutes of skew and no
    /// audience check
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            required_token_type: Some("at+jwt".to_string()),
            clock_skew: Duration::from_secs(120),
            valid_audiences: Vec::new(),
        }
    }
}

/// Principal established by an accepted token
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedIdentity {
    /// `sub`, or `client_id` for client-credential tokens without a subject
    pub subject: String,
    /// `iss`
    pub issuer: String,
    /// Audiences the token was issued for
    pub audiences: Vec<String>,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Expiration
    pub expires_at: DateTime<Utc>,
    /// Key that verified the signature
    pub key_id: Option<String>,
    /// Signature algorithm
    pub algorithm: Algorithm,
    /// Every claim in the payload
    pub claims: TokenClaims,
}

/// Validates bearer tokens under one [`ValidationPolicy`]
#[derive(Clone)]
pub struct TokenValidator {
    policy: ValidationPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    /// Validator reading the wall clock
    pub fn new(policy: ValidationPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Validator reading `clock`
    pub fn with_clock(policy: ValidationPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    /// The policy in force
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Validate `token` against `config`
    ///
    /// # Errors
    ///
    /// The first [`Rejection`] in check order. No identity is produced
    /// alongside a rejection.
    pub fn validate(
        &self,
        token: &str,
        config: &IssuerConfiguration,
    ) -> Result<AuthenticatedIdentity, Rejection> {
        let (header, claims) = decode_structure(token)?;
        self.check_token_type(&header)?;
        let key = verify_signature(token, &header, config)?;
        self.check_issuer(&claims)?;

        let now = self.clock.now();
        let skew = i64::try_from(self.policy.clock_skew.as_secs()).unwrap_or(i64::MAX);
        let exp = check_expiration(&claims, now, skew)?;
        check_not_before(&claims, now, skew)?;
        self.check_audience(&claims)?;

        let subject = claims
            .sub
            .clone()
            .or_else(|| claims.client_id.clone())
            .ok_or_else(|| Rejection::MalformedToken("token has no subject".to_string()))?;

        debug!(
            subject = %subject,
            key_id = ?key.key_id,
            algorithm = ?header.alg,
            "bearer token accepted"
        );

        Ok(AuthenticatedIdentity {
            subject,
            issuer: self.policy.issuer.clone(),
            audiences: claims.audiences(),
            scopes: claims.scopes(),
            expires_at: DateTime::from_timestamp(exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC),
            key_id: key.key_id.clone(),
            algorithm: header.alg,
            claims,
        })
    }

    fn check_token_type(&self, header: &Header) -> Result<(), Rejection> {
        let Some(required) = self.policy.required_token_type.as_deref() else {
            return Ok(());
        };
        match header.typ.as_deref() {
            Some(found) if normalize_type(found) == normalize_type(required) => Ok(()),
            found => Err(Rejection::WrongTokenType {
                expected: required.to_string(),
                found: found.map(str::to_string),
            }),
        }
    }

    fn check_issuer(&self, claims: &TokenClaims) -> Result<(), Rejection> {
        let expected = self.policy.issuer.trim_end_matches('/');
        match claims.iss.as_deref() {
            Some(iss) if iss.trim_end_matches('/') == expected => Ok(()),
            found => Err(Rejection::IssuerMismatch {
                expected: expected.to_string(),
                found: found.map(str::to_string),
            }),
        }
    }

    fn check_audience(&self, claims: &TokenClaims) -> Result<(), Rejection> {
        if self.policy.valid_audiences.is_empty() {
            return Ok(());
        }
        let accepted = claims
            .aud
            .as_ref()
            .is_some_and(|aud| {
                aud.values()
                    .iter()
                    .any(|value| self.policy.valid_audiences.iter().any(|valid| valid == value))
            });
        if accepted {
            Ok(())
        } else {
            Err(Rejection::AudienceMismatch)
        }
    }
}

/// `at+jwt` and `application/at+jwt` are the same media type; case is not significant
fn normalize_type(typ: &str) -> String {
    let lower = typ.trim().to_ascii_lowercase();
    lower
        .strip_prefix("application/")
        .map(str::to_string)
        .unwrap_or(lower)
}

fn decode_structure(token: &str) -> Result<(Header, TokenClaims), Rejection> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(Rejection::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    }

    let header = decode_header(token)
        .map_err(|e| Rejection::MalformedToken(format!("header: {e}")))?;

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|e| Rejection::MalformedToken(format!("payload encoding: {e}")))?;
    let claims: TokenClaims = serde_json::from_slice(&payload)
        .map_err(|e| Rejection::MalformedToken(format!("payload: {e}")))?;

    Ok((header, claims))
}

fn verify_signature<'a>(
    token: &str,
    header: &Header,
    config: &'a IssuerConfiguration,
) -> Result<&'a SigningKey, Rejection> {
    if !ALLOWED_ALGORITHMS.contains(&header.alg) {
        return Err(Rejection::signature(format!(
            "algorithm {:?} is not permitted",
            header.alg
        )));
    }

    let candidates: Vec<&SigningKey> = match header.kid.as_deref() {
        Some(kid) => {
            let matching: Vec<_> = config.keys_for(kid).collect();
            if matching.is_empty() {
                return Err(Rejection::SignatureInvalid {
                    reason: format!("no signing key with kid {kid}"),
                    unrecognized_key_id: Some(kid.to_string()),
                });
            }
            matching
        }
        None => config.signing_keys.iter().collect(),
    };

    let mut validation = Validation::new(header.alg);
    // Lifetime, issuer and audience are checked afterwards, in order
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    candidates
        .into_iter()
        .filter(|key| key.algorithm.is_none_or(|alg| alg == header.alg))
        .find(|key| decode::<serde_json::Value>(token, &key.decoding_key, &validation).is_ok())
        .ok_or_else(|| Rejection::signature("no signing key verified the signature"))
}

fn check_expiration(claims: &TokenClaims, now: i64, skew: i64) -> Result<i64, Rejection> {
    match claims.exp {
        Some(exp) if now <= exp.saturating_add(skew) => Ok(exp),
        _ => Err(Rejection::Expired),
    }
}

fn check_not_before(claims: &TokenClaims, now: i64, skew: i64) -> Result<(), Rejection> {
    match claims.nbf {
        Some(nbf) if now.saturating_add(skew) < nbf => Err(Rejection::NotYetValid),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::parse_key_set;
    use jsonwebtoken::{EncodingKey, encode};
    use serde_json::{Value, json};

    const ISSUER: &str = "https://idp.example.com";
    const NOW: i64 = 1_750_000_000;

    fn key_set(kids: &[&str]) -> IssuerConfiguration {
        let jwk: Value =
            serde_json::from_str(include_str!("../../tests/fixtures/primary_public.jwk.json"))
                .unwrap();
        let keys: Vec<Value> = kids
            .iter()
            .map(|kid| {
                let mut jwk = jwk.clone();
                jwk["kid"] = json!(kid);
                jwk
            })
            .collect();
        IssuerConfiguration {
            issuer: ISSUER.to_string(),
            token_endpoint: None,
            jwks_uri: format!("{ISSUER}/keys"),
            signing_keys: parse_key_set(&serde_json::to_vec(&json!({ "keys": keys })).unwrap())
                .unwrap(),
            discovered_at: Utc::now(),
        }
    }

    fn mint(kid: Option<&str>, typ: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        header.typ = typ.map(str::to_string);
        let key =
            EncodingKey::from_rsa_pem(include_bytes!("../../tests/fixtures/primary_private.pem"))
                .unwrap();
        encode(&header, claims, &key).unwrap()
    }

    fn claims() -> Value {
        json!({ "iss": ISSUER, "sub": "alice", "exp": NOW + 300, "scope": "read" })
    }

    fn validator() -> TokenValidator {
        TokenValidator::with_clock(ValidationPolicy::new(ISSUER), Arc::new(FixedClock::at(NOW)))
    }

    #[test]
    fn test_valid_token() {
        let token = mint(Some("abc"), Some("at+jwt"), &claims());
        let identity = validator().validate(&token, &key_set(&["abc"])).unwrap();

        assert_eq!(identity.subject, "alice");
        assert_eq!(identity.issuer, ISSUER);
        assert_eq!(identity.key_id.as_deref(), Some("abc"));
        assert_eq!(identity.scopes, vec!["read"]);
        assert_eq!(identity.expires_at.timestamp(), NOW + 300);
    }

    #[test]
    fn test_structural_failures() {
        let config = key_set(&["abc"]);
        for token in ["", "a.b", "a.b.c.d", "..", "not-base64.not-base64.sig"] {
            assert!(
                matches!(
                    validator().validate(token, &config),
                    Err(Rejection::MalformedToken(_))
                ),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_token_type_matching() {
        let config = key_set(&["abc"]);
        for typ in ["at+jwt", "AT+JWT", "application/at+jwt"] {
            let token = mint(Some("abc"), Some(typ), &claims());
            assert!(validator().validate(&token, &config).is_ok(), "{typ}");
        }

        let token = mint(Some("abc"), Some("JWT"), &claims());
        assert_eq!(
            validator().validate(&token, &config).unwrap_err(),
            Rejection::WrongTokenType {
                expected: "at+jwt".to_string(),
                found: Some("JWT".to_string()),
            }
        );

        let token = mint(Some("abc"), None, &claims());
        assert!(matches!(
            validator().validate(&token, &config),
            Err(Rejection::WrongTokenType { found: None, .. })
        ));
    }

    #[test]
    fn test_type_checked_before_signature() {
        let token = mint(Some("unknown"), Some("jwt"), &claims());
        assert!(matches!(
            validator().validate(&token, &key_set(&["abc"])),
            Err(Rejection::WrongTokenType { .. })
        ));
    }

    #[test]
    fn test_unknown_kid_is_reported() {
        let token = mint(Some("def"), Some("at+jwt"), &claims());
        let rejection = validator()
            .validate(&token, &key_set(&["abc"]))
            .unwrap_err();
        assert_eq!(rejection.reason_code(), "signature_invalid");
        assert_eq!(rejection.unrecognized_key_id(), Some("def"));
    }

    #[test]
    fn test_missing_kid_tries_every_key() {
        let token = mint(None, Some("at+jwt"), &claims());
        assert!(validator().validate(&token, &key_set(&["x", "y"])).is_ok());
    }

    #[test]
    fn test_tampered_payload_fails_signature() {
        let token = mint(Some("abc"), Some("at+jwt"), &claims());
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1] = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&json!({ "iss": ISSUER, "sub": "mallory", "exp": NOW + 300 }))
                .unwrap(),
        );
        let tampered = parts.join(".");

        let rejection = validator()
            .validate(&tampered, &key_set(&["abc"]))
            .unwrap_err();
        assert_eq!(rejection.reason_code(), "signature_invalid");
        assert_eq!(rejection.unrecognized_key_id(), None);
    }

    #[test]
    fn test_symmetric_algorithm_rejected() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("abc".to_string());
        header.typ = Some("at+jwt".to_string());
        let token = encode(&header, &claims(), &EncodingKey::from_secret(b"secret")).unwrap();

        assert!(matches!(
            validator().validate(&token, &key_set(&["abc"])),
            Err(Rejection::SignatureInvalid { .. })
        ));
    }

    #[test]
    fn test_issuer_trailing_slash_normalized() {
        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": format!("{ISSUER}/"), "sub": "alice", "exp": NOW + 300 }),
        );
        assert!(validator().validate(&token, &key_set(&["abc"])).is_ok());

        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": "https://evil.example.com", "sub": "alice", "exp": NOW + 300 }),
        );
        assert!(matches!(
            validator().validate(&token, &key_set(&["abc"])),
            Err(Rejection::IssuerMismatch { .. })
        ));
    }

    #[test]
    fn test_expiration_required() {
        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": ISSUER, "sub": "alice" }),
        );
        assert_eq!(
            validator().validate(&token, &key_set(&["abc"])).unwrap_err(),
            Rejection::Expired
        );
    }

    #[test]
    fn test_expiration_boundary_with_skew() {
        let exp = NOW;
        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": ISSUER, "sub": "alice", "exp": exp }),
        );
        let config = key_set(&["abc"]);
        let clock = Arc::new(FixedClock::at(exp - 120));
        let validator = TokenValidator::with_clock(ValidationPolicy::new(ISSUER), clock.clone());

        assert!(validator.validate(&token, &config).is_ok());
        clock.set(exp + 120);
        assert!(validator.validate(&token, &config).is_ok());
        clock.set(exp + 121);
        assert_eq!(
            validator.validate(&token, &config).unwrap_err(),
            Rejection::Expired
        );
    }

    #[test]
    fn test_fractional_expiration_accepted() {
        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": ISSUER, "sub": "alice", "exp": 1_750_000_300.5 }),
        );
        let identity = validator().validate(&token, &key_set(&["abc"])).unwrap();
        assert_eq!(identity.expires_at.timestamp(), NOW + 300);
    }

    #[test]
    fn test_not_before() {
        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": ISSUER, "sub": "alice", "exp": NOW + 600, "nbf": NOW + 121 }),
        );
        assert_eq!(
            validator().validate(&token, &key_set(&["abc"])).unwrap_err(),
            Rejection::NotYetValid
        );

        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": ISSUER, "sub": "alice", "exp": NOW + 600, "nbf": NOW + 120 }),
        );
        assert!(validator().validate(&token, &key_set(&["abc"])).is_ok());
    }

    #[test]
    fn test_audience_checked_only_when_configured() {
        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": ISSUER, "sub": "alice", "exp": NOW + 300, "aud": ["other"] }),
        );
        let config = key_set(&["abc"]);
        assert!(validator().validate(&token, &config).is_ok());

        let policy = ValidationPolicy {
            valid_audiences: vec!["stargate-api".to_string()],
            ..ValidationPolicy::new(ISSUER)
        };
        let strict = TokenValidator::with_clock(policy, Arc::new(FixedClock::at(NOW)));
        assert_eq!(
            strict.validate(&token, &config).unwrap_err(),
            Rejection::AudienceMismatch
        );

        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": ISSUER, "sub": "alice", "exp": NOW + 300, "aud": "stargate-api" }),
        );
        assert!(strict.validate(&token, &config).is_ok());
    }

    #[test]
    fn test_client_credentials_subject_fallback() {
        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": ISSUER, "client_id": "batch-job", "exp": NOW + 300 }),
        );
        let identity = validator().validate(&token, &key_set(&["abc"])).unwrap();
        assert_eq!(identity.subject, "batch-job");

        let token = mint(
            Some("abc"),
            Some("at+jwt"),
            &json!({ "iss": ISSUER, "exp": NOW + 300 }),
        );
        assert!(matches!(
            validator().validate(&token, &key_set(&["abc"])),
            Err(Rejection::MalformedToken(_))
        ));
    }

    #[test]
    fn test_normalize_type() {
        assert_eq!(normalize_type("application/AT+JWT"), "at+jwt");
        assert_eq!(normalize_type(" at+jwt "), "at+jwt");
        assert_eq!(normalize_type("jwt"), "jwt");
    }
}
