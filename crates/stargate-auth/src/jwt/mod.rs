//! Access-token claims and validation
//!
//! # Modules
//!
//! - `validator` - ordered structural, type, signature, issuer and lifetime checks

pub mod validator;

pub use validator::{
    AuthenticatedIdentity, Clock, FixedClock, SystemClock, TokenValidator, ValidationPolicy,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `aud` is either a single string or an array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "api"`
    One(String),
    /// `"aud": ["api", "admin"]`
    Many(Vec<String>),
}

impl Audience {
    /// All audience values
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(aud) => vec![aud.as_str()],
            Self::Many(auds) => auds.iter().map(String::as_str).collect(),
        }
    }
}

/// Claims of an OAuth 2.0 JWT access token
///
/// Registered claims per RFC 7519 plus the `client_id` and `scope` members
/// access tokens commonly carry. Everything else lands in `additional`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TokenClaims {
    /// Issuer (iss)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject (sub)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience (aud)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration Time (exp) - Unix timestamp
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,

    /// Not Before (nbf) - Unix timestamp
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,

    /// Issued At (iat) - Unix timestamp
    #[serde(
        default,
        deserialize_with = "numeric_date::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,

    /// JWT ID (jti)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// OAuth client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Space-separated scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Additional claims
    #[serde(flatten)]
    pub additional: HashMap<String, serde_json::Value>,
}

impl TokenClaims {
    /// Scopes split on whitespace
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Audience values, empty when absent
    pub fn audiences(&self) -> Vec<String> {
        self.aud
            .as_ref()
            .map(|aud| aud.values().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// RFC 7519 `NumericDate`: whole or fractional seconds, floored to whole seconds
mod numeric_date {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Whole(i64),
        Fractional(f64),
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Seconds>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Seconds::Whole(secs)) => Ok(Some(secs)),
            Some(Seconds::Fractional(secs)) if secs.is_finite() => Ok(Some(secs.floor() as i64)),
            Some(Seconds::Fractional(_)) => Err(D::Error::custom("NumericDate must be finite")),
        }
    }
}
