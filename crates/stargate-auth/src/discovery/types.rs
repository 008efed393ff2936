//! Issuer metadata types
//!
//! [`IssuerConfiguration`] is the immutable snapshot the cache manager hands
//! out. It is always shared behind an `Arc` and replaced wholesale on refresh.

use std::fmt;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};

/// Subset of the OpenID Connect discovery document the pipeline consumes
///
/// Unknown members are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryDocument {
    /// Issuer identifier
    pub issuer: String,

    /// Token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Address of the issuer's published key set
    pub jwks_uri: String,
}

/// One verification key from the issuer's key set
#[derive(Clone)]
pub struct SigningKey {
    /// `kid` member, matched against the token header
    pub key_id: Option<String>,

    /// `alg` member, when the issuer declares one
    pub algorithm: Option<Algorithm>,

    /// `kty` member (`RSA`, `EC`, `OKP`)
    pub key_type: String,

    /// Verification key material
    pub decoding_key: DecodingKey,
}

// Key material stays out of debug output and therefore out of logs.
impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Human readable algorithm for audit records
    pub fn algorithm_name(&self) -> String {
        self.algorithm
            .map_or_else(|| "unspecified".to_string(), |alg| format!("{alg:?}"))
    }
}

/// Immutable issuer snapshot produced by one fetch-and-parse cycle
#[derive(Debug, Clone)]
pub struct IssuerConfiguration {
    /// Issuer identifier as published in the discovery document
    pub issuer: String,

    /// Token endpoint, if advertised
    pub token_endpoint: Option<String>,

    /// Key-set address the keys were fetched from
    pub jwks_uri: String,

    /// Signing keys in the order the issuer published them
    pub signing_keys: Vec<SigningKey>,

    /// When this snapshot was produced
    pub discovered_at: DateTime<Utc>,
}

impl IssuerConfiguration {
    /// Keys whose `kid` equals `key_id`
    pub fn keys_for(&self, key_id: &str) -> impl Iterator<Item = &SigningKey> {
        self.signing_keys
            .iter()
            .filter(move |key| key.key_id.as_deref() == Some(key_id))
    }

    /// Whether the snapshot publishes a key with this `kid`
    pub fn contains_key_id(&self, key_id: &str) -> bool {
        self.keys_for(key_id).next().is_some()
    }

    /// Key ids in publication order, for logging
    pub fn key_ids(&self) -> Vec<&str> {
        self.signing_keys
            .iter()
            .filter_map(|key| key.key_id.as_deref())
            .collect()
    }
}
