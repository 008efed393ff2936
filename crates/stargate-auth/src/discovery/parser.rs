//! Pure decoding of discovery and key-set documents
//!
//! Nothing in here performs I/O; the retriever feeds it bytes.

use std::str::FromStr;

use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;

use super::types::{DiscoveryDocument, SigningKey};
use crate::error::RetrievalError;

/// Decode a discovery document
///
/// # Errors
///
/// [`RetrievalError::MalformedMetadata`] if the bytes are not a JSON object
/// or `issuer` / `jwks_uri` are missing or blank.
pub fn parse_discovery(bytes: &[u8]) -> Result<DiscoveryDocument, RetrievalError> {
    let document: DiscoveryDocument = serde_json::from_slice(bytes)
        .map_err(|e| RetrievalError::malformed(format!("discovery document: {e}")))?;

    if document.issuer.trim().is_empty() {
        return Err(RetrievalError::malformed("discovery document has empty issuer"));
    }
    if document.jwks_uri.trim().is_empty() {
        return Err(RetrievalError::malformed(
            "discovery document has empty jwks_uri",
        ));
    }

    Ok(document)
}

/// Decode a key-set document into signing keys, preserving order
///
/// Keys published for encryption (`"use": "enc"`) are skipped. Any signing key
/// that cannot be turned into verification material fails the whole set, so a
/// snapshot never silently loses a key the issuer is signing with.
///
/// # Errors
///
/// [`RetrievalError::MalformedMetadata`] if the document has no `keys` array,
/// a signing key is unparseable, or no signing key remains.
pub fn parse_key_set(bytes: &[u8]) -> Result<Vec<SigningKey>, RetrievalError> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| RetrievalError::malformed(format!("key set: {e}")))?;

    let entries = document
        .get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| RetrievalError::malformed("key set has no keys array"))?;

    let mut keys = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        if entry.get("use").and_then(Value::as_str) == Some("enc") {
            continue;
        }
        keys.push(parse_signing_key(index, entry)?);
    }

    if keys.is_empty() {
        return Err(RetrievalError::malformed("key set contains no signing keys"));
    }

    Ok(keys)
}

fn parse_signing_key(index: usize, entry: &Value) -> Result<SigningKey, RetrievalError> {
    let key_id = entry.get("kid").and_then(Value::as_str).map(str::to_string);
    let label = key_id.clone().unwrap_or_else(|| format!("#{index}"));

    let key_type = entry
        .get("kty")
        .and_then(Value::as_str)
        .ok_or_else(|| RetrievalError::malformed(format!("key {label} has no kty")))?
        .to_string();

    let algorithm = match entry.get("alg").and_then(Value::as_str) {
        Some(alg) => Some(Algorithm::from_str(alg).map_err(|_| {
            RetrievalError::malformed(format!("key {label} declares unsupported alg {alg}"))
        })?),
        None => None,
    };

    let jwk: Jwk = serde_json::from_value(entry.clone())
        .map_err(|e| RetrievalError::malformed(format!("key {label}: {e}")))?;
    let decoding_key = DecodingKey::from_jwk(&jwk)
        .map_err(|e| RetrievalError::malformed(format!("key {label}: {e}")))?;

    Ok(SigningKey {
        key_id,
        algorithm,
        key_type,
        decoding_key,
    })
}
