//! Error taxonomy for the authentication pipeline
//!
//! Errors fall into three families that propagate differently:
//!
//! - [`RetrievalError`] - metadata could not be fetched or parsed. Recovered
//!   locally by the cache manager whenever a previous snapshot exists.
//! - [`Rejection`] - an inbound token was refused. Always surfaces to the
//!   request path; never retried except for the single key-rotation refresh.
//! - [`ConfigError`] - startup configuration is incomplete. Fatal.

use thiserror::Error;

/// Failure to obtain issuer metadata.
///
/// `Clone` so that one in-flight refresh can hand the same failure to every
/// caller that joined it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetrievalError {
    /// Network error while contacting the issuer
    #[error("issuer unreachable at {address}: {reason}")]
    UnreachableIssuer { address: String, reason: String },

    /// The peer presented a certificate the strict transport does not trust
    #[error("untrusted certificate presented by {address}: {reason}")]
    UntrustedCertificate { address: String, reason: String },

    /// The backchannel timeout elapsed before the document arrived
    #[error("retrieval of {address} timed out after {timeout_secs}s")]
    RetrievalTimeout { address: String, timeout_secs: u64 },

    /// The issuer answered with a non-success status
    #[error("issuer returned HTTP {status} for {address}")]
    HttpStatus { address: String, status: u16 },

    /// Discovery or key-set document violates the expected schema
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    /// No snapshot has been produced yet
    #[error("issuer configuration not yet initialized")]
    NotYetInitialized,
}

impl RetrievalError {
    /// Create a malformed-metadata error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMetadata(reason.into())
    }

    /// Stable code used in audit records
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnreachableIssuer { .. } => "unreachable_issuer",
            Self::UntrustedCertificate { .. } => "untrusted_certificate",
            Self::RetrievalTimeout { .. } => "retrieval_timeout",
            Self::HttpStatus { .. } => "http_status",
            Self::MalformedMetadata(_) => "malformed_metadata",
            Self::NotYetInitialized => "not_yet_initialized",
        }
    }
}

/// Why a bearer token was refused.
///
/// Messages never contain the token itself or any key material.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    /// Not three base64url segments, or header/payload are not JSON objects
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// Header `typ` differs from the required token type
    #[error("wrong token type: expected {expected}, found {found:?}")]
    WrongTokenType {
        expected: String,
        found: Option<String>,
    },

    /// No signing key in the snapshot verifies the signature
    #[error("signature invalid: {reason}")]
    SignatureInvalid {
        reason: String,
        /// Set when the token names a key id the snapshot does not contain
        unrecognized_key_id: Option<String>,
    },

    /// `iss` claim missing or different from the configured issuer
    #[error("issuer mismatch: expected {expected}, found {found:?}")]
    IssuerMismatch {
        expected: String,
        found: Option<String>,
    },

    /// `exp` missing, or in the past beyond the clock-skew tolerance
    #[error("token expired")]
    Expired,

    /// `nbf` in the future beyond the clock-skew tolerance
    #[error("token not yet valid")]
    NotYetValid,

    /// `aud` does not contain any accepted audience
    #[error("audience mismatch")]
    AudienceMismatch,

    /// No issuer snapshot has ever been obtained, so nothing can be verified
    #[error("issuer metadata unavailable: {0}")]
    MetadataUnavailable(RetrievalError),
}

impl Rejection {
    /// Stable reason code for audit logs and `WWW-Authenticate` descriptions
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "malformed_token",
            Self::WrongTokenType { .. } => "wrong_token_type",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::IssuerMismatch { .. } => "issuer_mismatch",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::AudienceMismatch => "audience_mismatch",
            Self::MetadataUnavailable(_) => "metadata_unavailable",
        }
    }

    /// Key id the issuer has not published (yet), if that caused the rejection
    pub fn unrecognized_key_id(&self) -> Option<&str> {
        match self {
            Self::SignatureInvalid {
                unrecognized_key_id,
                ..
            } => unrecognized_key_id.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn signature(reason: impl Into<String>) -> Self {
        Self::SignatureInvalid {
            reason: reason.into(),
            unrecognized_key_id: None,
        }
    }
}

/// Startup configuration errors. The host must not serve requests after one of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// A setting is present but unusable
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    /// Eager initialization could not obtain the first snapshot
    #[error("initial metadata retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
}
