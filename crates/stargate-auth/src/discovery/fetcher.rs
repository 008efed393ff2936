//! # Document Fetcher
//!
//! HTTP GET of discovery and key-set documents over one of two transports:
//!
//! - **strict** (default): certificate chain and hostname are validated
//! - **insecure-dev**: any certificate is accepted
//!
//! The insecure transport can only be built from an
//! [`InsecureDevAcknowledgement`], which is obtained either from the
//! `STARGATE_ALLOW_INSECURE_TLS` environment variable or by naming the
//! acknowledgement constructor in code. Every fetch through it logs a warning
//! on the `stargate::security` target.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::{AuthOptions, INSECURE_TLS_ENV_VAR, TransportMode};
use crate::error::{ConfigError, RetrievalError};

/// Retrieval of a raw document by address
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetch the body of `address`
    ///
    /// # Errors
    ///
    /// `UnreachableIssuer`, `UntrustedCertificate`, `RetrievalTimeout` or `HttpStatus`
    async fn fetch(&self, address: &str) -> Result<Vec<u8>, RetrievalError>;
}

/// Proof that certificate validation was deliberately switched off
///
/// There is no `Default` impl.
#[derive(Debug, Clone, Copy)]
pub struct InsecureDevAcknowledgement {
    _private: (),
}

impl InsecureDevAcknowledgement {
    /// Read the acknowledgement from `STARGATE_ALLOW_INSECURE_TLS`
    ///
    /// Only `1` and `true` (any case) count.
    pub fn from_env() -> Option<Self> {
        Self::from_value(std::env::var(INSECURE_TLS_ENV_VAR).ok().as_deref())
    }

    /// Interpret a value of `STARGATE_ALLOW_INSECURE_TLS`
    pub fn from_value(value: Option<&str>) -> Option<Self> {
        value
            .filter(|value| is_truthy(value))
            .map(|_| Self { _private: () })
    }

    /// Acknowledge in code that peer certificates will not be verified
    pub fn accept_untrusted_certificates() -> Self {
        Self { _private: () }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}

/// reqwest-backed [`DocumentFetcher`]
#[derive(Debug, Clone)]
pub struct HttpDocumentFetcher {
    client: reqwest::Client,
    mode: TransportMode,
    timeout: Duration,
}

impl HttpDocumentFetcher {
    /// Fetcher that validates server certificates
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigurationInvalid`] if the HTTP client cannot be built
    pub fn strict(timeout: Duration) -> Result<Self, ConfigError> {
        let client = Self::client_builder(timeout)
            .build()
            .map_err(|e| ConfigError::ConfigurationInvalid(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            mode: TransportMode::Strict,
            timeout,
        })
    }

    /// Fetcher that accepts any server certificate
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigurationInvalid`] if the HTTP client cannot be built
    pub fn insecure_dev(
        timeout: Duration,
        _acknowledgement: InsecureDevAcknowledgement,
    ) -> Result<Self, ConfigError> {
        warn!(
            target: "stargate::security",
            "TLS certificate validation is DISABLED for issuer metadata retrieval. \
             Use only against development identity providers."
        );
        let client = Self::client_builder(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ConfigError::ConfigurationInvalid(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            mode: TransportMode::InsecureDev,
            timeout,
        })
    }

    /// Fetcher for the configured transport mode
    ///
    /// `insecure-dev` is honoured only when [`InsecureDevAcknowledgement::from_env`]
    /// succeeds; otherwise the strict transport is used and the override is
    /// logged as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigurationInvalid`] if the HTTP client cannot be built
    pub fn from_options(options: &AuthOptions) -> Result<Self, ConfigError> {
        Self::from_options_with(options, InsecureDevAcknowledgement::from_env())
    }

    /// Fetcher for the configured transport mode, given the acknowledgement
    /// state explicitly
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigurationInvalid`] if the HTTP client cannot be built
    pub fn from_options_with(
        options: &AuthOptions,
        acknowledgement: Option<InsecureDevAcknowledgement>,
    ) -> Result<Self, ConfigError> {
        let timeout = options.backchannel_timeout();
        match (options.transport_mode, acknowledgement) {
            (TransportMode::Strict, _) => Self::strict(timeout),
            (TransportMode::InsecureDev, Some(ack)) => Self::insecure_dev(timeout, ack),
            (TransportMode::InsecureDev, None) => {
                error!(
                    target: "stargate::security",
                    "transport_mode = insecure-dev but {INSECURE_TLS_ENV_VAR} is not set. \
                     Falling back to strict certificate validation. \
                     Set {INSECURE_TLS_ENV_VAR}=1 to allow insecure TLS."
                );
                Self::strict(timeout)
            }
        }
    }

    /// Transport mode in effect
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("Stargate/{}", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(3))
    }

    async fn get(&self, address: &str) -> Result<Vec<u8>, RetrievalError> {
        let response = self
            .client
            .get(address)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(address, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::HttpStatus {
                address: address.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify(address, &e))?;
        Ok(body.to_vec())
    }

    fn classify(&self, address: &str, err: &reqwest::Error) -> RetrievalError {
        if err.is_timeout() {
            return RetrievalError::RetrievalTimeout {
                address: address.to_string(),
                timeout_secs: self.timeout.as_secs(),
            };
        }
        if let Some(reason) = certificate_failure(err) {
            return RetrievalError::UntrustedCertificate {
                address: address.to_string(),
                reason,
            };
        }
        RetrievalError::UnreachableIssuer {
            address: address.to_string(),
            reason: error_chain(err),
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch(&self, address: &str) -> Result<Vec<u8>, RetrievalError> {
        if self.mode == TransportMode::InsecureDev {
            warn!(
                target: "stargate::security",
                address,
                "fetching issuer metadata WITHOUT certificate validation"
            );
        } else {
            debug!(address, "fetching issuer metadata");
        }

        // reqwest's own timeout does not cover every stage on every platform
        match tokio::time::timeout(self.timeout, self.get(address)).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::RetrievalTimeout {
                address: address.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Find a certificate verification failure anywhere in the source chain
fn certificate_failure(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>()
            && is_certificate_error(tls)
        {
            return Some(tls.to_string());
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && let Some(inner) = io.get_ref()
            && let Some(tls) = inner.downcast_ref::<rustls::Error>()
            && is_certificate_error(tls)
        {
            return Some(tls.to_string());
        }
        current = e.source();
    }

    let rendered = error_chain(err);
    rendered
        .to_ascii_lowercase()
        .contains("certificate")
        .then_some(rendered)
}

fn is_certificate_error(err: &rustls::Error) -> bool {
    matches!(
        err,
        rustls::Error::InvalidCertificate(_) | rustls::Error::NoCertificatesPresented
    )
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        rendered.push_str(": ");
        rendered.push_str(&e.to_string());
        current = e.source();
    }
    rendered
}
