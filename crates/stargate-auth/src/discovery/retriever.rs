//! Fetch-and-parse cycle producing an [`IssuerConfiguration`]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use url::Url;

use super::fetcher::DocumentFetcher;
use super::parser::{parse_discovery, parse_key_set};
use super::types::IssuerConfiguration;
use crate::error::RetrievalError;

/// One complete retrieval: discovery document, then key set
///
/// Implemented by [`OidcConfigurationRetriever`] and by decorators such as
/// [`LoggingRetriever`](super::LoggingRetriever) that wrap it.
#[async_trait]
pub trait ConfigurationRetriever: Send + Sync {
    /// Produce a fresh snapshot from the discovery document at `address`
    ///
    /// # Errors
    ///
    /// Any [`RetrievalError`] from fetching or parsing either document
    async fn retrieve(&self, address: &str) -> Result<IssuerConfiguration, RetrievalError>;
}

#[async_trait]
impl<R: ConfigurationRetriever + ?Sized> ConfigurationRetriever for Arc<R> {
    async fn retrieve(&self, address: &str) -> Result<IssuerConfiguration, RetrievalError> {
        (**self).retrieve(address).await
    }
}

/// OpenID Connect retriever over a [`DocumentFetcher`]
#[derive(Debug, Clone)]
pub struct OidcConfigurationRetriever<F> {
    fetcher: F,
    require_https: bool,
    host_alias: Option<String>,
}

impl<F: DocumentFetcher> OidcConfigurationRetriever<F> {
    /// Create a retriever that requires `https` key-set addresses
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            require_https: true,
            host_alias: None,
        }
    }

    /// Allow a plain-HTTP key-set address
    pub fn require_https(mut self, require: bool) -> Self {
        self.require_https = require;
        self
    }

    /// Rewrite `localhost` in the published key-set address to `alias`
    ///
    /// Discovery documents served by a local identity provider advertise
    /// `localhost`, which is unreachable from inside a container.
    pub fn with_host_alias(mut self, alias: Option<String>) -> Self {
        self.host_alias = alias;
        self
    }

    fn key_set_address(&self, jwks_uri: &str) -> Result<String, RetrievalError> {
        let mut url = Url::parse(jwks_uri)
            .map_err(|e| RetrievalError::malformed(format!("jwks_uri {jwks_uri}: {e}")))?;

        if let Some(alias) = self.host_alias.as_deref()
            && url.host_str() == Some("localhost")
            && url.set_host(Some(alias)).is_err()
        {
            warn!(alias, "metadata host alias is not a valid host, keeping localhost");
        }

        if self.require_https && url.scheme() != "https" {
            return Err(RetrievalError::malformed(format!(
                "jwks_uri must use https: {url}"
            )));
        }
        Ok(url.to_string())
    }
}

#[async_trait]
impl<F: DocumentFetcher> ConfigurationRetriever for OidcConfigurationRetriever<F> {
    async fn retrieve(&self, address: &str) -> Result<IssuerConfiguration, RetrievalError> {
        let discovery = parse_discovery(&self.fetcher.fetch(address).await?)?;
        let key_set_address = self.key_set_address(&discovery.jwks_uri)?;
        let signing_keys = parse_key_set(&self.fetcher.fetch(&key_set_address).await?)?;

        debug!(
            issuer = %discovery.issuer,
            key_count = signing_keys.len(),
            "parsed issuer metadata"
        );

        Ok(IssuerConfiguration {
            issuer: discovery.issuer,
            token_endpoint: discovery.token_endpoint,
            jwks_uri: discovery.jwks_uri,
            signing_keys,
            discovered_at: Utc::now(),
        })
    }
}
