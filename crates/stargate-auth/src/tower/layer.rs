//! Tower Layer implementation for authentication

use std::sync::Arc;
use tower::Layer;

use crate::BearerAuthenticator;

use super::AuthLayerConfig;
use super::service::AuthService;

/// Tower Layer that adds bearer authentication to services
///
/// This layer wraps inner services with [`AuthService`], which extracts and
/// validates the bearer token before forwarding requests.
#[derive(Debug, Clone)]
pub struct AuthLayer {
    authenticator: Arc<BearerAuthenticator>,
    config: AuthLayerConfig,
}

impl AuthLayer {
    /// Create a new auth layer with default configuration
    pub fn new(authenticator: BearerAuthenticator) -> Self {
        Self::from_arc(Arc::new(authenticator))
    }

    /// Create a new auth layer from a shared authenticator
    pub fn from_arc(authenticator: Arc<BearerAuthenticator>) -> Self {
        Self {
            authenticator,
            config: AuthLayerConfig::default(),
        }
    }

    /// Set the configuration for this layer
    #[must_use]
    pub fn config(mut self, config: AuthLayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Allow requests without a token to pass through
    #[must_use]
    pub fn allow_anonymous(mut self) -> Self {
        self.config.allow_anonymous = true;
        self
    }

    /// Add a path that bypasses authentication
    #[must_use]
    pub fn bypass_path(mut self, path: impl Into<String>) -> Self {
        self.config.bypass_paths.push(path.into());
        self
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService::new(inner, Arc::clone(&self.authenticator), self.config.clone())
    }
}
