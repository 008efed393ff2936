//! # Tower Middleware Integration
//!
//! [`AuthLayer`] puts a [`BearerAuthenticator`](crate::BearerAuthenticator) in
//! front of any `http::Request` service (axum routers included).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use stargate_auth::tower::AuthLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(AuthLayer::new(authenticator))
//!     .service(my_inner_service);
//! ```
//!
//! ## Request Extensions
//!
//! On success the [`AuthenticatedIdentity`](crate::AuthenticatedIdentity) is
//! inserted into the request's extensions:
//!
//! ```rust,ignore
//! if let Some(identity) = req.extensions().get::<AuthenticatedIdentity>() {
//!     println!("Authenticated subject: {}", identity.subject);
//! }
//! ```
//!
//! Rejected requests never reach the inner service. They are answered with
//! `401 Unauthorized` and a `WWW-Authenticate: Bearer` challenge, or with
//! `503 Service Unavailable` when no issuer metadata has ever been obtained.

mod layer;
mod service;

pub use layer::AuthLayer;
pub use service::{AuthService, AuthServiceFuture};

/// Configuration for the auth layer
#[derive(Debug, Clone)]
pub struct AuthLayerConfig {
    /// Whether requests without a bearer token pass through unauthenticated
    pub allow_anonymous: bool,
    /// Request paths that skip authentication entirely
    pub bypass_paths: Vec<String>,
    /// Header the bearer token is read from
    pub auth_header: String,
}

impl Default for AuthLayerConfig {
    fn default() -> Self {
        Self {
            allow_anonymous: false,
            bypass_paths: vec!["/health".to_string()],
            auth_header: "Authorization".to_string(),
        }
    }
}

impl AuthLayerConfig {
    /// Config that lets requests without a token through
    #[must_use]
    pub fn allow_anonymous() -> Self {
        Self {
            allow_anonymous: true,
            ..Default::default()
        }
    }

    /// Add a path to the bypass list
    #[must_use]
    pub fn bypass_path(mut self, path: impl Into<String>) -> Self {
        self.bypass_paths.push(path.into());
        self
    }

    /// Set the authorization header name
    #[must_use]
    pub fn auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = header.into();
        self
    }

    /// Check if a path should bypass authentication
    #[must_use]
    pub fn should_bypass(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|p| p == path)
    }
}
