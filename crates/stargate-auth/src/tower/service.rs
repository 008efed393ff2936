//! Tower Service implementation for authentication
//!
//! [`AuthService`] implements `Service<http::Request<B>>`:
//!
//! - Skips authentication for configured bypass paths (e.g. `/health`)
//! - Extracts the token from `Authorization: Bearer <token>`
//! - Validates it with the [`BearerAuthenticator`]
//! - Inserts the [`AuthenticatedIdentity`](crate::AuthenticatedIdentity) into
//!   the request's extensions and forwards the request
//! - Answers rejections itself, so `S::Error` passes through unchanged

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::header::{HeaderValue, WWW_AUTHENTICATE};
use http::{Response, StatusCode};
use tower_service::Service;
use tracing::debug;

use crate::BearerAuthenticator;
use crate::error::Rejection;

use super::AuthLayerConfig;

/// Tower Service that performs bearer authentication
///
/// # Type Parameters
///
/// * `S` - The inner service type
#[derive(Debug, Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<BearerAuthenticator>,
    config: AuthLayerConfig,
}

impl<S> AuthService<S> {
    /// Create a new auth service
    pub fn new(inner: S, authenticator: Arc<BearerAuthenticator>, config: AuthLayerConfig) -> Self {
        Self {
            inner,
            authenticator,
            config,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Extract the bearer token from request headers
    fn extract_token<B>(&self, req: &http::Request<B>) -> Option<String> {
        let value = req.headers().get(&self.config.auth_header)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty()).then(|| token.to_string())
    }
}

/// Future type for auth service responses
pub type AuthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

impl<S, B, ResBody> Service<http::Request<B>> for AuthService<S>
where
    S: Service<http::Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = AuthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        // The clone is not guaranteed ready; swap so the polled one is used
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.config.should_bypass(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let Some(token) = self.extract_token(&req) else {
            if self.config.allow_anonymous {
                return Box::pin(async move { inner.call(req).await });
            }
            debug!(path = req.uri().path(), "request without bearer token");
            return Box::pin(async move { Ok(challenge(None)) });
        };

        let authenticator = Arc::clone(&self.authenticator);
        Box::pin(async move {
            match authenticator.authenticate(&token).await {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    inner.call(req).await
                }
                Err(rejection) => Ok(challenge(Some(&rejection))),
            }
        })
    }
}

/// Response for a request that was not authenticated
fn challenge<ResBody: Default>(rejection: Option<&Rejection>) -> Response<ResBody> {
    let mut response = Response::new(ResBody::default());

    if let Some(Rejection::MetadataUnavailable(_)) = rejection {
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        return response;
    }

    *response.status_mut() = StatusCode::UNAUTHORIZED;
    let value = match rejection {
        Some(rejection) => format!(
            "Bearer error=\"invalid_token\", error_description=\"{}\"",
            rejection.reason_code()
        ),
        None => "Bearer".to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        response.headers_mut().insert(WWW_AUTHENTICATE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrievalError;

    #[test]
    fn test_challenge_without_token() {
        let response: Response<String> = challenge(None);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn test_challenge_carries_reason_code() {
        let response: Response<String> = challenge(Some(&Rejection::Expired));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[WWW_AUTHENTICATE],
            "Bearer error=\"invalid_token\", error_description=\"expired\""
        );
    }

    #[test]
    fn test_metadata_unavailable_is_503() {
        let response: Response<String> = challenge(Some(&Rejection::MetadataUnavailable(
            RetrievalError::NotYetInitialized,
        )));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }
}
