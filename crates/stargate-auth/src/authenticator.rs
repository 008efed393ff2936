//! Request-path entry point: snapshot lookup, validation and the single
//! key-rotation retry

use tracing::{debug, warn};

use crate::audit::{AuditEvent, AuditLog};
use crate::auth_metrics;
use crate::error::Rejection;
use crate::jwt::{AuthenticatedIdentity, TokenValidator};
use crate::manager::MetadataManager;

/// Validates bearer tokens against the manager's current snapshot
///
/// When a token names a key id the snapshot does not contain, one refresh is
/// requested (joining any refresh already running, subject to the manager's
/// cool-down) and the token is validated once more against the result.
#[derive(Debug, Clone)]
pub struct BearerAuthenticator {
    manager: MetadataManager,
    validator: TokenValidator,
    audit: AuditLog,
}

impl BearerAuthenticator {
    /// Create an authenticator
    pub fn new(manager: MetadataManager, validator: TokenValidator, audit: AuditLog) -> Self {
        Self {
            manager,
            validator,
            audit,
        }
    }

    /// The cache manager tokens are validated against
    pub fn manager(&self) -> &MetadataManager {
        &self.manager
    }

    /// Authenticate a bearer token
    ///
    /// # Errors
    ///
    /// [`Rejection::MetadataUnavailable`] if no snapshot has ever been
    /// obtained, otherwise the validator's rejection.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedIdentity, Rejection> {
        let result = self.validate_with_rotation(token).await;

        auth_metrics::record_token_validation(result.as_ref().err().map(Rejection::reason_code));
        match &result {
            Ok(identity) => self.audit.emit(AuditEvent::TokenAccepted {
                subject: identity.subject.clone(),
                issuer: identity.issuer.clone(),
                key_id: identity.key_id.clone(),
            }),
            Err(rejection) => self.audit.emit(AuditEvent::TokenRejected {
                reason_code: rejection.reason_code().to_string(),
                key_id: jsonwebtoken::decode_header(token)
                    .ok()
                    .and_then(|header| header.kid),
                detail: rejection.to_string(),
            }),
        }

        result
    }

    async fn validate_with_rotation(
        &self,
        token: &str,
    ) -> Result<AuthenticatedIdentity, Rejection> {
        let config = self
            .manager
            .current_or_refresh()
            .await
            .map_err(Rejection::MetadataUnavailable)?;

        let rejection = match self.validator.validate(token, &config) {
            Ok(identity) => return Ok(identity),
            Err(rejection) => rejection,
        };

        let Some(key_id) = rejection.unrecognized_key_id().map(str::to_string) else {
            return Err(rejection);
        };

        debug!(key_id = %key_id, "token names an unknown key id, requesting metadata refresh");
        match self.manager.request_refresh().await {
            Some(Ok(fresh)) => self.validator.validate(token, &fresh),
            Some(Err(err)) => {
                warn!(key_id = %key_id, error = %err, "refresh for unknown key id failed");
                Err(rejection)
            }
            None => Err(rejection),
        }
    }
}
