//! Pipeline Assembler
//!
//! Turns [`AuthOptions`] into a running pipeline:
//!
//! ```text
//! HttpDocumentFetcher ─▶ OidcConfigurationRetriever ─▶ LoggingRetriever
//!                                                          │
//!                                  MetadataManager ◀───────┘
//!                                        │
//!                  TokenValidator ─▶ BearerAuthenticator ─▶ AuthLayer
//! ```
//!
//! Startup fails with [`ConfigError`] if the options are incomplete or, with
//! eager initialization, if the first snapshot cannot be fetched.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audit::AuditLog;
use crate::authenticator::BearerAuthenticator;
use crate::config::{AuthOptions, Initialization};
use crate::discovery::{
    ConfigurationRetriever, HttpDocumentFetcher, LoggingRetriever, OidcConfigurationRetriever,
};
use crate::error::{ConfigError, Rejection};
use crate::jwt::{AuthenticatedIdentity, Clock, SystemClock, TokenValidator};
use crate::manager::{MetadataManager, RefreshSettings};

/// Builder for [`AuthPipeline`]
pub struct AuthPipelineBuilder {
    options: AuthOptions,
    audit: AuditLog,
    retriever: Option<Arc<dyn ConfigurationRetriever>>,
    clock: Arc<dyn Clock>,
    background_refresh: bool,
}

impl AuthPipelineBuilder {
    /// Audit log the pipeline reports to
    pub fn audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Replace the HTTP retriever (the audit decorator is still applied)
    pub fn retriever(mut self, retriever: Arc<dyn ConfigurationRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Clock used for lifetime checks
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether to run the periodic refresh task (default: on)
    pub fn background_refresh(mut self, enabled: bool) -> Self {
        self.background_refresh = enabled;
        self
    }

    /// Validate the options and assemble the pipeline
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ConfigurationMissing`] / [`ConfigError::ConfigurationInvalid`]
    ///   from [`AuthOptions::validate`]
    /// - [`ConfigError::Retrieval`] if initialization is eager and the first
    ///   retrieval fails
    pub async fn build(self) -> Result<AuthPipeline, ConfigError> {
        let options = self.options;
        options.validate()?;

        let address = options.metadata_address()?;
        let policy = options.validation_policy()?;

        let retriever: Arc<dyn ConfigurationRetriever> = match self.retriever {
            Some(retriever) => retriever,
            None => Arc::new(
                OidcConfigurationRetriever::new(HttpDocumentFetcher::from_options(&options)?)
                    .require_https(options.require_https_metadata)
                    .with_host_alias(options.metadata_host_alias.clone()),
            ),
        };

        let manager = MetadataManager::new(
            address.clone(),
            LoggingRetriever::new(retriever, self.audit.clone()),
            RefreshSettings {
                refresh_interval: options.refresh_interval(),
                min_refresh_interval: options.min_refresh_interval(),
                expected_issuer: Some(policy.issuer.clone()),
            },
        );

        if options.initialization == Initialization::Eager {
            manager.refresh_now().await?;
        }

        let shutdown = CancellationToken::new();
        let refresh_task = self
            .background_refresh
            .then(|| manager.spawn_refresh_task(shutdown.clone()));

        info!(
            issuer = %policy.issuer,
            metadata_address = %address,
            initialization = ?options.initialization,
            transport_mode = ?options.transport_mode,
            "authentication pipeline assembled"
        );

        let validator = TokenValidator::with_clock(policy, self.clock);
        Ok(AuthPipeline {
            authenticator: Arc::new(BearerAuthenticator::new(manager, validator, self.audit)),
            shutdown,
            refresh_task: Mutex::new(refresh_task),
        })
    }
}

/// Assembled authentication pipeline
///
/// Owns the background refresh task; [`AuthPipeline::shutdown`] (or drop)
/// stops it.
#[derive(Debug)]
pub struct AuthPipeline {
    authenticator: Arc<BearerAuthenticator>,
    shutdown: CancellationToken,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl AuthPipeline {
    /// Start building a pipeline from `options`
    pub fn builder(options: AuthOptions) -> AuthPipelineBuilder {
        AuthPipelineBuilder {
            options,
            audit: AuditLog::default(),
            retriever: None,
            clock: Arc::new(SystemClock),
            background_refresh: true,
        }
    }

    /// Assemble with defaults and the given audit log
    ///
    /// # Errors
    ///
    /// See [`AuthPipelineBuilder::build`]
    pub async fn assemble(options: AuthOptions, audit: AuditLog) -> Result<Self, ConfigError> {
        Self::builder(options).audit(audit).build().await
    }

    /// Authenticate a bearer token
    ///
    /// # Errors
    ///
    /// See [`BearerAuthenticator::authenticate`]
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedIdentity, Rejection> {
        self.authenticator.authenticate(token).await
    }

    /// The request-path authenticator
    pub fn authenticator(&self) -> Arc<BearerAuthenticator> {
        Arc::clone(&self.authenticator)
    }

    /// The metadata cache manager
    pub fn manager(&self) -> &MetadataManager {
        self.authenticator.manager()
    }

    /// Tower layer wired to this pipeline
    #[cfg(feature = "middleware")]
    pub fn layer(&self) -> crate::tower::AuthLayer {
        crate::tower::AuthLayer::from_arc(self.authenticator())
    }

    /// Stop the background refresh task and wait for it to finish
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.refresh_task.lock().take();
        if let Some(task) = task
            && let Err(err) = task.await
        {
            debug!(error = %err, "metadata refresh task ended abnormally");
        }
        debug!("authentication pipeline stopped");
    }
}

impl Drop for AuthPipeline {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
