//! Audit decorator around a [`ConfigurationRetriever`]

use std::time::Instant;

use async_trait::async_trait;

use super::retriever::ConfigurationRetriever;
use super::types::IssuerConfiguration;
use crate::audit::{AuditEvent, AuditLog, KeySummary};
use crate::error::RetrievalError;
use crate::auth_metrics;

/// Records every retrieval attempt and its outcome as audit events and
/// metrics, then returns the inner result untouched
#[derive(Debug, Clone)]
pub struct LoggingRetriever<R> {
    inner: R,
    audit: AuditLog,
}

impl<R> LoggingRetriever<R> {
    /// Wrap `inner`, reporting to `audit`
    pub fn new(inner: R, audit: AuditLog) -> Self {
        Self { inner, audit }
    }

    /// The wrapped retriever
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: ConfigurationRetriever> ConfigurationRetriever for LoggingRetriever<R> {
    async fn retrieve(&self, address: &str) -> Result<IssuerConfiguration, RetrievalError> {
        self.audit.emit(AuditEvent::RetrievalStarted {
            address: address.to_string(),
        });
        auth_metrics::record_retrieval_attempt();
        let started = Instant::now();

        let result = self.inner.retrieve(address).await;

        auth_metrics::record_retrieval_outcome(
            result.as_ref().err().map(RetrievalError::code),
            started.elapsed().as_secs_f64(),
        );
        match &result {
            Ok(config) => self.audit.emit(AuditEvent::RetrievalSucceeded {
                address: address.to_string(),
                issuer: config.issuer.clone(),
                key_count: config.signing_keys.len(),
                keys: config
                    .signing_keys
                    .iter()
                    .map(|key| KeySummary {
                        key_id: key.key_id.clone(),
                        algorithm: key.algorithm_name(),
                    })
                    .collect(),
            }),
            Err(err) => self.audit.emit(AuditEvent::RetrievalFailed {
                address: address.to_string(),
                cause_code: err.code().to_string(),
                cause: err.to_string(),
            }),
        }

        result
    }
}
