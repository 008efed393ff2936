//! Structured Audit Logging for Authentication Events
//!
//! Metadata retrieval attempts and token decisions are emitted as
//! [`AuditRecord`]s to an [`AuditSink`]. The sink is constructed by the host
//! and passed into the pipeline; nothing here touches global logger state.
//!
//! ## Event Types
//!
//! - [`AuditEvent::RetrievalStarted`] - a fetch of issuer metadata began
//! - [`AuditEvent::RetrievalSucceeded`] - a snapshot was produced, with key ids and algorithms
//! - [`AuditEvent::RetrievalFailed`] - the attempt failed, with its cause
//! - [`AuditEvent::TokenAccepted`] - a bearer token was accepted
//! - [`AuditEvent::TokenRejected`] - a bearer token was refused, with a reason code
//!
//! Records never carry a raw token or key material.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use stargate_auth::audit::{AuditEvent, AuditLog, MemoryAuditSink};
//!
//! let sink = Arc::new(MemoryAuditSink::default());
//! let log = AuditLog::new("stargate-api", sink.clone());
//!
//! log.emit(AuditEvent::RetrievalStarted {
//!     address: "https://idp.example.com/.well-known/openid-configuration".to_string(),
//! });
//! assert_eq!(sink.records().len(), 1);
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Authentication event types for audit logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Metadata retrieval is about to query `address`
    RetrievalStarted {
        /// Discovery address
        address: String,
    },
    /// Metadata retrieval produced a snapshot
    RetrievalSucceeded {
        /// Discovery address
        address: String,
        /// Issuer published in the discovery document
        issuer: String,
        /// Number of signing keys in the snapshot
        key_count: usize,
        /// Per-key identifiers and algorithms
        keys: Vec<KeySummary>,
    },
    /// Metadata retrieval failed
    RetrievalFailed {
        /// Discovery address
        address: String,
        /// Stable error code
        cause_code: String,
        /// Rendered error
        cause: String,
    },
    /// A bearer token was accepted
    TokenAccepted {
        /// `sub` claim
        subject: String,
        /// `iss` claim
        issuer: String,
        /// Key that verified the signature
        key_id: Option<String>,
    },
    /// A bearer token was refused
    TokenRejected {
        /// Stable reason code
        reason_code: String,
        /// Header `kid`, when present
        key_id: Option<String>,
        /// Rendered rejection
        detail: String,
    },
}

/// Identifier and algorithm of one published key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySummary {
    /// `kid`
    pub key_id: Option<String>,
    /// `alg`, or `unspecified`
    pub algorithm: String,
}

/// Audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique, time-ordered record id
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Service that generated the event
    pub service: String,
    /// The audit event
    pub event: AuditEvent,
}

/// Failure reported by an [`AuditSink`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audit sink unavailable: {0}")]
pub struct AuditSinkError(pub String);

/// Destination for audit records
///
/// A failed write is logged by [`AuditLog`] and the record dropped; the
/// operation being audited carries on.
pub trait AuditSink: Send + Sync {
    /// Consume one record
    ///
    /// # Errors
    ///
    /// [`AuditSinkError`] if the record could not be written
    fn record(&self, record: &AuditRecord) -> Result<(), AuditSinkError>;
}

/// Sink that writes records as `tracing` events on the `audit::auth` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditSinkError> {
        match &record.event {
            AuditEvent::RetrievalStarted { address } => {
                info!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "retrieval_started",
                    address = %address,
                    service = %record.service,
                    "Retrieving issuer metadata"
                );
            }
            AuditEvent::RetrievalSucceeded {
                address,
                issuer,
                key_count,
                keys,
            } => {
                info!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "retrieval_succeeded",
                    address = %address,
                    issuer = %issuer,
                    key_count = key_count,
                    service = %record.service,
                    "Issuer metadata retrieved"
                );
                for key in keys {
                    info!(
                        target: "audit::auth",
                        audit_id = %record.id,
                        event_type = "signing_key",
                        key_id = key.key_id.as_deref().unwrap_or("-"),
                        algorithm = %key.algorithm,
                        "Signing key available"
                    );
                }
            }
            AuditEvent::RetrievalFailed {
                address,
                cause_code,
                cause,
            } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "retrieval_failed",
                    address = %address,
                    cause_code = %cause_code,
                    cause = %cause,
                    service = %record.service,
                    "Issuer metadata retrieval failed"
                );
            }
            AuditEvent::TokenAccepted {
                subject,
                issuer,
                key_id,
            } => {
                debug!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "token_accepted",
                    subject = %subject,
                    issuer = %issuer,
                    key_id = ?key_id,
                    service = %record.service,
                    "Bearer token accepted"
                );
            }
            AuditEvent::TokenRejected {
                reason_code,
                key_id,
                detail,
            } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "token_rejected",
                    reason_code = %reason_code,
                    key_id = ?key_id,
                    detail = %detail,
                    service = %record.service,
                    "Bearer token rejected"
                );
            }
        }
        Ok(())
    }
}

/// Sink that keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Copy of everything recorded so far
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Events only, in order
    pub fn events(&self) -> Vec<AuditEvent> {
        self.records
            .lock()
            .iter()
            .map(|record| record.event.clone())
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditSinkError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Handle used by the pipeline to emit audit events
#[derive(Clone)]
pub struct AuditLog {
    service_name: String,
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("service_name", &self.service_name)
            .finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Create an audit log writing to `sink`
    pub fn new(service_name: impl Into<String>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            service_name: service_name.into(),
            sink,
        }
    }

    /// Audit log writing to [`TracingAuditSink`]
    pub fn tracing(service_name: impl Into<String>) -> Self {
        Self::new(service_name, Arc::new(TracingAuditSink))
    }

    /// Emit an event
    ///
    /// A sink failure is reported through `tracing` and otherwise ignored.
    pub fn emit(&self, event: AuditEvent) {
        let record = AuditRecord {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            service: self.service_name.clone(),
            event,
        };

        if let Err(err) = self.sink.record(&record) {
            warn!(audit_id = %record.id, error = %err, "audit record dropped");
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::tracing("stargate")
    }
}
