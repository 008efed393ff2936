//! # Stargate Auth
//!
//! OpenID Connect bearer-token authentication for the Stargate API.
//!
//! ## Components
//!
//! - [`discovery`] - fetch and parse the issuer's discovery document and key set
//! - [`MetadataManager`] - cached issuer snapshot with single-flight refresh,
//!   stale-on-failure serving and a cancellable periodic refresh task
//! - [`TokenValidator`] - ordered checks of structure, type, signature,
//!   issuer, lifetime and audience
//! - [`BearerAuthenticator`] - validation plus one refresh when a token names
//!   an unknown signing key
//! - [`AuthPipeline`] - assembles everything from [`AuthOptions`]
//! - [`tower`] - `AuthLayer` middleware (feature `middleware`, on by default)
//! - [`audit`] - structured audit records on the `audit::auth` target
//! - [`auth_metrics`] - retrieval and validation counters (feature `metrics`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stargate_auth::{AuthOptions, AuthPipeline, audit::AuditLog};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = AuthOptions::for_authority("https://idp.example.com");
//! let pipeline = AuthPipeline::assemble(options, AuditLog::tracing("stargate-api")).await?;
//!
//! match pipeline.authenticate("eyJhbGciOi...").await {
//!     Ok(identity) => println!("authenticated {}", identity.subject),
//!     Err(rejection) => println!("rejected: {}", rejection.reason_code()),
//! }
//!
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Transport Security
//!
//! Metadata is fetched with certificate validation. `transport_mode =
//! "insecure-dev"` disables it only when `STARGATE_ALLOW_INSECURE_TLS=1` is
//! also set, and every insecure fetch is logged on `stargate::security`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod audit;
pub mod authenticator;
pub mod config;
pub mod discovery;
pub mod error;
pub mod jwt;
pub mod manager;
pub mod auth_metrics;
pub mod pipeline;

#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

pub use auth_metrics::init_auth_metrics;
pub use authenticator::BearerAuthenticator;
pub use config::{AuthOptions, Initialization, TransportMode};
pub use discovery::{IssuerConfiguration, SigningKey};
pub use error::{ConfigError, Rejection, RetrievalError};
pub use jwt::{AuthenticatedIdentity, TokenClaims, TokenValidator, ValidationPolicy};
pub use manager::{CacheState, MetadataManager};
pub use pipeline::{AuthPipeline, AuthPipelineBuilder};
