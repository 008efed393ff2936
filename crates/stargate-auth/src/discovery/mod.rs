//! # Issuer Metadata Discovery
//!
//! Retrieval of an OpenID Connect issuer's discovery document and published
//! key set.
//!
//! ## Layers
//!
//! 1. [`DocumentFetcher`] - raw HTTP GET over a strict or insecure-dev transport
//! 2. [`parse_discovery`] / [`parse_key_set`] - pure decoding into typed metadata
//! 3. [`OidcConfigurationRetriever`] - one fetch-and-parse cycle producing an
//!    immutable [`IssuerConfiguration`]
//! 4. [`LoggingRetriever`] - optional audit decorator with the same interface
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use stargate_auth::discovery::{
//!     ConfigurationRetriever, HttpDocumentFetcher, OidcConfigurationRetriever,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpDocumentFetcher::strict(Duration::from_secs(30))?;
//! let retriever = OidcConfigurationRetriever::new(fetcher);
//!
//! let config = retriever
//!     .retrieve("https://idp.example.com/.well-known/openid-configuration")
//!     .await?;
//! println!("{} publishes {} keys", config.issuer, config.signing_keys.len());
//! # Ok(())
//! # }
//! ```

pub mod fetcher;
pub mod logging;
pub mod parser;
pub mod retriever;
pub mod types;

pub use fetcher::{DocumentFetcher, HttpDocumentFetcher, InsecureDevAcknowledgement};
pub use logging::LoggingRetriever;
pub use parser::{parse_discovery, parse_key_set};
pub use retriever::{ConfigurationRetriever, OidcConfigurationRetriever};
pub use types::{DiscoveryDocument, IssuerConfiguration, SigningKey};
