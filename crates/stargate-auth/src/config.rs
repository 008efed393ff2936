//! Authentication Configuration Types
//!
//! [`AuthOptions`] is the configuration surface the host binds from its
//! settings file and environment. It is read once at startup and turned into
//! an immutable [`ValidationPolicy`] plus the metadata address the cache
//! manager is bound to.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::jwt::ValidationPolicy;

/// Well-known path appended to the authority to locate the discovery document
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Environment variable that must be set before `insecure-dev` is honoured
pub const INSECURE_TLS_ENV_VAR: &str = "STARGATE_ALLOW_INSECURE_TLS";

/// Upper bound for the periodic refresh interval
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(86_400);

/// How the backchannel treats server certificates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    /// Validate certificate chain and hostname
    #[default]
    Strict,
    /// Accept any certificate. Development only; additionally gated on
    /// [`INSECURE_TLS_ENV_VAR`].
    InsecureDev,
}

/// When the first issuer snapshot is produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Initialization {
    /// On the first token validation
    #[default]
    Lazy,
    /// While the pipeline is assembled; startup fails if it cannot be fetched
    Eager,
}

/// Bearer authentication options
///
/// Only `authority` is required. Everything else has a production default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOptions {
    /// Issuer URL (e.g. `https://idp.example.com`)
    #[serde(default)]
    pub authority: Option<String>,

    /// Required `typ` header value
    #[serde(default = "default_token_type")]
    pub required_token_type: String,

    /// Clock-skew tolerance applied symmetrically to `exp` and `nbf`
    #[serde(default = "default_clock_skew_secs")]
    pub clock_skew_secs: u64,

    /// Periodic metadata refresh interval
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Minimum spacing between refreshes triggered by unknown key ids
    #[serde(default = "default_min_refresh_interval_secs")]
    pub min_refresh_interval_secs: u64,

    /// Ceiling for a single document fetch
    #[serde(default = "default_backchannel_timeout_secs")]
    pub backchannel_timeout_secs: u64,

    /// Reject plain-HTTP discovery and key-set addresses
    #[serde(default = "default_true")]
    pub require_https_metadata: bool,

    /// Certificate handling for the backchannel
    #[serde(default)]
    pub transport_mode: TransportMode,

    /// Accepted audiences. Empty disables the audience check.
    #[serde(default)]
    pub valid_audiences: Vec<String>,

    /// Host that replaces `localhost` in the metadata address, e.g.
    /// `host.docker.internal` when the API runs in a container
    #[serde(default)]
    pub metadata_host_alias: Option<String>,

    /// Lazy or eager first fetch
    #[serde(default)]
    pub initialization: Initialization,
}

fn default_token_type() -> String {
    "at+jwt".to_string()
}

fn default_clock_skew_secs() -> u64 {
    120
}

fn default_refresh_interval_secs() -> u64 {
    3600
}

fn default_min_refresh_interval_secs() -> u64 {
    30
}

fn default_backchannel_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            authority: None,
            required_token_type: default_token_type(),
            clock_skew_secs: default_clock_skew_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            min_refresh_interval_secs: default_min_refresh_interval_secs(),
            backchannel_timeout_secs: default_backchannel_timeout_secs(),
            require_https_metadata: true,
            transport_mode: TransportMode::Strict,
            valid_audiences: Vec::new(),
            metadata_host_alias: None,
            initialization: Initialization::Lazy,
        }
    }
}

impl AuthOptions {
    /// Options for the given authority with every other setting defaulted
    pub fn for_authority(authority: impl Into<String>) -> Self {
        Self {
            authority: Some(authority.into()),
            ..Self::default()
        }
    }

    /// Check the options are complete and coherent
    ///
    /// # Errors
    ///
    /// - [`ConfigError::ConfigurationMissing`] if `authority` is absent or blank
    /// - [`ConfigError::ConfigurationInvalid`] if the authority is not an absolute
    ///   URL, the metadata address would be plain HTTP while HTTPS is required,
    ///   a duration is zero where that makes no sense, or the refresh interval
    ///   exceeds [`MAX_REFRESH_INTERVAL`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.metadata_address()?;

        if self.required_token_type.trim().is_empty() {
            return Err(ConfigError::ConfigurationMissing(
                "required_token_type".to_string(),
            ));
        }
        if self.backchannel_timeout_secs == 0 {
            return Err(ConfigError::ConfigurationInvalid(
                "backchannel_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ConfigurationInvalid(
                "refresh_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.refresh_interval() > MAX_REFRESH_INTERVAL {
            return Err(ConfigError::ConfigurationInvalid(format!(
                "refresh_interval_secs must be at most {}",
                MAX_REFRESH_INTERVAL.as_secs()
            )));
        }
        Ok(())
    }

    /// Issuer to accept, with trailing slashes removed
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigurationMissing`] if `authority` is absent or blank
    pub fn issuer(&self) -> Result<String, ConfigError> {
        match self.authority.as_deref().map(str::trim) {
            Some(authority) if !authority.is_empty() => {
                Ok(authority.trim_end_matches('/').to_string())
            }
            _ => Err(ConfigError::ConfigurationMissing("authority".to_string())),
        }
    }

    /// Discovery document address derived from the authority
    ///
    /// Applies [`AuthOptions::metadata_host_alias`] when the authority points
    /// at `localhost`.
    ///
    /// # Errors
    ///
    /// See [`AuthOptions::validate`]
    pub fn metadata_address(&self) -> Result<String, ConfigError> {
        let issuer = self.issuer()?;
        let mut url = Url::parse(&issuer).map_err(|e| {
            ConfigError::ConfigurationInvalid(format!("authority is not an absolute URL: {e}"))
        })?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::ConfigurationInvalid(
                "authority must be an http(s) URL with a host".to_string(),
            ));
        }

        if let Some(alias) = self.metadata_host_alias.as_deref()
            && url.host_str() == Some("localhost")
        {
            url.set_host(Some(alias)).map_err(|e| {
                ConfigError::ConfigurationInvalid(format!("metadata_host_alias: {e}"))
            })?;
        }

        if self.require_https_metadata && url.scheme() != "https" {
            return Err(ConfigError::ConfigurationInvalid(
                "metadata address must use https (set require_https_metadata = false for development)"
                    .to_string(),
            ));
        }

        Ok(format!(
            "{}{DISCOVERY_PATH}",
            url.as_str().trim_end_matches('/')
        ))
    }

    /// Validation policy derived from these options
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConfigurationMissing`] if `authority` is absent
    pub fn validation_policy(&self) -> Result<ValidationPolicy, ConfigError> {
        Ok(ValidationPolicy {
            issuer: self.issuer()?,
            required_token_type: Some(self.required_token_type.clone()),
            clock_skew: self.clock_skew(),
            valid_audiences: self.valid_audiences.clone(),
        })
    }

    /// Clock-skew tolerance
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    /// Periodic refresh interval
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Cool-down between refreshes triggered by unknown key ids
    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }

    /// Ceiling for a single document fetch
    pub fn backchannel_timeout(&self) -> Duration {
        Duration::from_secs(self.backchannel_timeout_secs)
    }
}
