//! # Connection Configuration
//!
//! Holds everything the sync core needs to talk to one QuickBooks company:
//! OAuth client credentials, the target environment, and API tuning knobs.
//!
//! Configuration is validated fail-fast: a missing client id or redirect URI
//! is reported before any network call is attempted. Credentials can come
//! from the host directly or from environment variables via
//! [`ConnectionConfig::from_env`].
//!
//! ## Usage
//!
//! ```
//! use qbsync_runtime::config::{ConnectionConfig, Environment};
//!
//! let config = ConnectionConfig::new(
//!     "client-id",
//!     "client-secret",
//!     "https://erp.example.com/api/method/qbsync.callback",
//!     Environment::Sandbox,
//! );
//! assert!(config.validate().is_ok());
//! assert!(config.api_base_url().contains("sandbox"));
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// QuickBooks OAuth authorization endpoint
pub const AUTHORIZE_URL: &str = "https://appcenter.intuit.com/connect/oauth2";

/// QuickBooks OAuth token endpoint (same for sandbox and production)
pub const TOKEN_URL: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";

/// OAuth scope covering the accounting API
pub const ACCOUNTING_SCOPE: &str = "com.intuit.quickbooks.accounting";

/// Target QuickBooks environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    /// Base URL for the accounting API in this environment
    pub fn api_base_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox-quickbooks.api.intuit.com",
            Environment::Production => "https://quickbooks.api.intuit.com",
        }
    }

    /// Parse from a settings string, defaulting to sandbox for anything
    /// unrecognized (the settings page stores free-form text)
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Sandbox,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for one QuickBooks connection
#[derive(Clone)]
pub struct ConnectionConfig {
    /// OAuth client id issued by the Intuit developer portal
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI registered for the OAuth callback
    pub redirect_uri: String,
    /// Sandbox or production
    pub environment: Environment,
    /// Records requested per query page
    pub page_size: u32,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Retry budget for transient API failures
    pub max_retries: u32,
    /// QuickBooks API minor version attached to data requests
    pub minor_version: u32,
}

impl ConnectionConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            environment,
            page_size: 100,
            request_timeout_secs: 30,
            max_retries: 5,
            minor_version: 65,
        }
    }

    /// Load configuration from `QBSYNC_*` environment variables.
    ///
    /// `QBSYNC_CLIENT_ID`, `QBSYNC_CLIENT_SECRET`, and
    /// `QBSYNC_REDIRECT_URI` are required; `QBSYNC_ENVIRONMENT` defaults to
    /// sandbox.
    pub fn from_env() -> Result<Self> {
        let get = |name: &str| -> Result<String> {
            std::env::var(name).map_err(|_| Error::config(name, "environment variable not set"))
        };

        let mut config = Self::new(
            get("QBSYNC_CLIENT_ID")?,
            get("QBSYNC_CLIENT_SECRET")?,
            get("QBSYNC_REDIRECT_URI")?,
            Environment::default(),
        );
        if let Ok(env) = std::env::var("QBSYNC_ENVIRONMENT") {
            config.environment = Environment::parse(&env);
        }
        config.validate()?;
        debug!(
            environment = config.environment.as_str(),
            redirect_uri = %config.redirect_uri,
            "configuration loaded from environment"
        );
        Ok(config)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Fail-fast validation of required fields
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::config("client_id", "client id is missing"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::config("client_secret", "client secret is missing"));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(Error::config("redirect_uri", "redirect URI is missing"));
        }
        if self.page_size == 0 || self.page_size > 1000 {
            return Err(Error::config(
                "page_size",
                "page size must be between 1 and 1000",
            ));
        }
        Ok(())
    }

    /// Base URL for API requests in the configured environment
    pub fn api_base_url(&self) -> &'static str {
        self.environment.api_base_url()
    }
}

// Keep the secret out of debug output.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("environment", &self.environment)
            .field("page_size", &self.page_size)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
