use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a QuickBooks connection.
///
/// A host may hold several connections (e.g. one per company file); tokens
/// are stored and refreshed per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted OAuth token set for one connection.
///
/// The realm id identifies the QuickBooks company file the tokens are bound
/// to; every API request path includes it.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub realm_id: String,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl OAuthTokens {
    /// Builds a token set from an access/refresh pair and a lifetime in
    /// seconds, stamping the absolute expiry against the current clock.
    pub fn new(
        access_token: String,
        refresh_token: String,
        realm_id: String,
        scope: Option<String>,
        expires_in: i64,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            realm_id,
            scope,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    /// True once the access token is within `skew_secs` of its expiry.
    pub fn is_expired_with_skew(&self, skew_secs: i64) -> bool {
        Utc::now() + Duration::seconds(skew_secs) >= self.expires_at
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }
}

// Token material must never land in logs.
impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("realm_id", &self.realm_id)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Connection lifecycle state as seen by a host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No tokens stored.
    Disconnected,
    /// Authorization URL issued, waiting for the callback.
    Authorizing,
    /// Tokens stored and usable.
    Connected,
    /// Refresh token rejected; user action required.
    ReauthorizationRequired,
}
