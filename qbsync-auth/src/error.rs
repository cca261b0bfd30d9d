use thiserror::Error;

/// Errors surfaced by the authorization layer.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The state parameter on the OAuth callback did not match the one
    /// issued with the authorization URL.
    #[error("OAuth state mismatch, possible CSRF attempt")]
    StateMismatch,

    /// A callback arrived but no authorization flow is in progress.
    #[error("no pending authorization flow")]
    NoPendingAuthorization,

    /// The authorization server rejected the code exchange.
    #[error("authorization code exchange failed: {0}")]
    InvalidAuthCode(String),

    /// The refresh request failed for a transient reason and can be retried.
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// The refresh token itself was rejected. The stored tokens are gone
    /// and the user must go through the authorization flow again.
    #[error("reauthorization required: {0}")]
    Reauthorize(String),

    /// No tokens are stored for this connection.
    #[error("not connected to QuickBooks")]
    NotConnected,

    /// The host secure storage backend is not usable.
    #[error("secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    /// Stored token data failed to deserialize. The corrupted entry is
    /// deleted before this error is returned.
    #[error("stored token data is corrupted: {0}")]
    TokenCorrupted(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// Whether recovering from this error requires the user to run the
    /// authorization flow again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            AuthError::Reauthorize(_) | AuthError::NotConnected | AuthError::TokenCorrupted(_)
        )
    }
}

impl From<qbsync_traits::HostError> for AuthError {
    fn from(err: qbsync_traits::HostError) -> Self {
        match err {
            qbsync_traits::HostError::NotAvailable(msg) => {
                AuthError::SecureStorageUnavailable(msg)
            }
            other => AuthError::Other(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
