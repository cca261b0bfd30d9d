use thiserror::Error;

use qbsync_auth::AuthError;

/// Errors surfaced by the API client after its own retry policy has run.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Token acquisition or refresh failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The API rejected the bearer token. Not retried here; the caller
    /// must go through reauthorization.
    #[error("request unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited and the retry budget is spent.
    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Non-auth HTTP failure that survived the retry budget (5xx) or is
    /// deterministic (other 4xx).
    #[error("remote error (status {status}): {message}")]
    Remote { status: u16, message: String },

    /// Transport failure that survived the retry budget.
    #[error("network error: {0}")]
    Network(String),

    /// The response body was not the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether a later run of the same operation may succeed without user
    /// intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ApiError::Auth(err) => !err.requires_reauthorization(),
            ApiError::Unauthorized(_) => false,
            ApiError::RateLimited { .. } => true,
            ApiError::Remote { status, .. } => *status >= 500,
            ApiError::Network(_) => true,
            ApiError::Decode(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
