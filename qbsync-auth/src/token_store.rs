use std::sync::Arc;

use qbsync_traits::SecureStore;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};
use crate::types::{ConnectionId, OAuthTokens};

const TOKEN_KEY_PREFIX: &str = "qbsync_tokens";

/// Persists OAuth token sets through the host's [`SecureStore`].
///
/// Tokens are serialized as JSON under a key derived from the connection id.
/// Writes replace the whole set atomically from the caller's perspective;
/// there is never a state where an access token and a refresh token from
/// different generations coexist.
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
}

impl TokenStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self { secure_store }
    }

    fn key(connection_id: ConnectionId) -> String {
        format!("{TOKEN_KEY_PREFIX}:{connection_id}")
    }

    pub async fn store(&self, connection_id: ConnectionId, tokens: &OAuthTokens) -> Result<()> {
        let serialized = serde_json::to_vec(tokens)?;
        self.secure_store
            .set_secret(&Self::key(connection_id), &serialized)
            .await?;
        debug!(%connection_id, realm_id = %tokens.realm_id, "stored token set");
        Ok(())
    }

    /// Loads the token set for a connection.
    ///
    /// Returns [`AuthError::NotConnected`] when no tokens are stored. If the
    /// stored payload fails to parse it is deleted before the error is
    /// returned, so the connection degrades to a clean disconnected state.
    pub async fn retrieve(&self, connection_id: ConnectionId) -> Result<OAuthTokens> {
        let key = Self::key(connection_id);
        let raw = self
            .secure_store
            .get_secret(&key)
            .await?
            .ok_or(AuthError::NotConnected)?;

        match serde_json::from_slice(&raw) {
            Ok(tokens) => Ok(tokens),
            Err(err) => {
                warn!(%connection_id, error = %err, "stored tokens corrupted, deleting");
                let _ = self.secure_store.delete_secret(&key).await;
                Err(AuthError::TokenCorrupted(err.to_string()))
            }
        }
    }

    pub async fn delete(&self, connection_id: ConnectionId) -> Result<()> {
        self.secure_store
            .delete_secret(&Self::key(connection_id))
            .await?;
        debug!(%connection_id, "deleted token set");
        Ok(())
    }

    pub async fn has_tokens(&self, connection_id: ConnectionId) -> Result<bool> {
        Ok(self
            .secure_store
            .has_secret(&Self::key(connection_id))
            .await?)
    }
}
