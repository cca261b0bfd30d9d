//! Secure Credential Storage
//!
//! Abstracts encrypted-at-rest storage for OAuth tokens:
//! - macOS: Keychain
//! - Windows: DPAPI
//! - Linux: Secret Service / libsecret
//! - Server deployments: an encrypted settings table
//!
//! # Security Requirements
//!
//! Implementations MUST:
//! - Encrypt values at rest
//! - Never log stored values
//! - Overwrite (not merge) on repeated writes to the same key

use async_trait::async_trait;

use crate::error::Result;

/// Secure key-value storage for credentials
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a secret value under a key, replacing any existing value
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value, or `None` if the key does not exist
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Idempotent: succeeds if the key does not exist.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check whether a secret exists without retrieving it
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}
