//! Storage abstraction for secrets
//!
//! This trait enables dependency injection and testing by abstracting the
//! system keychain away from the session manager.

use async_trait::async_trait;

use super::keychain::KeychainError;

/// Durable key/value secret storage, scoped by namespace.
///
/// Implementations must keep values confidential at rest and must tolerate
/// concurrent `save`/`read`/`delete` calls without corrupting individual
/// entries.
#[async_trait]
pub trait SecureCredentialStore: Send + Sync {
    /// Store `value` under `namespace`/`key`, replacing any existing value.
    ///
    /// Replacement deletes the old entry before inserting the new one, so a
    /// key never holds two values at once.
    ///
    /// # Errors
    /// Returns error if the backing store rejects the write
    async fn save(&self, namespace: &str, key: &str, value: &str) -> Result<(), KeychainError>;

    /// Read the value stored under `namespace`/`key`.
    ///
    /// # Returns
    /// `None` if the key does not exist
    ///
    /// # Errors
    /// Returns error if the backing store is unavailable or access is denied
    async fn read(&self, namespace: &str, key: &str) -> Result<Option<String>, KeychainError>;

    /// Delete the value stored under `namespace`/`key` (idempotent).
    ///
    /// # Errors
    /// Returns error if the backing store rejects the deletion
    async fn delete(&self, namespace: &str, key: &str) -> Result<(), KeychainError>;
}
