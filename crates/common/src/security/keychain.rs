//! Platform keychain provider for secure credential storage
//!
//! Thin wrapper over the platform keychain for storing session secrets on
//! macOS/iOS (Keychain Services), Windows (Credential Manager) and Linux
//! (kernel keyutils).
//!
//! ## Usage
//!
//! ```no_run
//! use receptionist_common::security::{KeychainStore, SecureCredentialStore};
//!
//! # async fn example() -> Result<(), receptionist_common::security::KeychainError> {
//! let keychain = KeychainStore::new();
//! keychain.save("com.diamir.receptionist", "accessToken", "secret").await?;
//! let secret = keychain.read("com.diamir.receptionist", "accessToken").await?;
//! assert_eq!(secret.as_deref(), Some("secret"));
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Keychain error types
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Keychain access failed (permission denied, not available, etc.)
    #[error("Keychain access failed: {0}")]
    AccessFailed(String),

    /// Underlying keyring library error
    #[cfg(feature = "platform")]
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

#[cfg(feature = "platform")]
pub use platform::KeychainStore;

#[cfg(feature = "platform")]
mod platform {
    use async_trait::async_trait;
    use keyring::Entry;
    use tracing::debug;

    use super::KeychainError;
    use crate::security::traits::SecureCredentialStore;

    /// Secure credential store backed by the platform keychain
    ///
    /// Each `(namespace, key)` pair maps to one keychain item with the
    /// namespace as service and the key as account.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct KeychainStore;

    impl KeychainStore {
        /// Create a new keychain store
        #[must_use]
        pub const fn new() -> Self {
            Self
        }

        /// Store a secret value in the platform keychain
        ///
        /// An existing item is deleted first, then the new one inserted.
        ///
        /// # Errors
        /// Returns `KeychainError::AccessFailed` if keychain access fails
        pub fn set_secret(
            &self,
            namespace: &str,
            key: &str,
            value: &str,
        ) -> Result<(), KeychainError> {
            debug!(service = %namespace, key = %key, "Storing secret in keychain");

            self.delete_secret(namespace, key)?;

            let entry = Self::create_entry(namespace, key)?;
            entry.set_password(value).map_err(|e| {
                KeychainError::AccessFailed(format!("Failed to store secret for {key}: {e}"))
            })?;

            debug!(service = %namespace, key = %key, "Secret stored successfully");

            Ok(())
        }

        /// Retrieve a secret value from the platform keychain
        ///
        /// # Errors
        /// Returns `KeychainError::AccessFailed` if keychain access fails
        pub fn get_secret(&self, namespace: &str, key: &str) -> Result<Option<String>, KeychainError> {
            debug!(service = %namespace, key = %key, "Retrieving secret from keychain");

            let entry = Self::create_entry(namespace, key)?;
            match entry.get_password() {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(KeychainError::AccessFailed(format!(
                    "Failed to retrieve secret for {key}: {e}"
                ))),
            }
        }

        /// Delete a secret from the platform keychain (idempotent)
        ///
        /// # Errors
        /// Returns `KeychainError::AccessFailed` if keychain access fails
        pub fn delete_secret(&self, namespace: &str, key: &str) -> Result<(), KeychainError> {
            debug!(service = %namespace, key = %key, "Deleting secret from keychain");

            let entry = Self::create_entry(namespace, key)?;
            if let Err(e) = entry.delete_credential() {
                if !matches!(e, keyring::Error::NoEntry) {
                    return Err(KeychainError::AccessFailed(format!(
                        "Failed to delete secret for {key}: {e}"
                    )));
                }
            }

            Ok(())
        }

        fn create_entry(namespace: &str, key: &str) -> Result<Entry, KeychainError> {
            Entry::new(namespace, key).map_err(|e| {
                KeychainError::AccessFailed(format!("Failed to create keychain entry: {e}"))
            })
        }
    }

    #[async_trait]
    impl SecureCredentialStore for KeychainStore {
        async fn save(&self, namespace: &str, key: &str, value: &str) -> Result<(), KeychainError> {
            self.set_secret(namespace, key, value)
        }

        async fn read(&self, namespace: &str, key: &str) -> Result<Option<String>, KeychainError> {
            self.get_secret(namespace, key)
        }

        async fn delete(&self, namespace: &str, key: &str) -> Result<(), KeychainError> {
            self.delete_secret(namespace, key)
        }
    }
}
