//! Secure credential storage
//!
//! Secrets are addressed by a namespace (the keychain service identifier)
//! plus a logical key. [`SecureCredentialStore`] is the seam the session
//! manager depends on; [`KeychainStore`] backs it with the platform keychain.

pub mod keychain;
pub mod traits;

#[cfg(feature = "platform")]
pub use keychain::KeychainStore;
pub use keychain::KeychainError;
pub use traits::SecureCredentialStore;
