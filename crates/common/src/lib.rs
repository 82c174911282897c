//! Authentication core shared across Receptionist crates.
//!
//! # Modules
//!
//! - [`auth`]: OAuth 2.0 + PKCE session management (login, silent refresh,
//!   logout) against the identity provider
//! - [`security`]: secure credential storage (platform keychain)
//! - [`testing`]: in-memory and scripted test doubles (`test-utils` feature)
//!
//! # Feature Tiers
//!
//! - `platform` (default): OS keychain backed [`security::KeychainStore`]
//! - `test-utils`: test doubles for every injected collaborator

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod security;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use auth::{
    AuthError, AuthResult, AuthSessionManager, IdentityProviderConfig, SessionConfig,
    SessionState, TokenSet,
};
#[cfg(feature = "platform")]
pub use security::KeychainStore;
pub use security::{KeychainError, SecureCredentialStore};
