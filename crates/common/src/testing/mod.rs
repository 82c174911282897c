//! Testing utilities and helpers
//!
//! - **[`fixtures`]**: canned provider configuration and token sets
//! - **[`mocks`]**: test doubles for the credential store, the token
//!   endpoint and the browser broker
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use receptionist_common::testing::{fixtures, MemoryCredentialStore, ScriptedBroker, ScriptedTokenExchange};
//! use receptionist_common::AuthSessionManager;
//!
//! let store = Arc::new(MemoryCredentialStore::new());
//! let exchange = Arc::new(ScriptedTokenExchange::new());
//! let broker = Arc::new(ScriptedBroker::approving("code-1"));
//! let manager = AuthSessionManager::new(
//!     fixtures::provider_config("https://sso.example.com"),
//!     fixtures::session_config(),
//!     store,
//!     exchange,
//!     broker,
//! );
//! assert!(!manager.is_authenticated());
//! ```

pub mod fixtures;
pub mod mocks;

pub use mocks::{
    query_param, AuthorizeBehavior, MemoryCredentialStore, ScriptedBroker, ScriptedTokenExchange,
};
