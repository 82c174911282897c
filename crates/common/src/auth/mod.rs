//! OAuth 2.0 Authorization Code + PKCE session management
//!
//! Keeps the user signed in against the identity provider: interactive login
//! through a browser broker, persisted tokens, silent single-flight refresh
//! and logout.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │ AuthSessionManager │  Login / logout orchestration, state signal
//! └─────────┬──────────┘
//!           │
//!           ├──► InteractiveAuthBroker  (host browser session)
//!           ├──► TokenExchange          (token endpoint, OAuthClient)
//!           ├──► TokenManager           (cache, single-flight refresh)
//!           │         │
//!           │         └──► SecureCredentialStore  (four keychain slots)
//!           │
//!           └──► PKCE utilities         (verifier, challenge, state)
//! ```
//!
//! # Session states
//!
//! `LoggedOut → Authenticating → Authenticated ⇄ RefreshingSilently`, and
//! from anywhere through `LoggingOut` back to `LoggedOut`.
//!
//! # Module Organization
//!
//! - **[`types`]**: `TokenSet`, `SessionState`, provider and session config
//! - **[`error`]**: `AuthError`
//! - **[`pkce`]**: PKCE material generation and state validation
//! - **[`client`]**: token endpoint client
//! - **[`broker`]**: channel-backed browser broker
//! - **[`token_manager`]**: token persistence and refresh
//! - **[`session`]**: the session manager

pub mod broker;
pub mod client;
pub mod error;
pub mod pkce;
pub mod session;
pub mod token_manager;
pub mod traits;
pub mod types;

pub use broker::{BrokerError, BrowserPurpose, BrowserRequest, ChannelBroker};
pub use client::OAuthClient;
pub use error::{AuthError, AuthResult};
pub use pkce::{
    generate_code_challenge, generate_code_verifier, generate_state, validate_state, PkceContext,
};
pub use session::AuthSessionManager;
pub use token_manager::TokenManager;
pub use traits::{InteractiveAuthBroker, TokenExchange};
pub use types::{
    IdentityProviderConfig, ProviderError, SessionConfig, SessionState, TokenResponse, TokenSet,
};
