//! Authentication error taxonomy
//!
//! Every session operation reports failures through [`AuthError`]. Values are
//! `Clone` because a single refresh outcome is delivered to every caller
//! waiting on it.

use thiserror::Error;

use super::types::ProviderError;
use crate::security::KeychainError;

/// Result alias for session operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token set is held or stored
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The user dismissed the browser, or the attempt was superseded
    #[error("Login cancelled")]
    UserCancelled,

    /// The authorization callback was unusable
    #[error("Authorization callback error: {0}")]
    CallbackError(String),

    /// Callback `state` did not match the pending attempt
    #[error("State mismatch - possible CSRF attack")]
    StateMismatch,

    /// Token endpoint returned a body that could not be used
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    /// Token endpoint answered with a non-2xx status
    #[error("Token exchange rejected with HTTP {status}")]
    ExchangeRejected {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        body: Option<String>,
    },

    /// Network failure or timeout talking to the token endpoint
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The refresh token is gone or was rejected; login again
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Secure credential store failure
    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Provider error payload carried by a rejected exchange, if it parses
    #[must_use]
    pub fn provider_error(&self) -> Option<ProviderError> {
        match self {
            Self::ExchangeRejected { body: Some(body), .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }

    /// Whether a rejected refresh means the grant itself is dead
    ///
    /// True for `invalid_grant` / `invalid_token` error codes and for
    /// HTTP 401. Everything else is treated as transient.
    #[must_use]
    pub fn is_invalid_grant(&self) -> bool {
        match self {
            Self::ExchangeRejected { status: 401, .. } => true,
            Self::ExchangeRejected { .. } => self
                .provider_error()
                .is_some_and(|e| matches!(e.error.as_str(), "invalid_grant" | "invalid_token")),
            _ => false,
        }
    }

    /// Whether the caller must run an interactive login to recover
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::NotAuthenticated | Self::SessionExpired)
    }
}

impl From<KeychainError> for AuthError {
    fn from(err: KeychainError) -> Self {
        Self::Storage(err.to_string())
    }
}
