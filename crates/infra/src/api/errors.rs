//! API-specific error types
//!
//! Provides error classification for API operations with retry metadata.

use std::time::Duration;

use receptionist_common::auth::AuthError;
use thiserror::Error;

/// Categories of API errors for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// Authentication errors (401, 403) - non-retryable, the same bearer
    /// token would be presented again
    Authentication,
    /// The session is gone - only an interactive login helps
    LoginRequired,
    /// Rate limiting errors (429) - retry with backoff
    RateLimit,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth) - non-retryable
    Client,
    /// Network/connection errors - retryable
    Network,
    /// Configuration errors - non-retryable
    Config,
}

/// API operation errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Login required: {0}")]
    LoginRequired(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    /// Get the error category for this error
    #[must_use]
    pub const fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Auth(_) => ApiErrorCategory::Authentication,
            Self::LoginRequired(_) => ApiErrorCategory::LoginRequired,
            Self::RateLimit(_) => ApiErrorCategory::RateLimit,
            Self::Server(_) => ApiErrorCategory::Server,
            Self::Client(_) => ApiErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => ApiErrorCategory::Network,
            Self::Config(_) => ApiErrorCategory::Config,
        }
    }

    /// Check if this error should be retried
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(
            self.category(),
            ApiErrorCategory::RateLimit
                | ApiErrorCategory::Server
                | ApiErrorCategory::Network
        )
    }

    /// Get suggested retry delay in seconds
    #[must_use]
    pub const fn retry_delay_secs(&self) -> u64 {
        match self.category() {
            ApiErrorCategory::Network => 5,
            ApiErrorCategory::RateLimit => 60,
            ApiErrorCategory::Server => 10,
            ApiErrorCategory::Authentication
            | ApiErrorCategory::LoginRequired
            | ApiErrorCategory::Client
            | ApiErrorCategory::Config => 0,
        }
    }
}

/// Token acquisition failures seen from the API side
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let msg = err.to_string();
        match &err {
            e if e.requires_login() => Self::LoginRequired(msg),
            AuthError::TransportFailure(_) => Self::Network(msg),
            AuthError::ExchangeRejected { status, .. } if *status >= 500 => Self::Server(msg),
            AuthError::MalformedResponse(_) => Self::Server(msg),
            _ => Self::Auth(msg),
        }
    }
}
