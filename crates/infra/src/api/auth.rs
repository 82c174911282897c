//! Bearer token source for backend calls
//!
//! The API client never touches tokens directly; it asks an
//! [`AccessTokenProvider`] for a fresh access token before every request.

use async_trait::async_trait;
use receptionist_common::auth::AuthSessionManager;

use super::errors::ApiError;

/// Trait for providing access tokens
///
/// This trait allows dependency injection and testing with mock providers.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Get a valid access token
    ///
    /// This method should handle token refresh if needed.
    async fn access_token(&self) -> Result<String, ApiError>;
}

#[async_trait]
impl AccessTokenProvider for AuthSessionManager {
    async fn access_token(&self) -> Result<String, ApiError> {
        self.with_fresh_token().await.map_err(ApiError::from)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use receptionist_common::auth::SessionState;
    use receptionist_common::testing::fixtures;
    use receptionist_common::testing::{
        MemoryCredentialStore, ScriptedBroker, ScriptedTokenExchange,
    };

    use super::*;

    fn session(exchange: Arc<ScriptedTokenExchange>) -> AuthSessionManager {
        AuthSessionManager::new(
            fixtures::provider_config("https://sso.example.com"),
            fixtures::session_config(),
            Arc::new(MemoryCredentialStore::new()),
            exchange,
            Arc::new(ScriptedBroker::approving("code-1")),
        )
    }

    #[tokio::test]
    async fn test_logged_out_session_requires_login() {
        let provider = session(Arc::new(ScriptedTokenExchange::new()));

        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, ApiError::LoginRequired(_)));
        assert!(!err.should_retry());
    }

    #[tokio::test]
    async fn test_authenticated_session_provides_token() {
        let exchange = Arc::new(ScriptedTokenExchange::new());
        exchange.push_code_response(Ok(fixtures::token_set("a", 300)));
        let provider = session(exchange);

        provider.start_login().await.unwrap();
        assert_eq!(provider.state(), SessionState::Authenticated);
        assert_eq!(provider.access_token().await.unwrap(), "access-a");
    }
}
