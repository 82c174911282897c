//! Traits for token exchange and interactive browser operations
//!
//! These traits abstract the external collaborators of the session manager
//! (the token endpoint and the system browser) so they can be injected and
//! replaced in tests.

use async_trait::async_trait;
use url::Url;

use super::broker::BrokerError;
use super::error::AuthResult;
use super::types::TokenSet;

/// Token endpoint operations
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange an authorization code for tokens
    ///
    /// The response must carry an id token.
    ///
    /// # Errors
    /// Returns `ExchangeRejected`, `MalformedResponse` or `TransportFailure`
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<TokenSet>;

    /// Refresh access token using refresh token
    ///
    /// The returned set may lack an id token; the caller carries the previous
    /// one over.
    ///
    /// # Errors
    /// Returns `SessionExpired` for an empty refresh token without any
    /// network call, otherwise the same errors as `exchange_code`
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenSet>;
}

/// Interactive browser session provided by the host application
///
/// The host opens `url` in an authentication browser session and resolves
/// once a navigation to `callback_scheme` happens or the user dismisses it.
#[async_trait]
pub trait InteractiveAuthBroker: Send + Sync {
    /// Present the authorization page and return the callback URL
    ///
    /// Hosts should use an ephemeral browser session here so that no
    /// identity provider cookie survives between logins.
    ///
    /// # Errors
    /// `BrokerError::Cancelled` when the user dismissed the browser
    async fn authorize(&self, url: Url, callback_scheme: &str) -> Result<Url, BrokerError>;

    /// Present the end-session page (RP-initiated logout)
    ///
    /// # Errors
    /// Any failure; the session manager only logs it
    async fn end_session(&self, url: Url, callback_scheme: &str) -> Result<(), BrokerError>;

    /// Remove cookies and site data held for `host`
    ///
    /// # Errors
    /// Any failure; the session manager only logs it
    async fn clear_site_data(&self, _host: &str) -> Result<(), BrokerError> {
        Ok(())
    }
}
