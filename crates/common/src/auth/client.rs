//! OAuth 2.0 token endpoint client
//!
//! Performs the two form-encoded POSTs of a public PKCE client:
//! - authorization code exchange
//! - refresh token grant

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::error::{AuthError, AuthResult};
use super::traits::TokenExchange;
use super::types::{IdentityProviderConfig, TokenResponse, TokenSet};

/// OAuth 2.0 client for the token endpoint
///
/// Every request is bounded by the timeout given at construction.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: IdentityProviderConfig,
    http: Client,
}

impl OAuthClient {
    /// Create a new OAuth client with the given configuration
    ///
    /// # Errors
    /// Returns `AuthError::TransportFailure` if the HTTP client cannot be
    /// built (TLS backend initialisation)
    pub fn new(config: IdentityProviderConfig, timeout: Duration) -> AuthResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::TransportFailure(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    /// Create a client around an existing `reqwest::Client`
    #[must_use]
    pub const fn with_http_client(config: IdentityProviderConfig, http: Client) -> Self {
        Self { config, http }
    }

    /// Get a reference to the identity provider configuration
    #[must_use]
    pub const fn config(&self) -> &IdentityProviderConfig {
        &self.config
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
        require_id_token: bool,
    ) -> AuthResult<TokenSet> {
        let response = self
            .http
            .post(self.config.token_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Token endpoint rejected the request");
            let body = (!body.trim().is_empty()).then_some(body);
            return Err(AuthError::ExchangeRejected { status: status.as_u16(), body });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        if let Some(token_type) = parsed.token_type.as_deref() {
            if !token_type.eq_ignore_ascii_case("bearer") {
                debug!(token_type, "Token endpoint returned a non-bearer token type");
            }
        }

        parsed.into_token_set(require_id_token)
    }
}

fn transport_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::TransportFailure("token endpoint request timed out".to_string())
    } else {
        AuthError::TransportFailure(err.to_string())
    }
}

#[async_trait]
impl TokenExchange for OAuthClient {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<TokenSet> {
        debug!("Exchanging authorization code for tokens");

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];

        self.post_token_form(&params, true).await
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenSet> {
        if refresh_token.is_empty() {
            return Err(AuthError::SessionExpired);
        }

        debug!("Refreshing access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        self.post_token_form(&params, false).await
    }
}
