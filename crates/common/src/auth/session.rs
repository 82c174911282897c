//! Authentication session manager
//!
//! Single authority for the user's session. Orchestrates the PKCE
//! authorization flow through the browser broker, token persistence and
//! refresh through the [`TokenManager`], and logout.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::broker::BrokerError;
use super::client::OAuthClient;
use super::error::{AuthError, AuthResult};
use super::pkce::{validate_state, PkceContext};
use super::token_manager::TokenManager;
use super::traits::{InteractiveAuthBroker, TokenExchange};
use super::types::{IdentityProviderConfig, SessionConfig, SessionState, TokenSet};
use crate::security::SecureCredentialStore;

/// The one login attempt allowed to complete
struct PendingLogin {
    pkce: PkceContext,
    epoch: u64,
}

struct SessionInner {
    config: IdentityProviderConfig,
    exchange: Arc<dyn TokenExchange>,
    broker: Arc<dyn InteractiveAuthBroker>,
    tokens: Arc<TokenManager>,
    pending: Mutex<Option<PendingLogin>>,
}

/// Authentication session manager
///
/// Cheap to clone; clones share the same session.
///
/// # Examples
/// ```no_run
/// use std::sync::Arc;
///
/// use receptionist_common::auth::{AuthSessionManager, ChannelBroker, IdentityProviderConfig, SessionConfig};
/// use receptionist_common::security::KeychainStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = IdentityProviderConfig::keycloak(
///     "https://sso.diamir.dev",
///     "nein",
///     "receptionist-dev-public",
///     "com.diamir.receptionist:/oauth2redirect",
/// )?;
/// let (broker, _browser_requests) = ChannelBroker::new(4);
///
/// let session = AuthSessionManager::with_oauth_client(
///     config,
///     SessionConfig::default(),
///     Arc::new(KeychainStore::new()),
///     Arc::new(broker),
/// )?;
/// session.initialize().await?;
///
/// if !session.is_authenticated() {
///     session.start_login().await?;
/// }
/// let bearer = session.with_fresh_token().await?;
/// # let _ = bearer;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthSessionManager {
    inner: Arc<SessionInner>,
}

impl AuthSessionManager {
    /// Create a session manager from its collaborators
    #[must_use]
    pub fn new(
        config: IdentityProviderConfig,
        session: SessionConfig,
        store: Arc<dyn SecureCredentialStore>,
        exchange: Arc<dyn TokenExchange>,
        broker: Arc<dyn InteractiveAuthBroker>,
    ) -> Self {
        let tokens = Arc::new(TokenManager::new(
            store,
            Arc::clone(&exchange),
            session.keychain_service,
            session.refresh_margin_secs,
        ));

        Self {
            inner: Arc::new(SessionInner {
                config,
                exchange,
                broker,
                tokens,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Create a session manager talking to the real token endpoint
    ///
    /// # Errors
    /// Returns `AuthError::TransportFailure` if the HTTP client cannot be
    /// built
    pub fn with_oauth_client(
        config: IdentityProviderConfig,
        session: SessionConfig,
        store: Arc<dyn SecureCredentialStore>,
        broker: Arc<dyn InteractiveAuthBroker>,
    ) -> AuthResult<Self> {
        let client = OAuthClient::new(config.clone(), session.request_timeout())?;
        Ok(Self::new(config, session, store, Arc::new(client), broker))
    }

    /// Load any persisted session
    ///
    /// Should be called on app startup.
    ///
    /// # Returns
    /// `true` if a token set was found
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store cannot be read
    pub async fn initialize(&self) -> AuthResult<bool> {
        self.inner.tokens.initialize().await
    }

    /// Begin an interactive login and return the authorization URL
    ///
    /// Replaces any pending attempt; the replaced attempt can no longer
    /// complete. Allowed while authenticated (re-login).
    #[must_use]
    pub fn begin_login(&self) -> Url {
        self.begin_attempt().0
    }

    fn begin_attempt(&self) -> (Url, String) {
        let pkce = PkceContext::generate();
        let url = self.authorization_url(&pkce);
        let state = pkce.state.clone();
        let pending = PendingLogin { pkce, epoch: self.inner.tokens.epoch() };

        if self.inner.pending.lock().replace(pending).is_some() {
            debug!("Superseded pending login attempt");
        }
        self.inner.tokens.publish(SessionState::Authenticating);

        info!("Generated authorization URL");
        (url, state)
    }

    /// Complete the pending login from the authorization callback URL
    ///
    /// # Errors
    /// - `CallbackError` when no login is pending, the callback carries an
    ///   OAuth error, or it lacks a code
    /// - `UserCancelled` when the provider reports `access_denied` or the
    ///   session was logged out meanwhile
    /// - `StateMismatch` when the callback state differs from the attempt's
    /// - token exchange and storage errors
    pub async fn complete_login(&self, callback: &Url) -> AuthResult<TokenSet> {
        let Some(pending) = self.inner.pending.lock().take() else {
            return Err(AuthError::CallbackError("no login in progress".into()));
        };

        let result = self.finish_login(&pending, callback).await;
        self.conclude_attempt(result).await
    }

    /// Run a full interactive login through the browser broker
    ///
    /// # Errors
    /// `UserCancelled` when the user dismissed the browser or the attempt was
    /// superseded, otherwise as [`complete_login`](Self::complete_login)
    pub async fn start_login(&self) -> AuthResult<TokenSet> {
        let (url, attempt_state) = self.begin_attempt();
        let outcome = self.inner.broker.authorize(url, self.inner.config.callback_scheme()).await;

        let pending = {
            let mut slot = self.inner.pending.lock();
            if slot.as_ref().is_some_and(|p| p.pkce.state == attempt_state) {
                slot.take()
            } else {
                None
            }
        };
        let Some(pending) = pending else {
            debug!("Login attempt was superseded or abandoned");
            return Err(AuthError::UserCancelled);
        };

        let result = match outcome {
            Ok(callback) => self.finish_login(&pending, &callback).await,
            Err(BrokerError::Cancelled) => Err(AuthError::UserCancelled),
            Err(BrokerError::Failed(message)) => Err(AuthError::CallbackError(message)),
        };
        self.conclude_attempt(result).await
    }

    async fn finish_login(&self, pending: &PendingLogin, callback: &Url) -> AuthResult<TokenSet> {
        let code = parse_callback(callback, &pending.pkce.state)?;

        let tokens = self.inner.exchange.exchange_code(&code, &pending.pkce.code_verifier).await?;

        if !self.inner.tokens.commit(tokens.clone(), pending.epoch).await? {
            debug!("Logged out while login was completing");
            return Err(AuthError::UserCancelled);
        }

        Ok(tokens)
    }

    async fn conclude_attempt(&self, result: AuthResult<TokenSet>) -> AuthResult<TokenSet> {
        match &result {
            Ok(_) => {
                info!("Login completed");
                self.inner.tokens.publish_if(&[SessionState::Authenticating], SessionState::Authenticated);
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                if self.inner.pending.lock().is_none() {
                    self.inner.tokens.settle_after_login().await;
                }
            }
        }
        result
    }

    /// Get an access token valid beyond the refresh margin
    ///
    /// # Errors
    /// - `NotAuthenticated` when logged out
    /// - `SessionExpired` when the refresh token was rejected
    /// - transient exchange errors (session kept)
    pub async fn with_fresh_token(&self) -> AuthResult<String> {
        self.inner.tokens.access_token().await
    }

    /// End the session
    ///
    /// Presents the provider's end-session page when an id token exists,
    /// deletes every credential slot, clears the provider's site data and
    /// always ends in `LoggedOut`. Remote and site-data failures are only
    /// logged.
    ///
    /// # Errors
    /// Returns the first credential slot deletion error
    pub async fn logout(&self) -> AuthResult<()> {
        info!("Logging out");

        if self.inner.pending.lock().take().is_some() {
            debug!("Discarded pending login attempt");
        }
        self.inner.tokens.invalidate();
        self.inner.tokens.publish(SessionState::LoggingOut);

        let id_token = self.inner.tokens.id_token().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read id token, skipping remote logout");
            None
        });

        match id_token {
            Some(id_token) => {
                let url = self.end_session_url(&id_token);
                if let Err(e) =
                    self.inner.broker.end_session(url, self.inner.config.callback_scheme()).await
                {
                    warn!(error = %e, "Remote end-session failed, continuing locally");
                }
            }
            None => debug!("No id token stored, skipping remote end-session"),
        }

        let cleared = self.inner.tokens.clear().await;

        if let Some(host) = self.inner.config.provider_host() {
            if let Err(e) = self.inner.broker.clear_site_data(&host).await {
                warn!(host = %host, error = %e, "Failed to clear identity provider site data");
            }
        }

        self.inner.tokens.publish(SessionState::LoggedOut);
        info!("Logged out");
        cleared
    }

    /// Current session state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.tokens.state()
    }

    /// Whether an access token can currently be obtained
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Subscribe to session state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.tokens.subscribe()
    }

    /// Whether a login attempt is waiting for its callback
    #[must_use]
    pub fn has_pending_login(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    /// Current token set from memory, without refreshing
    pub async fn tokens(&self) -> Option<TokenSet> {
        self.inner.tokens.tokens().await
    }

    /// Seconds until the current access token expires
    pub async fn seconds_until_expiry(&self) -> Option<i64> {
        self.inner.tokens.seconds_until_expiry().await
    }

    /// Start refreshing in the background ahead of expiry
    ///
    /// The task ends once every clone of this manager is dropped.
    pub fn spawn_auto_refresh(&self) -> JoinHandle<()> {
        self.inner.tokens.spawn_auto_refresh()
    }

    /// Identity provider configuration
    #[must_use]
    pub fn config(&self) -> &IdentityProviderConfig {
        &self.inner.config
    }

    fn authorization_url(&self, pkce: &PkceContext) -> Url {
        let config = &self.inner.config;
        let mut url = config.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", &config.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &config.scope_string())
                .append_pair("code_challenge", &pkce.code_challenge)
                .append_pair("code_challenge_method", pkce.challenge_method())
                .append_pair("state", &pkce.state);
            if let Some(prompt) = &config.prompt {
                query.append_pair("prompt", prompt);
            }
        }
        url
    }

    fn end_session_url(&self, id_token: &str) -> Url {
        let config = &self.inner.config;
        let mut url = config.end_session_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token)
            .append_pair("post_logout_redirect_uri", &config.post_logout_redirect_uri);
        url
    }
}

impl std::fmt::Debug for AuthSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSessionManager")
            .field("client_id", &self.inner.config.client_id)
            .field("tokens", &self.inner.tokens)
            .field("pending_login", &self.has_pending_login())
            .finish_non_exhaustive()
    }
}

/// Extract the authorization code from a callback URL
fn parse_callback(callback: &Url, expected_state: &str) -> AuthResult<String> {
    let (mut code, mut state, mut error, mut description) = (None, None, None, None);
    for (key, value) in callback.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        if error == "access_denied" {
            return Err(AuthError::UserCancelled);
        }
        let message = description.map_or_else(|| error.clone(), |d| format!("{error}: {d}"));
        return Err(AuthError::CallbackError(message));
    }

    match state {
        Some(state) if validate_state(expected_state, &state) => {}
        _ => return Err(AuthError::StateMismatch),
    }

    code.filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::CallbackError("callback carries no authorization code".into()))
}
