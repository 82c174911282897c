//! Token manager with single-flight refresh
//!
//! Manages the token set lifecycle:
//! - persistence in four credential store slots
//! - an in-memory copy swapped as a whole
//! - at most one refresh exchange in flight, shared by every waiter
//! - the session state signal
//! - background refresh ahead of expiry

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::DateTime;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{watch, RwLock, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::{AuthError, AuthResult};
use super::traits::TokenExchange;
use super::types::{SessionState, TokenSet};
use crate::security::SecureCredentialStore;

/// Slot holding the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Slot holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Slot holding the expiry as epoch seconds
pub const EXPIRATION_DATE_KEY: &str = "expirationDate";
/// Slot holding the id token
pub const ID_TOKEN_KEY: &str = "idToken";

const SLOT_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRATION_DATE_KEY, ID_TOKEN_KEY];

/// Pause before the background task retries after a transient failure
const AUTO_REFRESH_RETRY: Duration = Duration::from_secs(60);

type RefreshFuture = Shared<BoxFuture<'static, AuthResult<String>>>;

/// Outcome of a write guarded by the set a refresh started from
enum Guarded {
    Applied,
    /// The set changed meanwhile; carries the current one, if any
    Superseded(Option<TokenSet>),
}

/// Token manager
///
/// The credential store is the source of truth; the in-memory copy is a
/// cache filled lazily and replaced only after every slot was written.
///
/// The session epoch is bumped by logout. Refresh and login results are
/// committed only if the epoch they started under is still current. A
/// refresh additionally applies its outcome only while the set it started
/// from is still the current one, so a login that commits meanwhile wins.
pub struct TokenManager {
    store: Arc<dyn SecureCredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    namespace: String,
    refresh_margin_seconds: i64,
    current_tokens: RwLock<Option<TokenSet>>,
    in_flight: Mutex<Option<(u64, RefreshFuture)>>,
    next_refresh_id: AtomicU64,
    epoch: AtomicU64,
    status: watch::Sender<SessionState>,
}

impl TokenManager {
    /// Create a new token manager
    ///
    /// # Arguments
    /// * `store` - Credential store holding the four slots
    /// * `exchange` - Token endpoint client used for refresh
    /// * `namespace` - Store namespace (keychain service)
    /// * `refresh_margin_seconds` - Never hand out a token closer than this
    ///   to expiry
    #[must_use]
    pub fn new(
        store: Arc<dyn SecureCredentialStore>,
        exchange: Arc<dyn TokenExchange>,
        namespace: impl Into<String>,
        refresh_margin_seconds: i64,
    ) -> Self {
        let (status, _) = watch::channel(SessionState::LoggedOut);

        Self {
            store,
            exchange,
            namespace: namespace.into(),
            refresh_margin_seconds,
            current_tokens: RwLock::new(None),
            in_flight: Mutex::new(None),
            next_refresh_id: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            status,
        }
    }

    /// Load the persisted token set, if any
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store cannot be read
    pub async fn initialize(&self) -> AuthResult<bool> {
        let epoch = self.epoch();
        let loaded = self.read_slots().await?;

        let mut current = self.current_tokens.write().await;
        if self.epoch() != epoch {
            return Ok(false);
        }
        let found = loaded.is_some();
        *current = loaded;
        drop(current);

        if found {
            info!("Token manager initialized with existing tokens");
            self.publish_if(&[SessionState::LoggedOut], SessionState::Authenticated);
        } else {
            debug!("No existing tokens found in credential store");
            self.publish_if(&[SessionState::Authenticated], SessionState::LoggedOut);
        }

        Ok(found)
    }

    /// Current token set, reading the store on a cache miss
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the store cannot be read
    pub async fn load_tokens(&self) -> AuthResult<Option<TokenSet>> {
        if let Some(tokens) = self.current_tokens.read().await.clone() {
            return Ok(Some(tokens));
        }

        let epoch = self.epoch();
        let Some(loaded) = self.read_slots().await? else {
            return Ok(None);
        };

        let mut current = self.current_tokens.write().await;
        if self.epoch() != epoch {
            return Ok(None);
        }
        let tokens = current.get_or_insert(loaded).clone();
        drop(current);

        self.publish_if(&[SessionState::LoggedOut], SessionState::Authenticated);
        Ok(Some(tokens))
    }

    /// Current token set from memory only
    pub async fn tokens(&self) -> Option<TokenSet> {
        self.current_tokens.read().await.clone()
    }

    /// Get an access token valid beyond the refresh margin
    ///
    /// Refreshes when needed. Concurrent callers share one refresh exchange
    /// and all receive its outcome.
    ///
    /// # Errors
    /// - `NotAuthenticated` when no token set exists
    /// - `SessionExpired` when the refresh token is gone or rejected
    /// - the exchange error for transient failures (session kept)
    pub async fn access_token(self: &Arc<Self>) -> AuthResult<String> {
        let tokens = self.load_tokens().await?.ok_or(AuthError::NotAuthenticated)?;

        if !tokens.is_expired(self.refresh_margin_seconds) {
            return Ok(tokens.access_token);
        }

        debug!(seconds_left = tokens.seconds_until_expiry(), "Access token near expiry");
        self.join_refresh().await
    }

    fn join_refresh(self: &Arc<Self>) -> RefreshFuture {
        let mut slot = self.in_flight.lock();
        if let Some((_, pending)) = slot.as_ref() {
            if pending.peek().is_none() {
                debug!("Joining in-flight token refresh");
                return pending.clone();
            }
        }

        let id = self.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let manager = Arc::clone(self);
        let refresh = async move { manager.run_refresh(id).await }.boxed().shared();
        *slot = Some((id, refresh.clone()));
        refresh
    }

    async fn run_refresh(&self, id: u64) -> AuthResult<String> {
        let outcome = self.refresh_tokens().await;

        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|(current, _)| *current == id) {
            *slot = None;
        }

        outcome
    }

    async fn refresh_tokens(&self) -> AuthResult<String> {
        let epoch = self.epoch();
        let tokens = self.load_tokens().await?.ok_or(AuthError::NotAuthenticated)?;

        // Another refresh may have landed while this one was queued
        if !tokens.is_expired(self.refresh_margin_seconds) {
            return Ok(tokens.access_token);
        }

        let Some(refresh_token) = tokens.refresh_token.clone().filter(|t| !t.is_empty()) else {
            warn!("No refresh token available, ending session");
            return match self.expire_session(epoch, &tokens).await {
                Guarded::Applied => Err(AuthError::SessionExpired),
                Guarded::Superseded(current) => self.superseded(current),
            };
        };

        self.publish_if(&[SessionState::Authenticated], SessionState::RefreshingSilently);

        match self.exchange.refresh(&refresh_token).await {
            Ok(refreshed) => {
                let refreshed = refreshed.with_id_token_fallback(tokens.id_token.clone());
                let access_token = refreshed.access_token.clone();

                match self.commit_refreshed(refreshed, epoch, &tokens).await? {
                    Guarded::Applied => {
                        info!("Successfully refreshed access token");
                        self.publish_if(&[SessionState::RefreshingSilently], SessionState::Authenticated);
                        Ok(access_token)
                    }
                    Guarded::Superseded(current) => {
                        debug!("Session replaced during refresh, discarding refreshed tokens");
                        self.superseded(current)
                    }
                }
            }
            Err(e) if e.is_invalid_grant() || matches!(e, AuthError::SessionExpired) => {
                warn!(error = %e, "Refresh token rejected, ending session");
                match self.expire_session(epoch, &tokens).await {
                    Guarded::Applied => Err(AuthError::SessionExpired),
                    Guarded::Superseded(current) => {
                        debug!("Session replaced during refresh, keeping the new session");
                        self.superseded(current)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, keeping session");
                self.publish_if(&[SessionState::RefreshingSilently], SessionState::Authenticated);
                Err(e)
            }
        }
    }

    /// Answer a refresh whose starting set is no longer current
    fn superseded(&self, current: Option<TokenSet>) -> AuthResult<String> {
        match current {
            Some(tokens) if !tokens.is_expired(self.refresh_margin_seconds) => {
                self.publish_if(&[SessionState::RefreshingSilently], SessionState::Authenticated);
                Ok(tokens.access_token)
            }
            _ => Err(AuthError::NotAuthenticated),
        }
    }

    /// Persist `tokens` and make them current if `epoch` is still current
    ///
    /// Returns `Ok(false)` without writing when the session was ended since
    /// `epoch` was taken. A failed write wipes every slot so that no partial
    /// set survives.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if a slot cannot be written
    pub(crate) async fn commit(&self, tokens: TokenSet, epoch: u64) -> AuthResult<bool> {
        let current = self.current_tokens.write().await;
        if self.epoch() != epoch {
            return Ok(false);
        }

        self.persist(current, tokens).await?;
        Ok(true)
    }

    /// Commit a refresh result only while `started_from` is still the
    /// current set
    async fn commit_refreshed(
        &self,
        refreshed: TokenSet,
        epoch: u64,
        started_from: &TokenSet,
    ) -> AuthResult<Guarded> {
        let current = self.current_tokens.write().await;
        if self.epoch() != epoch {
            return Ok(Guarded::Superseded(None));
        }
        if current.as_ref() != Some(started_from) {
            return Ok(Guarded::Superseded(current.clone()));
        }

        self.persist(current, refreshed).await?;
        Ok(Guarded::Applied)
    }

    async fn persist(
        &self,
        mut current: RwLockWriteGuard<'_, Option<TokenSet>>,
        tokens: TokenSet,
    ) -> AuthResult<()> {
        if let Err(e) = self.write_slots(&tokens).await {
            error!(error = %e, "Failed to persist tokens, wiping credential slots");
            if let Err(wipe) = self.wipe_slots().await {
                error!(error = %wipe, "Failed to wipe credential slots");
            }
            *current = None;
            drop(current);
            self.publish_if(
                &[SessionState::Authenticated, SessionState::RefreshingSilently],
                SessionState::LoggedOut,
            );
            return Err(e);
        }

        *current = Some(tokens);
        Ok(())
    }

    /// Wipe the session that `started_from` belongs to
    ///
    /// Leaves a newer set (a login that committed meanwhile) untouched.
    async fn expire_session(&self, epoch: u64, started_from: &TokenSet) -> Guarded {
        let mut current = self.current_tokens.write().await;
        if self.epoch() != epoch {
            return Guarded::Superseded(None);
        }
        if current.as_ref() != Some(started_from) {
            return Guarded::Superseded(current.clone());
        }

        if let Err(e) = self.wipe_slots().await {
            error!(error = %e, "Failed to wipe expired credentials");
        }
        *current = None;
        drop(current);

        self.publish_if(
            &[SessionState::Authenticated, SessionState::RefreshingSilently],
            SessionState::LoggedOut,
        );
        Guarded::Applied
    }

    /// Delete every slot and drop the in-memory set
    ///
    /// Bumps the session epoch first, so in-flight refreshes and logins
    /// cannot write afterwards. Every slot deletion is attempted.
    ///
    /// # Errors
    /// Returns the first slot deletion error
    pub async fn clear(&self) -> AuthResult<()> {
        self.invalidate();

        let mut current = self.current_tokens.write().await;
        let result = self.wipe_slots().await;
        *current = None;
        drop(current);

        info!("Tokens cleared");
        result
    }

    /// End the current session epoch
    pub fn invalidate(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current session epoch
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Id token from memory, else straight from its slot
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the slot cannot be read
    pub async fn id_token(&self) -> AuthResult<Option<String>> {
        if let Some(id_token) =
            self.current_tokens.read().await.as_ref().and_then(|t| t.id_token.clone())
        {
            return Ok(Some(id_token));
        }
        Ok(self.store.read(&self.namespace, ID_TOKEN_KEY).await?)
    }

    /// Seconds until the in-memory access token expires
    pub async fn seconds_until_expiry(&self) -> Option<i64> {
        self.current_tokens.read().await.as_ref().map(TokenSet::seconds_until_expiry)
    }

    /// Get the refresh margin in seconds
    #[must_use]
    pub const fn refresh_margin(&self) -> i64 {
        self.refresh_margin_seconds
    }

    /// Current session state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.status.borrow()
    }

    /// Subscribe to session state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.status.subscribe()
    }

    pub(crate) fn publish(&self, state: SessionState) {
        let previous = self.status.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Session state changed");
        }
    }

    pub(crate) fn publish_if(&self, from: &[SessionState], to: SessionState) {
        self.status.send_if_modified(|state| {
            if *state != to && from.contains(state) {
                debug!(from = %state, to = %to, "Session state changed");
                *state = to;
                true
            } else {
                false
            }
        });
    }

    /// Settle the state after a login attempt ended without tokens
    pub(crate) async fn settle_after_login(&self) {
        let has_tokens = self.current_tokens.read().await.is_some();
        let settled =
            if has_tokens { SessionState::Authenticated } else { SessionState::LoggedOut };
        self.publish_if(&[SessionState::Authenticating], settled);
    }

    /// Spawn the background refresh task
    ///
    /// The task sleeps until the token is within the refresh margin, then
    /// refreshes through the same single-flight path as callers. It idles
    /// while logged out and exits once the manager is dropped.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let status = self.subscribe();
        tokio::spawn(auto_refresh_loop(weak, status))
    }

    async fn next_refresh_delay(&self) -> Option<Duration> {
        let seconds_left = self.seconds_until_expiry().await?;
        let seconds_until_refresh = seconds_left.saturating_sub(self.refresh_margin_seconds).max(0);
        Some(Duration::from_secs(seconds_until_refresh.unsigned_abs()))
    }

    async fn read_slots(&self) -> AuthResult<Option<TokenSet>> {
        let ns = self.namespace.as_str();

        let Some(access_token) = self.store.read(ns, ACCESS_TOKEN_KEY).await?.filter(|t| !t.is_empty())
        else {
            return Ok(None);
        };
        let Some(expiry) = self.store.read(ns, EXPIRATION_DATE_KEY).await? else {
            return Ok(None);
        };
        let Some(expires_at) = parse_expiry(&expiry) else {
            warn!("Stored expiration date is unreadable, treating session as absent");
            return Ok(None);
        };

        let refresh_token = self.store.read(ns, REFRESH_TOKEN_KEY).await?;
        let id_token = self.store.read(ns, ID_TOKEN_KEY).await?;

        Ok(Some(TokenSet { access_token, refresh_token, id_token, expires_at }))
    }

    async fn write_slots(&self, tokens: &TokenSet) -> AuthResult<()> {
        let ns = self.namespace.as_str();

        self.store.save(ns, ACCESS_TOKEN_KEY, &tokens.access_token).await?;
        match &tokens.refresh_token {
            Some(refresh_token) => self.store.save(ns, REFRESH_TOKEN_KEY, refresh_token).await?,
            None => self.store.delete(ns, REFRESH_TOKEN_KEY).await?,
        }
        self.store
            .save(ns, EXPIRATION_DATE_KEY, &tokens.expires_at.timestamp().to_string())
            .await?;
        match &tokens.id_token {
            Some(id_token) => self.store.save(ns, ID_TOKEN_KEY, id_token).await?,
            None => self.store.delete(ns, ID_TOKEN_KEY).await?,
        }

        Ok(())
    }

    async fn wipe_slots(&self) -> AuthResult<()> {
        let mut first_error = None;

        for key in SLOT_KEYS {
            if let Err(e) = self.store.delete(&self.namespace, key).await {
                warn!(key, error = %e, "Failed to delete credential slot");
                first_error.get_or_insert(AuthError::from(e));
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("namespace", &self.namespace)
            .field("refresh_margin_seconds", &self.refresh_margin_seconds)
            .field("state", &self.state())
            .field("epoch", &self.epoch())
            .finish_non_exhaustive()
    }
}

/// Epoch seconds, integral or fractional
fn parse_expiry(raw: &str) -> Option<DateTime<chrono::Utc>> {
    let raw = raw.trim();
    let seconds = raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|s| s.is_finite())
            .map(|s| format!("{:.0}", s.floor()))
            .and_then(|s| s.parse::<i64>().ok())
    })?;
    DateTime::from_timestamp(seconds, 0)
}

async fn auto_refresh_loop(manager: Weak<TokenManager>, mut status: watch::Receiver<SessionState>) {
    info!("Starting token auto-refresh background task");

    loop {
        let delay = {
            let Some(manager) = manager.upgrade() else { break };
            manager.next_refresh_delay().await
        };

        let Some(delay) = delay else {
            // Logged out: wait for the next state change
            if status.changed().await.is_err() {
                break;
            }
            continue;
        };

        if !delay.is_zero() {
            debug!(seconds = delay.as_secs(), "Auto-refresh sleeping until next refresh");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        let Some(manager) = manager.upgrade() else { break };
        match manager.access_token().await {
            Ok(_) => {}
            Err(e) if e.requires_login() => {
                info!(error = %e, "Auto-refresh stopped until next login");
            }
            Err(e) => {
                error!(error = %e, "Auto-refresh failed");
                drop(manager);
                tokio::time::sleep(AUTO_REFRESH_RETRY).await;
            }
        }
    }

    debug!("Token auto-refresh task exiting");
}
