//! Test doubles for the session manager's collaborators.
//!
//! - [`MemoryCredentialStore`]: in-memory `SecureCredentialStore` with
//!   failure injection
//! - [`ScriptedTokenExchange`]: `TokenExchange` replaying queued responses
//! - [`ScriptedBroker`]: `InteractiveAuthBroker` that approves, cancels or
//!   tampers with the authorization callback

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use url::Url;

use crate::auth::{AuthError, AuthResult, BrokerError, InteractiveAuthBroker, TokenExchange, TokenSet};
use crate::security::{KeychainError, SecureCredentialStore};

type SlotKey = (String, String);

/// In-memory credential store.
///
/// Writes can be made to fail after a number of successful writes, which is
/// how partial-persistence failures are exercised.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slots: Mutex<HashMap<SlotKey, String>>,
    writes: AtomicUsize,
    fail_writes_after: Mutex<Option<usize>>,
    fail_reads: Mutex<bool>,
    fail_deletes: Mutex<bool>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a value directly, bypassing failure injection.
    pub fn seed(&self, namespace: &str, key: &str, value: &str) {
        self.slots.lock().insert((namespace.to_string(), key.to_string()), value.to_string());
    }

    /// Read a value directly, bypassing failure injection.
    #[must_use]
    pub fn value(&self, namespace: &str, key: &str) -> Option<String> {
        self.slots.lock().get(&(namespace.to_string(), key.to_string())).cloned()
    }

    /// Number of slots currently held across all namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no slot is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Successful `save` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Let `successful` more writes through, then fail every write.
    pub fn fail_writes_after(&self, successful: usize) {
        *self.fail_writes_after.lock() = Some(self.write_count() + successful);
    }

    /// Make every `read` fail.
    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock() = fail;
    }

    /// Make every `delete` fail.
    pub fn fail_deletes(&self, fail: bool) {
        *self.fail_deletes.lock() = fail;
    }
}

#[async_trait]
impl SecureCredentialStore for MemoryCredentialStore {
    async fn save(&self, namespace: &str, key: &str, value: &str) -> Result<(), KeychainError> {
        if let Some(limit) = *self.fail_writes_after.lock() {
            if self.write_count() >= limit {
                return Err(KeychainError::AccessFailed(format!("injected write failure for {key}")));
            }
        }
        self.seed(namespace, key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, namespace: &str, key: &str) -> Result<Option<String>, KeychainError> {
        if *self.fail_reads.lock() {
            return Err(KeychainError::AccessFailed(format!("injected read failure for {key}")));
        }
        Ok(self.value(namespace, key))
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), KeychainError> {
        if *self.fail_deletes.lock() {
            return Err(KeychainError::AccessFailed(format!("injected delete failure for {key}")));
        }
        self.slots.lock().remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}

/// Token exchange replaying queued responses.
///
/// An exhausted queue answers with `TransportFailure`. An optional delay is
/// applied before every answer so concurrent callers overlap, and refreshes
/// can be held on a gate to interleave them with a login.
#[derive(Debug, Default)]
pub struct ScriptedTokenExchange {
    code_responses: Mutex<VecDeque<AuthResult<TokenSet>>>,
    refresh_responses: Mutex<VecDeque<AuthResult<TokenSet>>>,
    codes_seen: Mutex<Vec<(String, String)>>,
    refresh_tokens_seen: Mutex<Vec<String>>,
    code_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    delay: Mutex<Duration>,
    refresh_gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedTokenExchange {
    /// Create an exchange with empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer for the next code exchange.
    pub fn push_code_response(&self, response: AuthResult<TokenSet>) {
        self.code_responses.lock().push_back(response);
    }

    /// Queue the answer for the next refresh.
    pub fn push_refresh_response(&self, response: AuthResult<TokenSet>) {
        self.refresh_responses.lock().push_back(response);
    }

    /// Delay every answer by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Hold every refresh answer until `gate` is notified.
    pub fn hold_refresh(&self, gate: Arc<Notify>) {
        *self.refresh_gate.lock() = Some(gate);
    }

    /// Number of code exchanges performed.
    #[must_use]
    pub fn code_calls(&self) -> usize {
        self.code_calls.load(Ordering::SeqCst)
    }

    /// Number of refresh exchanges performed.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// `(code, code_verifier)` pairs received.
    #[must_use]
    pub fn codes_seen(&self) -> Vec<(String, String)> {
        self.codes_seen.lock().clone()
    }

    /// Refresh tokens received.
    #[must_use]
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TokenExchange for ScriptedTokenExchange {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<TokenSet> {
        self.code_calls.fetch_add(1, Ordering::SeqCst);
        self.codes_seen.lock().push((code.to_string(), code_verifier.to_string()));
        self.pause().await;
        let next = self.code_responses.lock().pop_front();
        next.unwrap_or_else(|| Err(AuthError::TransportFailure("no scripted code response".into())))
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenSet> {
        if refresh_token.is_empty() {
            return Err(AuthError::SessionExpired);
        }
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen.lock().push(refresh_token.to_string());
        let gate = self.refresh_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.pause().await;
        let next = self.refresh_responses.lock().pop_front();
        next.unwrap_or_else(|| Err(AuthError::TransportFailure("no scripted refresh response".into())))
    }
}

/// How [`ScriptedBroker`] answers `authorize`.
#[derive(Debug, Clone)]
pub enum AuthorizeBehavior {
    /// Redirect with `code` and the state from the request.
    Approve { code: String },
    /// Redirect with `code` and a forged state.
    ForgeState { code: String, state: String },
    /// Redirect with an OAuth error.
    Deny { error: String },
    /// The user dismissed the browser.
    Cancel,
    /// The browser failed to start.
    Fail(String),
}

/// Scripted browser broker.
///
/// Callback URLs are built from the `redirect_uri` query parameter of the
/// authorization URL it is given.
#[derive(Debug)]
pub struct ScriptedBroker {
    behavior: Mutex<AuthorizeBehavior>,
    end_session_failure: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
    authorize_urls: Mutex<Vec<Url>>,
    end_session_urls: Mutex<Vec<Url>>,
    cleared_hosts: Mutex<Vec<String>>,
}

impl ScriptedBroker {
    /// Create a broker with the given authorize behavior.
    #[must_use]
    pub fn new(behavior: AuthorizeBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            end_session_failure: Mutex::new(None),
            gate: Mutex::new(None),
            authorize_urls: Mutex::new(Vec::new()),
            end_session_urls: Mutex::new(Vec::new()),
            cleared_hosts: Mutex::new(Vec::new()),
        }
    }

    /// Broker approving every login with `code`.
    #[must_use]
    pub fn approving(code: &str) -> Self {
        Self::new(AuthorizeBehavior::Approve { code: code.to_string() })
    }

    /// Broker whose user dismisses every login.
    #[must_use]
    pub fn cancelling() -> Self {
        Self::new(AuthorizeBehavior::Cancel)
    }

    /// Replace the authorize behavior.
    pub fn set_behavior(&self, behavior: AuthorizeBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Make `end_session` fail with `message`.
    pub fn fail_end_session(&self, message: &str) {
        *self.end_session_failure.lock() = Some(message.to_string());
    }

    /// Hold every `authorize` until `gate` is notified.
    pub fn hold_authorize(&self, gate: Arc<Notify>) {
        *self.gate.lock() = Some(gate);
    }

    /// Authorization URLs presented so far.
    #[must_use]
    pub fn authorize_urls(&self) -> Vec<Url> {
        self.authorize_urls.lock().clone()
    }

    /// End-session URLs presented so far.
    #[must_use]
    pub fn end_session_urls(&self) -> Vec<Url> {
        self.end_session_urls.lock().clone()
    }

    /// Hosts whose site data was cleared.
    #[must_use]
    pub fn cleared_hosts(&self) -> Vec<String> {
        self.cleared_hosts.lock().clone()
    }
}

/// First value of query parameter `name` in `url`.
#[must_use]
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
}

fn callback_url(authorize_url: &Url, params: &[(&str, &str)]) -> Result<Url, BrokerError> {
    let redirect = query_param(authorize_url, "redirect_uri")
        .ok_or_else(|| BrokerError::Failed("authorization URL has no redirect_uri".into()))?;
    let mut callback =
        Url::parse(&redirect).map_err(|e| BrokerError::Failed(format!("bad redirect_uri: {e}")))?;
    callback.query_pairs_mut().extend_pairs(params);
    Ok(callback)
}

#[async_trait]
impl InteractiveAuthBroker for ScriptedBroker {
    async fn authorize(&self, url: Url, _callback_scheme: &str) -> Result<Url, BrokerError> {
        self.authorize_urls.lock().push(url.clone());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let behavior = self.behavior.lock().clone();
        match behavior {
            AuthorizeBehavior::Approve { code } => {
                let state = query_param(&url, "state").unwrap_or_default();
                callback_url(&url, &[("code", code.as_str()), ("state", state.as_str())])
            }
            AuthorizeBehavior::ForgeState { code, state } => {
                callback_url(&url, &[("code", code.as_str()), ("state", state.as_str())])
            }
            AuthorizeBehavior::Deny { error } => {
                let state = query_param(&url, "state").unwrap_or_default();
                callback_url(&url, &[("error", error.as_str()), ("state", state.as_str())])
            }
            AuthorizeBehavior::Cancel => Err(BrokerError::Cancelled),
            AuthorizeBehavior::Fail(message) => Err(BrokerError::Failed(message)),
        }
    }

    async fn end_session(&self, url: Url, _callback_scheme: &str) -> Result<(), BrokerError> {
        self.end_session_urls.lock().push(url);
        match self.end_session_failure.lock().clone() {
            Some(message) => Err(BrokerError::Failed(message)),
            None => Ok(()),
        }
    }

    async fn clear_site_data(&self, host: &str) -> Result<(), BrokerError> {
        self.cleared_hosts.lock().push(host.to_string());
        Ok(())
    }
}
