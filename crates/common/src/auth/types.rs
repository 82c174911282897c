//! OAuth 2.0 types and structures
//!
//! Token sets, token endpoint responses, session states and the identity
//! provider / session configuration consumed by the session manager.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use url::Url;

use super::error::{AuthError, AuthResult};

/// Default keychain service identifier
pub const DEFAULT_KEYCHAIN_SERVICE: &str = "com.diamir.receptionist";

/// Default safety margin before expiry, in seconds
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 30;

/// Default bound on every token endpoint exchange, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// OAuth 2.0 access and refresh tokens with metadata
///
/// `expires_at` is fixed when the set is issued (`issue time + expires_in`,
/// whole seconds) and never recomputed afterwards. A set is only ever
/// replaced as a whole.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    /// Access token presented to resource servers
    pub access_token: String,

    /// Refresh token for obtaining new access tokens
    pub refresh_token: Option<String>,

    /// ID token (OpenID Connect), needed as `id_token_hint` at logout
    pub id_token: Option<String>,

    /// Absolute expiration timestamp (UTC)
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Create a new `TokenSet` issued now
    ///
    /// # Arguments
    /// * `access_token` - The access token
    /// * `refresh_token` - Optional refresh token
    /// * `id_token` - Optional ID token (OpenID Connect)
    /// * `expires_in` - Token lifetime in seconds
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_in: i64,
    ) -> Self {
        Self::issued_at(access_token, refresh_token, id_token, expires_in, Utc::now())
    }

    /// Create a `TokenSet` issued at `issued_at`
    ///
    /// The expiry is truncated to whole seconds so that its persisted epoch
    /// form reads back to the identical value. A lifetime beyond the
    /// representable range is clamped; use [`TokenSet::try_issued_at`] for
    /// untrusted input.
    #[must_use]
    pub fn issued_at(
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_in: i64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let expires_at = expiry_from(issued_at, expires_in).unwrap_or(if expires_in < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });

        Self { access_token, refresh_token, id_token, expires_at }
    }

    /// Create a `TokenSet` issued at `issued_at`, or `None` when
    /// `issued_at + expires_in` is not a representable instant
    #[must_use]
    pub fn try_issued_at(
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
        expires_in: i64,
        issued_at: DateTime<Utc>,
    ) -> Option<Self> {
        let expires_at = expiry_from(issued_at, expires_in)?;
        Some(Self { access_token, refresh_token, id_token, expires_at })
    }

    /// Check if the access token is expired or will expire within
    /// `margin_seconds`
    ///
    /// A token is usable only while `now + margin < expires_at`. A margin
    /// too large to add to the clock counts as expired.
    #[must_use]
    pub fn is_expired(&self, margin_seconds: i64) -> bool {
        TimeDelta::try_seconds(margin_seconds)
            .and_then(|margin| Utc::now().checked_add_signed(margin))
            .map_or(true, |deadline| deadline >= self.expires_at)
    }

    /// Get seconds until token expiration (negative once expired)
    #[must_use]
    pub fn seconds_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds()
    }

    /// Keep `previous` as the id token when this set was issued without one
    ///
    /// Refresh responses usually omit `id_token`, but logout still needs it.
    #[must_use]
    pub fn with_id_token_fallback(mut self, previous: Option<String>) -> Self {
        if self.id_token.is_none() {
            self.id_token = previous;
        }
        self
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// OAuth token response from the token endpoint
///
/// Every field is optional at the serde level so that a missing field is
/// reported as `MalformedResponse` naming the field, not as a generic
/// decode failure.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// Issued access token
    pub access_token: Option<String>,
    /// Issued refresh token
    pub refresh_token: Option<String>,
    /// OpenID Connect id token; refresh responses usually omit it
    pub id_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: Option<i64>,
    /// Token type, normally `Bearer`
    pub token_type: Option<String>,
    /// Granted scopes, space separated
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Validate required fields and build a `TokenSet` issued now
    ///
    /// `access_token`, `refresh_token` and `expires_in` are always required;
    /// `id_token` only when `require_id_token` is set (code exchange).
    ///
    /// # Errors
    /// Returns `AuthError::MalformedResponse` naming the first missing field,
    /// or when `expires_in` does not yield a representable expiry
    pub fn into_token_set(self, require_id_token: bool) -> AuthResult<TokenSet> {
        let access_token = required(self.access_token, "access_token")?;
        let refresh_token = required(self.refresh_token, "refresh_token")?;
        let expires_in = self
            .expires_in
            .filter(|secs| *secs >= 0)
            .ok_or_else(|| AuthError::MalformedResponse("missing field `expires_in`".into()))?;
        let id_token = if require_id_token {
            Some(required(self.id_token, "id_token")?)
        } else {
            self.id_token.filter(|t| !t.is_empty())
        };

        TokenSet::try_issued_at(access_token, Some(refresh_token), id_token, expires_in, Utc::now())
            .ok_or_else(|| AuthError::MalformedResponse("expires_in out of range".into()))
    }
}

fn expiry_from(issued_at: DateTime<Utc>, expires_in: i64) -> Option<DateTime<Utc>> {
    let seconds = issued_at.timestamp().checked_add(expires_in)?;
    DateTime::from_timestamp(seconds, 0)
}

fn required(value: Option<String>, field: &str) -> AuthResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::MalformedResponse(format!("missing field `{field}`")))
}

/// OAuth error response from the authorization server
///
/// Standard OAuth 2.0 error response format (RFC 6749 §5.2).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderError {
    /// Error code, e.g. `invalid_grant`
    pub error: String,
    /// Human-readable detail
    pub error_description: Option<String>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Authentication session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No credentials
    LoggedOut,
    /// Interactive login in progress
    Authenticating,
    /// A current token set exists
    Authenticated,
    /// A refresh exchange is in flight
    RefreshingSilently,
    /// Tearing down local and remote session
    LoggingOut,
}

impl SessionState {
    /// Whether callers can currently obtain an access token
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated | Self::RefreshingSilently)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LoggedOut => "logged_out",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::RefreshingSilently => "refreshing_silently",
            Self::LoggingOut => "logging_out",
        };
        f.write_str(label)
    }
}

/// Identity provider endpoints and client registration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IdentityProviderConfig {
    /// Public OAuth client ID
    pub client_id: String,

    /// Authorization endpoint (GET, opened in the browser)
    pub authorization_endpoint: Url,

    /// Token endpoint (POST, form encoded)
    pub token_endpoint: Url,

    /// End-session endpoint (OpenID Connect RP-initiated logout)
    pub end_session_endpoint: Url,

    /// Redirect URI registered for the app (custom scheme)
    pub redirect_uri: String,

    /// Redirect target after provider-side logout
    pub post_logout_redirect_uri: String,

    /// OAuth scopes to request
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Optional `prompt` parameter (e.g. `login` to force credentials entry)
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string()]
}

impl IdentityProviderConfig {
    /// Derive endpoints for a Keycloak realm
    ///
    /// Produces `{base}/realms/{realm}/protocol/openid-connect/{auth,token,logout}`.
    /// The post-logout redirect defaults to the login redirect URI.
    ///
    /// # Errors
    /// Returns `url::ParseError` if an endpoint cannot be formed from `base`
    pub fn keycloak(
        base: &str,
        realm: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        let endpoint = |name: &str| {
            Url::parse(&format!(
                "{}/realms/{realm}/protocol/openid-connect/{name}",
                base.trim_end_matches('/')
            ))
        };
        let redirect_uri = redirect_uri.into();

        Ok(Self {
            client_id: client_id.into(),
            authorization_endpoint: endpoint("auth")?,
            token_endpoint: endpoint("token")?,
            end_session_endpoint: endpoint("logout")?,
            post_logout_redirect_uri: redirect_uri.clone(),
            redirect_uri,
            scopes: default_scopes(),
            prompt: Some("login".to_string()),
        })
    }

    /// Get scopes as space-separated string
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Scheme the browser session listens for to detect the callback
    ///
    /// `com.diamir.receptionist:/oauth2redirect` yields
    /// `com.diamir.receptionist`.
    #[must_use]
    pub fn callback_scheme(&self) -> &str {
        self.redirect_uri.split_once(':').map_or(self.redirect_uri.as_str(), |(scheme, _)| scheme)
    }

    /// Host of the identity provider, used to scope site-data cleanup
    #[must_use]
    pub fn provider_host(&self) -> Option<String> {
        self.authorization_endpoint.host_str().map(ToOwned::to_owned)
    }
}

/// Session manager tuning
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Keychain namespace holding the four credential slots
    pub keychain_service: String,

    /// Never hand out an access token this close to its expiry
    pub refresh_margin_secs: i64,

    /// Bound on every token endpoint exchange
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SessionConfig {
    /// Request timeout as a `std::time::Duration`
    #[must_use]
    pub const fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::types.
    use super::*;

    /// Validates `TokenSet::issued_at` behavior for the expiry computation
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `expires_at` equals issue time plus lifetime.
    /// - Confirms sub-second precision is dropped.
    #[test]
    fn test_expiry_is_issue_time_plus_lifetime() {
        let issued = DateTime::from_timestamp(1_700_000_000, 750_000_000).unwrap();
        let tokens = TokenSet::issued_at("a".into(), Some("r".into()), None, 300, issued);

        assert_eq!(tokens.expires_at.timestamp(), 1_700_000_300);
        assert_eq!(tokens.expires_at.timestamp_subsec_nanos(), 0);
    }

    /// Validates `TokenSet::is_expired` behavior around the safety margin.
    ///
    /// Assertions:
    /// - Ensures a token 40s from expiry is usable with a 30s margin.
    /// - Ensures a token 10s from expiry is not usable with a 30s margin.
    #[test]
    fn test_token_expiry_margin() {
        let mut tokens = TokenSet::new("a".into(), Some("r".into()), None, 0);

        tokens.expires_at = Utc::now() + TimeDelta::seconds(40);
        assert!(!tokens.is_expired(30));

        tokens.expires_at = Utc::now() + TimeDelta::seconds(10);
        assert!(tokens.is_expired(30));
    }

    /// Validates `TokenResponse::into_token_set` for a complete code
    /// exchange response.
    ///
    /// Assertions:
    /// - Confirms all tokens are carried over.
    /// - Ensures `seconds_until_expiry` is close to `expires_in`.
    #[test]
    fn test_token_response_conversion() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"access123","refresh_token":"refresh456","id_token":"id789",
                "expires_in":300,"token_type":"Bearer"}"#,
        )
        .unwrap();

        let tokens = response.into_token_set(true).unwrap();
        assert_eq!(tokens.access_token, "access123");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh456"));
        assert_eq!(tokens.id_token.as_deref(), Some("id789"));
        assert!((295..=300).contains(&tokens.seconds_until_expiry()));
    }

    /// Validates `TokenResponse::into_token_set` for missing required fields.
    ///
    /// Assertions:
    /// - Ensures a missing `expires_in` yields `MalformedResponse`.
    /// - Ensures a missing `id_token` is only an error when required.
    #[test]
    fn test_token_response_missing_fields() {
        let no_expiry: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r","id_token":"i"}"#)
                .unwrap();
        assert!(matches!(
            no_expiry.into_token_set(true),
            Err(AuthError::MalformedResponse(msg)) if msg.contains("expires_in")
        ));

        let json = r#"{"access_token":"a","refresh_token":"r","expires_in":60}"#;
        let no_id: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(no_id.into_token_set(true), Err(AuthError::MalformedResponse(_))));

        let no_id: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(no_id.into_token_set(false).unwrap().id_token.is_none());
    }

    /// Validates `TokenResponse::into_token_set` for a lifetime that cannot
    /// be added to the clock.
    ///
    /// Assertions:
    /// - Ensures `i64::MAX` yields `MalformedResponse` instead of a panic.
    /// - Ensures a lifetime past chrono's range is rejected the same way.
    #[test]
    fn test_token_response_expiry_out_of_range() {
        for expires_in in [i64::MAX, i64::MAX / 2] {
            let json = format!(
                r#"{{"access_token":"a","refresh_token":"r","id_token":"i","expires_in":{expires_in}}}"#
            );
            let response: TokenResponse = serde_json::from_str(&json).unwrap();
            assert!(matches!(
                response.into_token_set(true),
                Err(AuthError::MalformedResponse(msg)) if msg == "expires_in out of range"
            ));
        }
    }

    /// Validates `TokenSet::is_expired` with margins outside the clock range.
    ///
    /// Assertions:
    /// - Ensures an oversized margin reports expired without panicking.
    /// - Ensures an oversized negative margin does not panic either.
    #[test]
    fn test_expiry_margin_out_of_range() {
        let tokens = TokenSet::new("a".into(), Some("r".into()), None, 3600);

        assert!(tokens.is_expired(i64::MAX));
        assert!(tokens.is_expired(i64::MIN));
        assert!(!tokens.is_expired(0));
    }

    /// Validates that the infallible constructor clamps instead of panicking.
    #[test]
    fn test_issued_at_clamps_huge_lifetime() {
        let tokens = TokenSet::new("a".into(), Some("r".into()), None, i64::MAX);
        assert_eq!(tokens.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!tokens.is_expired(30));
    }

    /// Validates the id token carry-over on refresh.
    ///
    /// Assertions:
    /// - Confirms the previous id token is kept when the new set has none.
    /// - Confirms a newly issued id token wins.
    #[test]
    fn test_id_token_fallback() {
        let refreshed = TokenSet::new("a".into(), Some("r".into()), None, 60)
            .with_id_token_fallback(Some("old-id".into()));
        assert_eq!(refreshed.id_token.as_deref(), Some("old-id"));

        let reissued = TokenSet::new("a".into(), Some("r".into()), Some("new-id".into()), 60)
            .with_id_token_fallback(Some("old-id".into()));
        assert_eq!(reissued.id_token.as_deref(), Some("new-id"));
    }

    /// Validates that `Debug` output never contains token material.
    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = TokenSet::new("secret-access".into(), Some("secret-refresh".into()), None, 60);
        let rendered = format!("{tokens:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }

    /// Validates `IdentityProviderConfig::keycloak` endpoint derivation.
    ///
    /// Assertions:
    /// - Confirms the three OpenID Connect endpoints.
    /// - Confirms the callback scheme and provider host.
    #[test]
    fn test_keycloak_endpoints() {
        let config = IdentityProviderConfig::keycloak(
            "https://sso.diamir.dev/",
            "nein",
            "receptionist-dev-public",
            "com.diamir.receptionist:/oauth2redirect",
        )
        .unwrap();

        assert_eq!(
            config.authorization_endpoint.as_str(),
            "https://sso.diamir.dev/realms/nein/protocol/openid-connect/auth"
        );
        assert_eq!(
            config.token_endpoint.as_str(),
            "https://sso.diamir.dev/realms/nein/protocol/openid-connect/token"
        );
        assert_eq!(
            config.end_session_endpoint.as_str(),
            "https://sso.diamir.dev/realms/nein/protocol/openid-connect/logout"
        );
        assert_eq!(config.callback_scheme(), "com.diamir.receptionist");
        assert_eq!(config.provider_host().as_deref(), Some("sso.diamir.dev"));
        assert_eq!(config.scope_string(), "openid profile");
    }

    /// Validates the provider error display scenario.
    #[test]
    fn test_provider_error_display() {
        let error = ProviderError {
            error: "invalid_grant".to_string(),
            error_description: Some("Token is not active".to_string()),
        };
        assert_eq!(error.to_string(), "invalid_grant: Token is not active");
    }
}
