//! Canned configuration and token sets for session tests.

use chrono::{Duration, Utc};

use crate::auth::{IdentityProviderConfig, SessionConfig, TokenSet};

/// Keychain namespace used by every fixture.
pub const TEST_NAMESPACE: &str = "com.diamir.receptionist.test";

/// Redirect URI used by every fixture.
pub const TEST_REDIRECT_URI: &str = "com.diamir.receptionist:/oauth2redirect";

/// Keycloak-shaped provider configuration rooted at `base`.
///
/// # Panics
/// Panics if `base` is not an absolute URL.
#[must_use]
#[allow(clippy::expect_used)]
pub fn provider_config(base: &str) -> IdentityProviderConfig {
    IdentityProviderConfig::keycloak(base, "test", "receptionist-test", TEST_REDIRECT_URI)
        .expect("fixture base URL must be absolute")
}

/// Session configuration using [`TEST_NAMESPACE`].
#[must_use]
pub fn session_config() -> SessionConfig {
    SessionConfig { keychain_service: TEST_NAMESPACE.to_string(), ..SessionConfig::default() }
}

/// Token set named after `tag`, valid for `expires_in` seconds.
///
/// Tokens are `access-{tag}`, `refresh-{tag}` and `id-{tag}`.
#[must_use]
pub fn token_set(tag: &str, expires_in: i64) -> TokenSet {
    TokenSet::new(
        format!("access-{tag}"),
        Some(format!("refresh-{tag}")),
        Some(format!("id-{tag}")),
        expires_in,
    )
}

/// Token set named after `tag` that expired a minute ago.
#[must_use]
pub fn expired_token_set(tag: &str) -> TokenSet {
    let mut tokens = token_set(tag, 0);
    tokens.expires_at = tokens.expires_at - Duration::seconds(60);
    tokens
}

/// Refresh response for `tag`: no id token, as providers usually send.
#[must_use]
pub fn refreshed_token_set(tag: &str, expires_in: i64) -> TokenSet {
    TokenSet::new(format!("access-{tag}"), Some(format!("refresh-{tag}")), None, expires_in)
}

/// Whole seconds from now until `tokens` expire.
#[must_use]
pub fn seconds_left(tokens: &TokenSet) -> i64 {
    (tokens.expires_at - Utc::now()).num_seconds()
}
