//! Configuration loading and management
//!
//! This module provides utilities for loading application configuration
//! from environment variables and files.

pub mod loader;

use receptionist_common::auth::{IdentityProviderConfig, SessionConfig};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::api::ApiClientConfig;

// Re-export commonly used items
pub use loader::{load, load_from_env, load_from_file, probe_config_paths};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    /// A value could not be parsed
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Environment variable or config key holding the value
        key: String,
        /// Why the value was rejected
        message: String,
    },

    /// The config file could not be found or read
    #[error("Config file error: {0}")]
    File(String),

    /// The config file could not be parsed
    #[error("Invalid config format: {0}")]
    Format(String),

    /// Identity provider endpoints are incomplete
    #[error("Incomplete identity provider settings: {0}")]
    Identity(String),
}

/// Result alias for configuration loading
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Complete application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Identity provider registration
    pub identity: IdentitySettings,

    /// Session manager tuning
    #[serde(default)]
    pub session: SessionConfig,

    /// Backend API
    pub api: ApiClientConfig,
}

/// Identity provider settings as written in config
///
/// Endpoints are either derived from a Keycloak base URL and realm, or given
/// explicitly. Explicit endpoints win over derived ones.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct IdentitySettings {
    /// Public OAuth client ID
    pub client_id: String,
    /// Redirect URI registered for the app
    pub redirect_uri: String,
    /// Redirect after provider-side logout; defaults to `redirect_uri`
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,
    /// Keycloak server base URL
    #[serde(default)]
    pub keycloak_url: Option<String>,
    /// Keycloak realm, required together with `keycloak_url`
    #[serde(default)]
    pub realm: Option<String>,
    /// Explicit authorization endpoint
    #[serde(default)]
    pub authorization_endpoint: Option<Url>,
    /// Explicit token endpoint
    #[serde(default)]
    pub token_endpoint: Option<Url>,
    /// Explicit end-session endpoint
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
    /// Scopes to request; defaults to `openid profile`
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    /// `prompt` parameter; Keycloak settings default to `login`
    #[serde(default)]
    pub prompt: Option<String>,
}

impl IdentitySettings {
    /// Build the provider configuration used by the session manager
    ///
    /// # Errors
    /// Returns `ConfigError::Identity` when an endpoint can neither be
    /// derived nor was given
    pub fn resolve(&self) -> Result<IdentityProviderConfig> {
        let derived = match (&self.keycloak_url, &self.realm) {
            (Some(base), Some(realm)) => Some(
                IdentityProviderConfig::keycloak(
                    base,
                    realm,
                    self.client_id.clone(),
                    self.redirect_uri.clone(),
                )
                .map_err(|e| ConfigError::Identity(format!("invalid Keycloak URL: {e}")))?,
            ),
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::Identity(
                    "keycloak_url and realm must be given together".to_string(),
                ))
            }
            (None, None) => None,
        };

        let authorization_endpoint = pick_endpoint(
            self.authorization_endpoint.as_ref(),
            derived.as_ref().map(|d| &d.authorization_endpoint),
            "authorization_endpoint",
        )?;
        let token_endpoint = pick_endpoint(
            self.token_endpoint.as_ref(),
            derived.as_ref().map(|d| &d.token_endpoint),
            "token_endpoint",
        )?;
        let end_session_endpoint = pick_endpoint(
            self.end_session_endpoint.as_ref(),
            derived.as_ref().map(|d| &d.end_session_endpoint),
            "end_session_endpoint",
        )?;

        Ok(IdentityProviderConfig {
            client_id: self.client_id.clone(),
            authorization_endpoint,
            token_endpoint,
            end_session_endpoint,
            redirect_uri: self.redirect_uri.clone(),
            post_logout_redirect_uri: self
                .post_logout_redirect_uri
                .clone()
                .unwrap_or_else(|| self.redirect_uri.clone()),
            scopes: self
                .scopes
                .clone()
                .unwrap_or_else(|| vec!["openid".to_string(), "profile".to_string()]),
            prompt: self
                .prompt
                .clone()
                .or_else(|| derived.as_ref().and_then(|d| d.prompt.clone())),
        })
    }
}

fn pick_endpoint(explicit: Option<&Url>, derived: Option<&Url>, name: &str) -> Result<Url> {
    explicit
        .or(derived)
        .cloned()
        .ok_or_else(|| ConfigError::Identity(format!("{name} is not configured")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keycloak_settings() -> IdentitySettings {
        IdentitySettings {
            client_id: "receptionist-dev-public".to_string(),
            redirect_uri: "com.diamir.receptionist:/oauth2redirect".to_string(),
            keycloak_url: Some("https://sso.diamir.dev".to_string()),
            realm: Some("nein".to_string()),
            ..IdentitySettings::default()
        }
    }

    #[test]
    fn test_resolve_keycloak() {
        let config = keycloak_settings().resolve().unwrap();

        assert_eq!(
            config.token_endpoint.as_str(),
            "https://sso.diamir.dev/realms/nein/protocol/openid-connect/token"
        );
        assert_eq!(config.post_logout_redirect_uri, config.redirect_uri);
        assert_eq!(config.prompt.as_deref(), Some("login"));
    }

    #[test]
    fn test_resolve_explicit_endpoint_overrides() {
        let mut settings = keycloak_settings();
        settings.token_endpoint = Some(Url::parse("http://127.0.0.1:8080/token").unwrap());
        settings.scopes = Some(vec!["openid".to_string()]);

        let config = settings.resolve().unwrap();
        assert_eq!(config.token_endpoint.as_str(), "http://127.0.0.1:8080/token");
        assert_eq!(config.scope_string(), "openid");
    }

    #[test]
    fn test_resolve_incomplete() {
        let mut settings = keycloak_settings();
        settings.realm = None;
        assert!(matches!(settings.resolve(), Err(ConfigError::Identity(_))));

        settings.keycloak_url = None;
        assert!(matches!(settings.resolve(), Err(ConfigError::Identity(msg)) if msg.contains("authorization_endpoint")));
    }
}
