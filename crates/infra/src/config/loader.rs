//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `RECEPTIONIST_CLIENT_ID`: OAuth client ID (required)
//! - `RECEPTIONIST_REDIRECT_URI`: Registered redirect URI (required)
//! - `RECEPTIONIST_API_BASE_URL`: Backend API base URL (required)
//! - `RECEPTIONIST_KEYCLOAK_URL` / `RECEPTIONIST_REALM`: Keycloak server and
//!   realm the endpoints are derived from
//! - `RECEPTIONIST_AUTHORIZATION_ENDPOINT`, `RECEPTIONIST_TOKEN_ENDPOINT`,
//!   `RECEPTIONIST_END_SESSION_ENDPOINT`: Explicit endpoint overrides
//! - `RECEPTIONIST_POST_LOGOUT_REDIRECT_URI`: Redirect after logout
//! - `RECEPTIONIST_SCOPES`: Space-separated scopes
//! - `RECEPTIONIST_PROMPT`: `prompt` parameter for the authorization request
//! - `RECEPTIONIST_KEYCHAIN_SERVICE`: Keychain namespace
//! - `RECEPTIONIST_REFRESH_MARGIN_SECS`: Refresh margin in seconds
//!   (`0..=3600`)
//! - `RECEPTIONIST_REQUEST_TIMEOUT_SECS`: Token endpoint timeout in seconds
//! - `RECEPTIONIST_API_TIMEOUT_SECS`: Backend API timeout in seconds
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./receptionist.json` or `./receptionist.toml` (current working
//!    directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use receptionist_common::auth::SessionConfig;
use url::Url;

use super::{AppConfig, ConfigError, IdentitySettings, Result};
use crate::api::ApiClientConfig;

/// Largest accepted refresh margin, in seconds
pub const MAX_REFRESH_MARGIN_SECS: i64 = 3600;

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `ConfigError` if configuration cannot be loaded from either
/// source or the identity settings are incomplete.
pub fn load() -> Result<AppConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `ConfigError` if required variables are missing, a value does
/// not parse, or the identity endpoints cannot be resolved.
pub fn load_from_env() -> Result<AppConfig> {
    let identity = IdentitySettings {
        client_id: env_var("RECEPTIONIST_CLIENT_ID")?,
        redirect_uri: env_var("RECEPTIONIST_REDIRECT_URI")?,
        post_logout_redirect_uri: env_opt("RECEPTIONIST_POST_LOGOUT_REDIRECT_URI"),
        keycloak_url: env_opt("RECEPTIONIST_KEYCLOAK_URL"),
        realm: env_opt("RECEPTIONIST_REALM"),
        authorization_endpoint: env_parse_opt("RECEPTIONIST_AUTHORIZATION_ENDPOINT")?,
        token_endpoint: env_parse_opt("RECEPTIONIST_TOKEN_ENDPOINT")?,
        end_session_endpoint: env_parse_opt("RECEPTIONIST_END_SESSION_ENDPOINT")?,
        scopes: env_opt("RECEPTIONIST_SCOPES")
            .map(|s| s.split_whitespace().map(ToOwned::to_owned).collect()),
        prompt: env_opt("RECEPTIONIST_PROMPT"),
    };

    let defaults = SessionConfig::default();
    let session = SessionConfig {
        keychain_service: env_opt("RECEPTIONIST_KEYCHAIN_SERVICE")
            .unwrap_or(defaults.keychain_service),
        refresh_margin_secs: env_parse_opt("RECEPTIONIST_REFRESH_MARGIN_SECS")?
            .unwrap_or(defaults.refresh_margin_secs),
        request_timeout_secs: env_parse_opt("RECEPTIONIST_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(defaults.request_timeout_secs),
    };
    validate_session(&session, "RECEPTIONIST_REFRESH_MARGIN_SECS")?;

    let base_url = env_parse::<Url>("RECEPTIONIST_API_BASE_URL")?;
    let mut api = ApiClientConfig::new(base_url);
    if let Some(timeout) = env_parse_opt("RECEPTIONIST_API_TIMEOUT_SECS")? {
        api.timeout_secs = timeout;
    }

    let config = AppConfig { identity, session, api };
    config.identity.resolve()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `ConfigError` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Identity endpoints cannot be resolved
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::File(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ConfigError::File("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ConfigError::File(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    validate_session(&config.session, "session.refresh_margin_secs")?;
    config.identity.resolve()?;
    Ok(config)
}

/// Reject a refresh margin that is negative or beyond
/// [`MAX_REFRESH_MARGIN_SECS`]
///
/// A negative margin would hand out tokens past their expiry.
fn validate_session(session: &SessionConfig, margin_key: &str) -> Result<()> {
    if (0..=MAX_REFRESH_MARGIN_SECS).contains(&session.refresh_margin_secs) {
        return Ok(());
    }
    Err(ConfigError::InvalidValue {
        key: margin_key.to_string(),
        message: format!(
            "refresh margin must be between 0 and {MAX_REFRESH_MARGIN_SECS} seconds, got {}",
            session.refresh_margin_secs
        ),
    })
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ConfigError::Format(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ConfigError::Format(format!("Invalid JSON format: {e}"))),
        _ => Err(ConfigError::Format(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
#[must_use]
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_in(&cwd));
        candidates.push(cwd.join("../config.json"));
        candidates.push(cwd.join("../config.toml"));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_in(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidates_in(dir: &Path) -> [PathBuf; 4] {
    [
        dir.join("config.json"),
        dir.join("config.toml"),
        dir.join("receptionist.json"),
        dir.join("receptionist.toml"),
    ]
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

/// Get optional environment variable, treating empty as unset
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_var(key)?;
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn env_parse_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key).map_or(Ok(None), |_| env_parse(key).map(Some))
}
