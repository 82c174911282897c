//! Authenticated backend API client
//!
//! Every request carries a bearer token obtained from an
//! [`AccessTokenProvider`] right before sending, so an expiring session is
//! refreshed transparently.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use super::auth::AccessTokenProvider;
use super::errors::ApiError;

const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

fn default_timeout_secs() -> u64 {
    DEFAULT_API_TIMEOUT_SECS
}

/// Configuration for API client
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ApiClientConfig {
    /// Base URL for API (e.g., `https://api.diamir.dev/v1/`)
    pub base_url: Url,
    /// Timeout for API requests in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiClientConfig {
    /// Configuration with the default timeout
    #[must_use]
    pub const fn new(base_url: Url) -> Self {
        Self { base_url, timeout_secs: DEFAULT_API_TIMEOUT_SECS }
    }

    /// Request timeout as a `Duration`
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// API client with bearer authentication
pub struct ApiClient {
    http: reqwest::Client,
    auth: Arc<dyn AccessTokenProvider>,
    config: ApiClientConfig,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` if the HTTP client cannot be built
    pub fn new(
        config: ApiClientConfig,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http, auth, config })
    }

    /// Create a builder for fluent configuration
    #[must_use]
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Client configuration
    #[must_use]
    pub const fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// Execute a GET request against a path below the base URL
    ///
    /// # Errors
    ///
    /// Returns error if no token is available, the request fails, or the
    /// response cannot be deserialized
    #[instrument(skip(self), fields(path = %path))]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        self.get_url(url).await
    }

    /// Execute a GET request and return the raw JSON body
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`]
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, ApiError> {
        self.get(path).await
    }

    /// Execute a GET request against an absolute URL
    ///
    /// # Errors
    ///
    /// See [`ApiClient::get`]
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_url<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let token = self.auth.access_token().await?;

        debug!("GET request");

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status_error(status, &url, &body));
        }

        let result: T = if status == StatusCode::NO_CONTENT {
            serde_json::from_value(serde_json::Value::Null).map_err(|_| {
                ApiError::Client(
                    "No content response, but response type cannot be deserialized from empty body"
                        .to_string(),
                )
            })?
        } else {
            response
                .json()
                .await
                .map_err(|e| ApiError::Client(format!("Failed to parse response: {e}")))?
        };

        info!(status = status.as_u16(), "GET request successful");
        Ok(result)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.config
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Config(format!("Invalid API path {path}: {e}")))
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.config.timeout())
        } else {
            ApiError::Network(err.to_string())
        }
    }

    fn map_status_error(status: StatusCode, url: &Url, body: &str) -> ApiError {
        let message = if body.is_empty() {
            format!("{url} returned status {status}")
        } else {
            format!("{url} returned status {status}: {body}")
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ApiError::Auth(message)
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            ApiError::RateLimit(message)
        } else if status.is_server_error() {
            ApiError::Server(message)
        } else if status.is_client_error() {
            ApiError::Client(message)
        } else {
            ApiError::Network(message)
        }
    }
}

/// Builder for API client
#[derive(Default)]
pub struct ApiClientBuilder {
    config: Option<ApiClientConfig>,
    auth: Option<Arc<dyn AccessTokenProvider>>,
}

impl ApiClientBuilder {
    /// Set the API configuration
    #[must_use]
    pub fn config(mut self, config: ApiClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the authentication provider
    #[must_use]
    pub fn auth(mut self, auth: Arc<dyn AccessTokenProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Build the API client
    ///
    /// # Errors
    ///
    /// Returns error if required fields are missing or client creation fails
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config =
            self.config.ok_or_else(|| ApiError::Config("API config not set".to_string()))?;
        let auth =
            self.auth.ok_or_else(|| ApiError::Config("Auth provider not set".to_string()))?;

        ApiClient::new(config, auth)
    }
}
