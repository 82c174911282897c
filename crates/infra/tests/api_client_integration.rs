//! Integration tests for the authenticated API client
//!
//! One `wiremock` server plays both the identity provider's token endpoint
//! and the backend API; the session manager sits between them.

use std::sync::Arc;

use receptionist_common::auth::{AuthSessionManager, SessionState};
use receptionist_common::testing::{fixtures, MemoryCredentialStore, ScriptedBroker};
use receptionist_infra::api::{AccessTokenProvider, ApiClient, ApiClientConfig, ApiError};
use serde::Deserialize;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/realms/test/protocol/openid-connect/token";

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
}

fn session_for(server: &MockServer) -> AuthSessionManager {
    AuthSessionManager::with_oauth_client(
        fixtures::provider_config(&server.uri()),
        fixtures::session_config(),
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(ScriptedBroker::approving("code-1")),
    )
    .expect("session manager should build")
}

fn api_for(server: &MockServer, session: &AuthSessionManager) -> ApiClient {
    let base = Url::parse(&format!("{}/api/", server.uri())).expect("base url");
    ApiClient::new(ApiClientConfig::new(base), Arc::new(session.clone()))
        .expect("api client should build")
}

async fn mount_code_grant(server: &MockServer, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "id_token": "id-1",
            "expires_in": expires_in
        })))
        .mount(server)
        .await;
}

/// Validates that API calls carry the session's access token.
#[tokio::test]
async fn test_api_call_uses_session_token() {
    let server = MockServer::start().await;
    mount_code_grant(&server, 300).await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Ada"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session_for(&server);
    session.start_login().await.expect("login");

    let profile: Profile = api_for(&server, &session).get("me").await.expect("profile");
    assert_eq!(profile.name, "Ada");
}

/// Validates that an expiring token is refreshed before the API call.
///
/// # Test Steps
/// 1. Login yields a token inside the refresh margin
/// 2. The API call triggers exactly one refresh
/// 3. The API sees the refreshed token
#[tokio::test]
async fn test_api_call_refreshes_expiring_token() {
    let server = MockServer::start().await;
    mount_code_grant(&server, 5).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .and(header("authorization", "Bearer access-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Ada"})))
        .expect(2)
        .mount(&server)
        .await;

    let session = session_for(&server);
    session.start_login().await.expect("login");

    let api = api_for(&server, &session);
    api.get_json("me").await.expect("first call");
    api.get_json("me").await.expect("second call");
}

/// Validates that a revoked refresh token surfaces as `LoginRequired`.
#[tokio::test]
async fn test_revoked_session_requires_login() {
    let server = MockServer::start().await;
    mount_code_grant(&server, 5).await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Session not active"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/me"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = session_for(&server);
    session.start_login().await.expect("login");

    let err = api_for(&server, &session).get_json("me").await.unwrap_err();
    assert!(matches!(err, ApiError::LoginRequired(_)));
    assert!(!err.should_retry());
    assert_eq!(session.state(), SessionState::LoggedOut);
}

/// Validates that a token endpoint outage is retryable and keeps the session.
#[tokio::test]
async fn test_token_endpoint_outage_is_retryable() {
    let server = MockServer::start().await;
    mount_code_grant(&server, 5).await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let session = session_for(&server);
    session.start_login().await.expect("login");

    let err = session.access_token().await.unwrap_err();
    assert!(matches!(err, ApiError::Server(_)));
    assert!(err.should_retry());
    assert!(session.is_authenticated());
}

/// Validates that logged-out sessions never reach the API.
#[tokio::test]
async fn test_logged_out_session_never_calls_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = session_for(&server);
    let result = api_for(&server, &session).get_json("me").await;

    assert!(matches!(result, Err(ApiError::LoginRequired(_))));
}
