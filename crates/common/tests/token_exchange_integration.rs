//! Integration tests for the token endpoint client
//!
//! Runs `OAuthClient` against a `wiremock` token endpoint, alone and wired
//! into `AuthSessionManager`.

use std::sync::Arc;
use std::time::Duration;

use receptionist_common::auth::{AuthError, AuthSessionManager, OAuthClient, SessionState, TokenExchange};
use receptionist_common::testing::fixtures::{self, TEST_NAMESPACE};
use receptionist_common::testing::{MemoryCredentialStore, ScriptedBroker};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/realms/test/protocol/openid-connect/token";

fn client_for(server: &MockServer, timeout: Duration) -> OAuthClient {
    OAuthClient::new(fixtures::provider_config(&server.uri()), timeout).unwrap()
}

/// Validates the authorization code exchange request and response.
///
/// Assertions:
/// - Confirms the form carries grant type, client, code, redirect and
///   verifier.
/// - Confirms the returned set carries all three tokens and the lifetime.
#[tokio::test]
async fn test_exchange_code_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("client_id=receptionist-test"))
        .and(body_string_contains("code=auth-code"))
        .and(body_string_contains("code_verifier=the-verifier"))
        .and(body_string_contains("redirect_uri=com.diamir.receptionist%3A%2Foauth2redirect"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "id_token": "id-1",
            "expires_in": 300,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = client_for(&server, Duration::from_secs(5))
        .exchange_code("auth-code", "the-verifier")
        .await
        .unwrap();

    assert_eq!(tokens.access_token, "access-1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(tokens.id_token.as_deref(), Some("id-1"));
    assert!((295..=300).contains(&fixtures::seconds_left(&tokens)));
}

/// Validates the refresh grant request.
#[tokio::test]
async fn test_refresh_success_without_id_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = client_for(&server, Duration::from_secs(5)).refresh("refresh-1").await.unwrap();
    assert_eq!(tokens.access_token, "access-2");
    assert!(tokens.id_token.is_none());
}

/// Validates error mapping for rejected, malformed and slow responses.
///
/// Assertions:
/// - Ensures non-2xx yields `ExchangeRejected` with the raw body.
/// - Ensures a missing `expires_in` yields `MalformedResponse`.
/// - Ensures a wrongly typed field yields `MalformedResponse`.
/// - Ensures a response slower than the timeout yields `TransportFailure`.
#[tokio::test]
async fn test_exchange_error_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("refresh_token=revoked"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token is not active"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("refresh_token=no-expiry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "refresh_token": "r"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("refresh_token=bad-type"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": "soon"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("refresh_token=slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(json!({"access_token": "a", "refresh_token": "r", "expires_in": 60})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(500));

    let rejected = client.refresh("revoked").await.unwrap_err();
    assert!(matches!(&rejected, AuthError::ExchangeRejected { status: 400, body: Some(_) }));
    assert!(rejected.is_invalid_grant());
    assert_eq!(rejected.provider_error().unwrap().error, "invalid_grant");

    assert!(matches!(
        client.refresh("no-expiry").await,
        Err(AuthError::MalformedResponse(msg)) if msg.contains("expires_in")
    ));
    assert!(matches!(client.refresh("bad-type").await, Err(AuthError::MalformedResponse(_))));
    assert!(matches!(client.refresh("slow").await, Err(AuthError::TransportFailure(_))));
}

/// Validates a server error without body.
#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server, Duration::from_secs(5)).refresh("r").await.unwrap_err();
    assert_eq!(err, AuthError::ExchangeRejected { status: 503, body: None });
    assert!(!err.is_invalid_grant());
}

/// Validates that a malformed code exchange persists nothing.
///
/// # Test Steps
/// 1. Token endpoint answers without `expires_in`
/// 2. `start_login` fails with `MalformedResponse`
/// 3. The store is untouched and the state is `LoggedOut`
#[tokio::test]
async fn test_session_login_malformed_response_persists_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "refresh_token": "r",
            "id_token": "i"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let session = AuthSessionManager::with_oauth_client(
        fixtures::provider_config(&server.uri()),
        fixtures::session_config(),
        store.clone(),
        Arc::new(ScriptedBroker::approving("code-1")),
    )
    .unwrap();

    let result = session.start_login().await;

    assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
    assert_eq!(store.write_count(), 0);
    assert!(store.value(TEST_NAMESPACE, "accessToken").is_none());
    assert_eq!(session.state(), SessionState::LoggedOut);
}

/// Validates login then silent refresh through the real client.
#[tokio::test]
async fn test_session_login_and_refresh_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "id_token": "id-1",
            "expires_in": 5
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-2",
            "refresh_token": "refresh-2",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let session = AuthSessionManager::with_oauth_client(
        fixtures::provider_config(&server.uri()),
        fixtures::session_config(),
        store.clone(),
        Arc::new(ScriptedBroker::approving("code-1")),
    )
    .unwrap();

    session.start_login().await.unwrap();
    // Lifetime 5s is inside the 30s margin: the first use refreshes
    assert_eq!(session.with_fresh_token().await.unwrap(), "access-2");
    assert_eq!(session.with_fresh_token().await.unwrap(), "access-2");
    assert_eq!(store.value(TEST_NAMESPACE, "idToken").as_deref(), Some("id-1"));
}
