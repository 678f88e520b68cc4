#![allow(clippy::unwrap_used)]
// Integration tests for `SystemairClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use airly_api::{Credentials, Error, ModeTimer, Parameter, SystemairClient, VentilationApi};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, SystemairClient) {
    let server = MockServer::start().await;
    let base = Url::parse(&server.uri()).unwrap();
    let client = SystemairClient::with_client(
        reqwest::Client::new(),
        base.join("/gateway/api").unwrap(),
        base.join("/token").unwrap(),
        Credentials {
            username: "user@example.com".into(),
            password: SecretString::from("pw".to_string()),
        },
    );
    (server, client)
}

async fn mount_token(server: &MockServer, access: &str) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access,
            "refresh_token": "refresh-1",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

async fn authenticated() -> (MockServer, SystemairClient) {
    let (server, client) = setup().await;
    mount_token(&server, "tok-1").await;
    client.authenticate().await.unwrap();
    (server, client)
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_authenticate_success() {
    let (server, client) = setup().await;
    mount_token(&server, "tok-1").await;

    let token = client.authenticate().await.unwrap();
    assert_eq!(token.expose(), "tok-1");
    assert!(client.is_token_valid());
}

#[tokio::test]
async fn test_authenticate_failure() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let result = client.authenticate().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
    assert!(result.unwrap_err().is_auth_failure());
    assert!(!client.is_token_valid());
}

#[tokio::test]
async fn test_refresh_uses_refresh_grant() {
    let (server, client) = authenticated().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-2",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let token = client.refresh_token().await.unwrap();
    assert_eq!(token.expose(), "tok-2");
}

#[tokio::test]
async fn test_request_without_token_is_auth_failure() {
    let (_server, client) = setup().await;
    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(err, Error::NotAuthenticated));
    assert!(err.is_auth_failure());
}

// ── Discovery / status ──────────────────────────────────────────────

#[tokio::test]
async fn test_list_devices_returns_raw_body() {
    let (server, client) = authenticated().await;

    let body = json!({
        "data": { "GetAccountDevices": [{ "identifier": "dev1", "name": "Hall" }] }
    });

    Mock::given(method("POST"))
        .and(path("/gateway/api"))
        .and(header("x-access-token", "tok-1"))
        .and(body_string_contains("GetAccountDevices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let raw = client.list_devices().await.unwrap();
    assert_eq!(raw, body);
}

#[tokio::test]
async fn test_fetch_status_unwraps_data() {
    let (server, client) = authenticated().await;

    Mock::given(method("POST"))
        .and(path("/gateway/api"))
        .and(body_string_contains("GetDeviceStatus"))
        .and(body_string_contains("dev1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "GetDeviceStatus": { "airflow": 3, "userMode": 1 } }
        })))
        .mount(&server)
        .await;

    let status = client.fetch_status("dev1").await.unwrap();
    assert_eq!(status["airflow"], 3);
}

#[tokio::test]
async fn test_graphql_errors_surface_as_api_error() {
    let (server, client) = authenticated().await;

    Mock::given(method("POST"))
        .and(path("/gateway/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "message": "Device not reachable" }],
            "data": null
        })))
        .mount(&server)
        .await;

    let err = client.fetch_status("dev1").await.unwrap_err();
    assert!(matches!(err, Error::Api { ref message } if message == "Device not reachable"));
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn test_http_401_is_auth_failure() {
    let (server, client) = authenticated().await;

    Mock::given(method("POST"))
        .and(path("/gateway/api"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .mount(&server)
        .await;

    let err = client.fetch_status("dev1").await.unwrap_err();
    assert!(err.is_auth_failure());
    assert!(err.is_auth_expired());
}

#[tokio::test]
async fn test_http_503_is_transient() {
    let (server, client) = authenticated().await;

    Mock::given(method("POST"))
        .and(path("/gateway/api"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = client.fetch_status("dev1").await.unwrap_err();
    assert!(err.is_transient());
    assert!(!err.is_auth_failure());
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_command_writes_register() {
    let (server, client) = authenticated().await;

    Mock::given(method("POST"))
        .and(path("/gateway/api"))
        .and(body_string_contains("WriteDataItems"))
        .and(body_string_contains("\"id\":251"))
        .and(body_string_contains("\"value\":2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "WriteDataItems": true }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ok = client
        .send_command("dev1", Parameter::ModeTime(ModeTimer::Holiday), 2)
        .await
        .unwrap();
    assert!(ok);
}

#[tokio::test]
async fn test_send_command_rejected() {
    let (server, client) = authenticated().await;

    Mock::given(method("POST"))
        .and(path("/gateway/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "WriteDataItems": false }
        })))
        .mount(&server)
        .await;

    let ok = client
        .send_command("dev1", Parameter::UserMode, 1)
        .await
        .unwrap();
    assert!(!ok);
}
