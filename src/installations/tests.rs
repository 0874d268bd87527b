use super::*;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;
use std::sync::Arc;

fn create_installations(server: &MockServer) -> FirebaseInstallations {
    let client = ClientBuilder::new(Client::new()).build();
    FirebaseInstallations::new(client, &server.url("/installations/v1"), "demo", "1:1:android:abc")
}

fn mock_register(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/installations/v1/projects/demo/installations");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "projects/1/installations/fid-from-server",
                "fid": "fid-from-server",
                "refreshToken": "refresh-1",
                "authToken": { "token": "fis-token-1", "expiresIn": "604800s" }
            }));
    })
}

#[test]
fn test_generated_fid_shape() {
    let fid = generate_fid();
    assert_eq!(fid.len(), 22);
    // The 0111 prefix always encodes to one of these characters.
    assert!(matches!(fid.chars().next(), Some('c' | 'd' | 'e' | 'f')));
    assert_ne!(fid, generate_fid());
}

#[test]
fn test_parse_duration() {
    assert_eq!(parse_duration_secs("604800s"), 604800);
    assert_eq!(parse_duration_secs("1.5s"), 1);
    assert_eq!(parse_duration_secs("bogus"), 0);
}

#[tokio::test]
async fn test_id_registers_once() {
    let server = MockServer::start();
    let installations = create_installations(&server);
    let mock = mock_register(&server);

    assert_eq!(installations.id().await.unwrap(), "fid-from-server");
    assert_eq!(installations.id().await.unwrap(), "fid-from-server");

    mock.assert();
}

#[tokio::test]
async fn test_token_reuses_registration_token() {
    let server = MockServer::start();
    let installations = create_installations(&server);
    let _register = mock_register(&server);

    let token = installations.token(false).await.unwrap();
    assert_eq!(token.token, "fis-token-1");
}

#[tokio::test]
async fn test_forced_token_is_generated() {
    let server = MockServer::start();
    let installations = create_installations(&server);
    let _register = mock_register(&server);
    let generate = server.mock(|when, then| {
        when.method(POST)
            .path("/installations/v1/projects/demo/installations/fid-from-server/authTokens:generate")
            .header("authorization", "FIS_v2 refresh-1");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "token": "fis-token-2", "expiresIn": "3600s" }));
    });

    installations.id().await.unwrap();
    let token = installations.token(true).await.unwrap();
    assert_eq!(token.token, "fis-token-2");

    generate.assert();
}

#[tokio::test]
async fn test_registration_failure() {
    let server = MockServer::start();
    let installations = create_installations(&server);
    server.mock(|when, then| {
        when.method(POST)
            .path("/installations/v1/projects/demo/installations");
        then.status(403)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": { "code": 403, "message": "PERMISSION_DENIED" }
            }));
    });

    match installations.id().await {
        Err(InstallationsError::ApiError(msg)) => assert_eq!(msg, "PERMISSION_DENIED (code: 403)"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_live_installation_id() {
    let server = MockServer::start();
    let installations = Arc::new(create_installations(&server));
    let _register = mock_register(&server);

    let live = installations.to_live();
    assert!(live.value().is_none());

    let mut subscription = live.subscribe();
    let id = subscription.wait_for(|_| true).await;
    assert_eq!(id.as_str(), "fid-from-server");
    drop(subscription);

    let again = installations.to_live();
    assert_eq!(again.value().as_deref().map(String::as_str), Some("fid-from-server"));
}
