use super::*;
use crate::play_services::PlayServiceError;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;
use std::sync::Arc;

fn create_auth(server: &MockServer) -> FirebaseAuth {
    let client = ClientBuilder::new(Client::new()).build();
    FirebaseAuth::new(
        client,
        server.url("/identitytoolkit.googleapis.com/v1"),
        server.url("/securetoken.googleapis.com/v1"),
    )
}

fn mock_anonymous_sign_up(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/identitytoolkit.googleapis.com/v1/accounts:signUp")
            .json_body(json!({ "returnSecureToken": true }));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "idToken": "id-token-1",
                "refreshToken": "refresh-1",
                "expiresIn": "3600",
                "localId": "anon-uid"
            }));
    })
}

fn mock_refresh(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/securetoken.googleapis.com/v1/token")
            .header("content-type", "application/x-www-form-urlencoded");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "id_token": "id-token-2",
                "refresh_token": "refresh-2",
                "expires_in": "3600",
                "token_type": "Bearer",
                "user_id": "anon-uid"
            }));
    })
}

#[tokio::test]
async fn test_sign_in_anonymously() {
    let server = MockServer::start();
    let auth = create_auth(&server);
    let mock = mock_anonymous_sign_up(&server);

    let changes = auth.auth_state_changes();
    let user = auth.sign_in_anonymously().await.unwrap();

    assert_eq!(user.uid, "anon-uid");
    assert!(user.is_anonymous);
    assert_eq!(auth.current_user(), Some(user.clone()));
    assert!(changes.has_changed().unwrap());
    assert_eq!(*changes.borrow(), Some(user));

    let token = auth.get_id_token(false).await.unwrap();
    assert_eq!(token.token, "id-token-1");

    mock.assert();
}

#[tokio::test]
async fn test_forced_refresh_replaces_token() {
    let server = MockServer::start();
    let auth = create_auth(&server);
    let _sign_up = mock_anonymous_sign_up(&server);
    let refresh = mock_refresh(&server);

    auth.sign_in_anonymously().await.unwrap();
    let mut tokens = auth.id_token_changes();
    tokens.borrow_and_update();

    let token = auth.get_id_token(true).await.unwrap();
    assert_eq!(token.token, "id-token-2");
    assert!(tokens.has_changed().unwrap());
    assert_eq!(tokens.borrow().as_ref().map(|t| t.token.as_str()), Some("id-token-2"));

    refresh.assert();
}

#[tokio::test]
async fn test_sign_out_clears_session() {
    let server = MockServer::start();
    let auth = create_auth(&server);
    let _sign_up = mock_anonymous_sign_up(&server);

    auth.sign_in_anonymously().await.unwrap();
    auth.sign_out();

    assert!(auth.current_user().is_none());
    assert!(auth.auth_state_changes().borrow().is_none());
    assert!(matches!(
        auth.get_id_token(false).await,
        Err(AuthError::NotSignedIn)
    ));
}

#[tokio::test]
async fn test_password_sign_in_error_is_reported() {
    let server = MockServer::start();
    let auth = create_auth(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/identitytoolkit.googleapis.com/v1/accounts:signInWithPassword")
            .json_body(json!({
                "email": "user@example.com",
                "password": "wrong",
                "returnSecureToken": true
            }));
        then.status(400)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": { "code": 400, "message": "INVALID_PASSWORD", "errors": [] }
            }));
    });

    let err = auth
        .sign_in_with_email_and_password("user@example.com", "wrong")
        .await
        .unwrap_err();
    match err {
        AuthError::ApiError(msg) => assert_eq!(msg, "INVALID_PASSWORD (code: 400)"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(auth.current_user().is_none());

    mock.assert();
}

#[tokio::test]
async fn test_password_sign_in_keeps_profile() {
    let server = MockServer::start();
    let auth = create_auth(&server);

    server.mock(|when, then| {
        when.method(POST)
            .path("/identitytoolkit.googleapis.com/v1/accounts:signInWithPassword");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "idToken": "id-token",
                "refreshToken": "refresh",
                "expiresIn": "3600",
                "localId": "uid-42",
                "email": "user@example.com",
                "displayName": ""
            }));
    });

    let user = auth
        .sign_in_with_email_and_password("user@example.com", "secret")
        .await
        .unwrap();
    assert_eq!(user.uid, "uid-42");
    assert_eq!(user.email.as_deref(), Some("user@example.com"));
    assert!(user.display_name.is_none());
    assert!(!user.is_anonymous);
}

#[tokio::test]
async fn test_cached_access_token_requires_user() {
    let server = MockServer::start();
    let auth = create_auth(&server);

    let err = auth.get_cached_access_token().await.unwrap_err();
    assert!(matches!(err, PlayServiceError::FirebaseAuthFailed(ref msg) if msg == "not authorized"));
}

#[tokio::test]
async fn test_cached_access_token_refreshes_once() {
    let server = MockServer::start();
    let auth = create_auth(&server);
    let _sign_up = mock_anonymous_sign_up(&server);
    let refresh = mock_refresh(&server);

    auth.sign_in_anonymously().await.unwrap();

    assert_eq!(auth.get_cached_access_token().await.unwrap(), "id-token-2");
    assert_eq!(auth.get_cached_access_token().await.unwrap(), "id-token-2");

    refresh.assert();
}

#[tokio::test]
async fn test_live_auth_publishes_sign_in() {
    let server = MockServer::start();
    let auth = Arc::new(create_auth(&server));
    let _sign_up = mock_anonymous_sign_up(&server);

    let live = auth.to_live();
    assert_eq!(live.observer_count(), 0);
    let mut subscription = live.subscribe();
    assert_eq!(live.observer_count(), 1);

    auth.sign_in_anonymously().await.unwrap();
    let snapshot = subscription
        .wait_for(|s| s.user.is_some() && s.token.is_some())
        .await;
    assert_eq!(snapshot.user.as_ref().map(|u| u.uid.as_str()), Some("anon-uid"));
    assert_eq!(snapshot.token.as_ref().map(|t| t.token.as_str()), Some("id-token-1"));

    auth.sign_out();
    let snapshot = subscription.wait_for(|s| s.user.is_none()).await;
    assert!(snapshot.token.is_none());
}
