use super::status::*;
use super::*;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;

const FETCH_PATH: &str = "/remoteconfig/v1/projects/demo/namespaces/firebase:fetch";

fn create_remote_config(server: &MockServer) -> FirebaseRemoteConfig {
    let client = ClientBuilder::new(Client::new()).build();
    let installations = Arc::new(FirebaseInstallations::new(
        client.clone(),
        &server.url("/installations/v1"),
        "demo",
        "1:1:android:abc",
    ));

    server.mock(|when, then| {
        when.method(POST)
            .path("/installations/v1/projects/demo/installations");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "fid": "fid-1",
                "refreshToken": "refresh-1",
                "authToken": { "token": "fis-token", "expiresIn": "604800s" }
            }));
    });

    FirebaseRemoteConfig::new(
        client,
        &server.url("/remoteconfig/v1"),
        "demo",
        "1:1:android:abc",
        installations,
    )
}

fn mock_fetch(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path(FETCH_PATH).json_body(json!({
            "sdk_version": SDK_VERSION,
            "app_instance_id": "fid-1",
            "app_instance_id_token": "fis-token",
            "app_id": "1:1:android:abc",
            "language_code": "en-US"
        }));
        then.status(200)
            .header("content-type", "application/json")
            .header("ETag", "etag-1")
            .json_body(json!({
                "entries": { "welcome": "hello", "enabled": "true", "limit": "10" },
                "state": "UPDATE"
            }));
    })
}

#[tokio::test]
async fn test_values_visible_only_after_activate() {
    let server = MockServer::start();
    let rc = create_remote_config(&server);
    let mock = mock_fetch(&server);

    assert!(rc.all().is_empty());
    assert_eq!(rc.info().last_fetch_status, LastFetchStatus::NoFetchYet);

    rc.fetch(Duration::ZERO).await.unwrap();
    assert!(rc.all().is_empty());
    assert_eq!(rc.info().last_fetch_status, LastFetchStatus::Success);
    assert!(rc.info().fetch_time.is_some());

    assert!(rc.activate());
    assert!(!rc.activate());
    assert_eq!(rc.get_string("welcome"), "hello");
    assert!(rc.get_bool("enabled"));
    assert_eq!(rc.get_long("limit"), 10);
    assert_eq!(rc.get_value("welcome").source, ValueSource::Remote);
    assert_eq!(rc.all().len(), 3);

    mock.assert();
}

#[tokio::test]
async fn test_fetch_served_from_cache_within_interval() {
    let server = MockServer::start();
    let rc = create_remote_config(&server);
    let mock = mock_fetch(&server);

    assert!(rc.fetch_and_activate().await.unwrap());
    assert!(!rc.fetch_and_activate().await.unwrap());
    rc.fetch(Duration::from_secs(60)).await.unwrap();

    mock.assert();
}

#[tokio::test]
async fn test_defaults_are_overlaid() {
    let server = MockServer::start();
    let rc = create_remote_config(&server);
    let _mock = mock_fetch(&server);

    rc.set_defaults([("welcome", "default"), ("theme", "dark")]);
    assert_eq!(rc.get_value("theme").source, ValueSource::Default);
    assert_eq!(rc.get_value("missing").source, ValueSource::Static);
    assert_eq!(rc.get_double("missing"), 0.0);

    rc.fetch_and_activate().await.unwrap();
    let all = rc.all();
    assert_eq!(all["welcome"].value, "hello");
    assert_eq!(all["welcome"].source, ValueSource::Remote);
    assert_eq!(all["theme"].value, "dark");
    assert_eq!(all["theme"].source, ValueSource::Default);
}

#[tokio::test]
async fn test_no_change_keeps_active_values() {
    let server = MockServer::start();
    let rc = create_remote_config(&server);
    let mut first = mock_fetch(&server);

    rc.fetch_and_activate().await.unwrap();
    first.delete();

    let unchanged = server.mock(|when, then| {
        when.method(POST)
            .path(FETCH_PATH)
            .header("if-none-match", "etag-1");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "state": "NO_CHANGE" }));
    });

    rc.fetch(Duration::ZERO).await.unwrap();
    assert!(!rc.activate());
    assert_eq!(rc.get_string("welcome"), "hello");

    unchanged.assert();
}

#[tokio::test]
async fn test_throttled_fetch() {
    let server = MockServer::start();
    let rc = create_remote_config(&server);
    server.mock(|when, then| {
        when.method(POST).path(FETCH_PATH);
        then.status(429);
    });

    let err = rc.fetch(Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, RemoteConfigError::Throttled));
    assert_eq!(rc.info().last_fetch_status, LastFetchStatus::Throttled);
    assert_eq!(
        rc.fetch_status(),
        FETCH_STATUS_FLAG_FAILED | FETCH_STATUS_FLAG_ACTIVATE | FETCH_STATUS_HAS_VALUES
    );
}

#[tokio::test]
async fn test_fetch_status_flags() {
    let server = MockServer::start();
    let rc = create_remote_config(&server);
    let _mock = mock_fetch(&server);

    assert_eq!(
        rc.fetch_status(),
        FETCH_STATUS_FLAG_FAILED | FETCH_STATUS_FLAG_ACTIVATE
    );
    assert_eq!(
        rc.force_activate(),
        FETCH_STATUS_FLAG_FAILED | FETCH_STATUS_FLAG_ACTIVATE
    );

    assert_eq!(
        rc.fetch_and_activate_status(Duration::ZERO).await,
        FETCH_STATUS_FLAG_COMPLETED
    );
    assert_eq!(rc.get_string("welcome"), "hello");
    assert_eq!(
        rc.fetch_status(),
        FETCH_STATUS_HAS_VALUES | FETCH_STATUS_FLAG_CACHED
    );
}

#[test]
fn test_empty_template_states() {
    let response: models::FetchResponse =
        serde_json::from_value(json!({ "state": "NO_TEMPLATE" })).unwrap();
    assert_eq!(
        response.into_outcome(),
        Ok(models::FetchOutcome::Updated(HashMap::new()))
    );

    let response: models::FetchResponse =
        serde_json::from_value(json!({ "state": "INSTANCE_STATE_UNSPECIFIED" })).unwrap();
    assert!(response.into_outcome().is_err());
}
