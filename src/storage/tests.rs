use super::*;
use httpmock::prelude::*;
use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use serde_json::json;

fn create_storage(server: &MockServer) -> FirebaseStorage {
    let client = ClientBuilder::new(Client::new()).build();
    FirebaseStorage::new(client, &server.url("/storage/v0"), "demo.appspot.com")
}

#[test]
fn test_parse_bucket_url() {
    assert_eq!(parse_bucket_url("gs://demo.appspot.com").unwrap(), "demo.appspot.com");
    assert_eq!(parse_bucket_url("gs://demo.appspot.com/").unwrap(), "demo.appspot.com");
    assert_eq!(parse_bucket_url("other-bucket").unwrap(), "other-bucket");
    assert!(matches!(
        parse_bucket_url("https://example.com"),
        Err(StorageError::InvalidUrl(_))
    ));
    assert!(parse_bucket_url("gs://").is_err());
    assert!(parse_bucket_url("gs://bucket/path").is_err());
}

#[test]
fn test_reference_paths() {
    let server = MockServer::start();
    let storage = create_storage(&server);

    let images = storage.reference("/images/");
    let avatar = images.child("avatar.png");
    assert_eq!(images.full_path(), "images");
    assert_eq!(avatar.full_path(), "images/avatar.png");
    assert_eq!(avatar.name(), "avatar.png");
    assert_eq!(avatar.bucket(), "demo.appspot.com");
}

#[tokio::test]
async fn test_put_bytes() {
    let server = MockServer::start();
    let storage = create_storage(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/storage/v0/b/demo.appspot.com/o")
            .query_param("uploadType", "media")
            .query_param("name", "images/avatar.png")
            .header("content-type", "image/png")
            .body("png-bytes");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "images/avatar.png",
                "bucket": "demo.appspot.com",
                "contentType": "image/png",
                "size": "9"
            }));
    });

    let metadata = storage
        .reference("images/avatar.png")
        .put_bytes(b"png-bytes".to_vec(), "image/png")
        .await
        .unwrap();
    assert_eq!(metadata.content_type.as_deref(), Some("image/png"));
    assert_eq!(metadata.size_bytes(), Some(9));

    mock.assert();
}

#[tokio::test]
async fn test_get_bytes() {
    let server = MockServer::start();
    let storage = create_storage(&server);

    server.mock(|when, then| {
        when.method(GET)
            .path("/storage/v0/b/demo.appspot.com/o/avatar.png")
            .query_param("alt", "media");
        then.status(200).body("png-bytes");
    });

    let reference = storage.reference("avatar.png");
    let bytes = reference.get_bytes(1024).await.unwrap();
    assert_eq!(&bytes[..], b"png-bytes");

    let err = reference.get_bytes(4).await.unwrap_err();
    assert!(matches!(err, StorageError::TooLarge { size: 9, max: 4 }));
}

#[tokio::test]
async fn test_metadata_and_delete() {
    let server = MockServer::start();
    let storage = create_storage(&server);

    let metadata_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/storage/v0/b/demo.appspot.com/o/notes.txt");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "notes.txt",
                "contentType": "text/plain",
                "metadata": { "owner": "alice" }
            }));
    });
    let delete_mock = server.mock(|when, then| {
        when.method(DELETE)
            .path("/storage/v0/b/demo.appspot.com/o/notes.txt");
        then.status(204);
    });

    let reference = storage.reference("notes.txt");
    let metadata = reference.metadata().await.unwrap();
    assert_eq!(
        metadata.metadata.as_ref().and_then(|m| m.get("owner")).map(String::as_str),
        Some("alice")
    );
    reference.delete().await.unwrap();

    metadata_mock.assert();
    delete_mock.assert();
}

#[tokio::test]
async fn test_missing_object() {
    let server = MockServer::start();
    let storage = create_storage(&server);

    server.mock(|when, then| {
        when.method(GET)
            .path("/storage/v0/b/demo.appspot.com/o/missing.txt");
        then.status(404).body("Not Found");
    });

    let err = storage.reference("missing.txt").metadata().await.unwrap_err();
    assert!(matches!(err, StorageError::ApiError(ref msg) if msg.contains("404")));
}
