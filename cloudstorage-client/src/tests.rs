use std::io::Write;

use cloudstorage_test::server::TestServer;

use super::*;
use crate::config::{KeyFn, PrivateKey};
use crate::credentials::CredentialSource;

const TEST_KEY: &str = include_str!("../tests/fixtures/service_account.pem");

/// A builder whose every outbound request goes to `server`.
fn builder(server: &TestServer) -> ClientBuilder {
    Client::builder()
        .endpoint(server.url("/"))
        .token_uri(server.url("/token"))
        .metadata_host(server.url("/"))
        .environment(Environment::default())
}

fn token_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn invalid_endpoint_fails_build() {
    let result = Client::builder()
        .endpoint("not a url")
        .environment(Environment::default())
        .build()
        .await;

    assert!(matches!(result, Err(Error::Reqwest(_))), "{result:?}");
}

#[tokio::test]
async fn resolves_from_metadata_server() {
    cloudstorage_test::tracing::init();
    let server = TestServer::new().await;

    let client = builder(&server).build().await.unwrap();
    assert_eq!(client.credential_source(), CredentialSource::ComputeEngine);
}

#[tokio::test]
async fn resolves_app_engine_from_environment() {
    let server = TestServer::new().await;

    let client = builder(&server)
        .environment(Environment::default().with_server_software("Google App Engine/1.9.40"))
        .build()
        .await
        .unwrap();
    assert_eq!(client.credential_source(), CredentialSource::AppEngine);
}

#[tokio::test]
async fn uses_stored_token_without_exchange() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let token = server.issue_token();
    let file = token_file(&format!(r#"{{"access_token": "{token}"}}"#));

    let client = builder(&server)
        .token_file(file.path())
        .build()
        .await
        .unwrap();
    assert_eq!(client.credential_source(), CredentialSource::StoredToken);

    client.buckets().get("bucket").await.unwrap();
    assert!(server.token_grants().is_empty());

    let requests = server.requests();
    assert_eq!(requests[0].authorization, Some(format!("Bearer {token}")));
}

#[tokio::test]
async fn clones_share_credential() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");

    let client = builder(&server)
        .service_account(
            "uploader@example.iam.gserviceaccount.com",
            PrivateKey::Callback(KeyFn::new(|| Ok(TEST_KEY.into()))),
        )
        .build()
        .await
        .unwrap();
    assert_eq!(client.credential_source(), CredentialSource::ServiceAccount);

    let clone = client.clone();
    client.buckets().get("bucket").await.unwrap();
    clone.buckets().get("bucket").await.unwrap();

    assert_eq!(server.token_grants().len(), 1);
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].authorization, requests[1].authorization);
}

#[tokio::test]
async fn encodes_object_names() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = builder(&server).build().await.unwrap();
    assert_eq!(client.endpoint().as_str(), server.url("/"));

    let object = client
        .write_file("bucket", "dir/file.txt", "oh hai!", "text/plain")
        .await
        .unwrap();
    assert_eq!(object.name, "dir/file.txt");
    client.read_file_metadata("bucket", "dir/file.txt").await.unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].path, "/upload/storage/v1/b/bucket/o");
    assert_eq!(requests[0].query_param("name"), Some("dir/file.txt"));
    assert_eq!(requests[1].path, "/storage/v1/b/bucket/o/dir%2Ffile.txt");
}

#[tokio::test]
async fn trace_applies_to_every_request() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");

    let client = builder(&server)
        .trace("email:alice")
        .build()
        .await
        .unwrap();

    client
        .write_file("bucket", "file.txt", "oh hai!", "text/plain")
        .await
        .unwrap();
    client.read_file_metadata("bucket", "file.txt").await.unwrap();
    client.read_file("bucket", "file.txt").await.unwrap();
    let _ = client.read_file("bucket", "missing.txt").await;

    let requests = server.requests();
    assert_eq!(requests.len(), 4);
    for request in requests {
        assert_eq!(request.query_param(PARAM_TRACE), Some("email:alice"), "{request:?}");
    }
}

#[tokio::test]
async fn no_trace_by_default() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = builder(&server).build().await.unwrap();

    client.buckets().get("bucket").await.unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].query_param(PARAM_TRACE), None);
}
