use cloudstorage_client::resources::ListObjects;
use cloudstorage_client::types::Channel;
use cloudstorage_client::{Client, Environment, Error};
use cloudstorage_test::server::TestServer;

async fn client(server: &TestServer) -> Client {
    Client::builder()
        .endpoint(server.url("/"))
        .metadata_host(server.url("/"))
        .environment(Environment::default())
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn write_then_read() {
    cloudstorage_test::tracing::init();
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = client(&server).await;

    let object = client
        .write_file("bucket", "greeting.txt", "oh hai!", "text/plain")
        .await
        .unwrap();
    assert_eq!(object.bucket, "bucket");
    assert_eq!(object.size_bytes(), Some(7));

    let content = client.read_file("bucket", "greeting.txt").await.unwrap();
    assert_eq!(content, "oh hai!");
    assert_eq!(server.object("bucket", "greeting.txt").unwrap(), "oh hai!");
}

#[tokio::test]
async fn reads_metadata() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = client(&server).await;

    let written = client
        .write_file("bucket", "data.json", r#"{"a": 1}"#, "application/json")
        .await
        .unwrap();
    let metadata = client.read_file_metadata("bucket", "data.json").await.unwrap();

    assert_eq!(metadata.name, "data.json");
    assert_eq!(metadata.content_type.as_deref(), Some("application/json"));
    assert_eq!(metadata.generation_number(), written.generation_number());
}

#[tokio::test]
async fn overwrites_objects() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = client(&server).await;

    let first = client
        .write_file("bucket", "file.txt", "first", "text/plain")
        .await
        .unwrap();
    let second = client
        .write_file("bucket", "file.txt", "second", "text/plain")
        .await
        .unwrap();

    assert!(second.generation_number() > first.generation_number());
    assert_eq!(client.read_file("bucket", "file.txt").await.unwrap(), "second");
}

#[tokio::test]
async fn missing_object_is_not_found() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = client(&server).await;

    let result = client.read_file("bucket", "missing.txt").await;
    let Err(Error::NotFound { message }) = result else {
        panic!("expected not found, got {result:?}");
    };
    assert_eq!(message, "No such object: bucket/missing.txt");

    let result = client.read_file_metadata("nope", "missing.txt").await;
    assert!(matches!(result, Err(Error::NotFound { .. })), "{result:?}");
}

#[tokio::test]
async fn rejected_token_is_authorization_error() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, br#"{"access_token": "forged"}"#).unwrap();

    let client = Client::builder()
        .endpoint(server.url("/"))
        .token_file(file.path())
        .environment(Environment::default())
        .build()
        .await
        .unwrap();

    let result = client.read_file("bucket", "file.txt").await;
    let Err(Error::Authorization { message }) = result else {
        panic!("expected authorization error, got {result:?}");
    };
    assert_eq!(message, "Invalid Credentials");
}

#[tokio::test]
async fn classifies_json_failures() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = client(&server).await;

    server.inject_failure(
        429,
        "application/json; charset=UTF-8",
        r#"{"error": {"code": 429, "message": "Slow down", "errors": [
            {"domain": "usageLimits", "reason": "rateLimitExceeded", "message": "Slow down"}
        ]}}"#,
    );
    let result = client.read_file("bucket", "file.txt").await;
    assert!(matches!(result, Err(Error::RateLimitExceeded { .. })), "{result:?}");

    server.inject_failure(
        400,
        "application/json",
        r#"{"error": {"errors": [{"reason": "teapot", "message": "I'm a teapot"}]}}"#,
    );
    let result = client.read_file("bucket", "file.txt").await;
    let Err(Error::Service { message, details }) = result else {
        panic!("expected service error, got {result:?}");
    };
    assert_eq!(message, "I'm a teapot");
    assert_eq!(details.primary.reason.as_deref(), Some("teapot"));

    server.inject_failure(500, "application/json", r#"{"error": {"errors": [{}]}}"#);
    let result = client.read_file("bucket", "file.txt").await;
    assert!(matches!(result, Err(Error::Interface { .. })), "{result:?}");
}

#[tokio::test]
async fn classifies_non_json_failures() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = client(&server).await;

    server.inject_failure(502, "text/html", "<html>Bad Gateway</html>");
    let result = client.read_file("bucket", "file.txt").await;
    let Err(Error::Connection { status, body }) = result else {
        panic!("expected connection error, got {result:?}");
    };
    assert_eq!(status, 502);
    assert_eq!(body, "<html>Bad Gateway</html>");

    server.inject_failure(403, "text/plain", "Forbidden");
    let result = client.read_file("bucket", "file.txt").await;
    assert!(matches!(result, Err(Error::Authorization { .. })), "{result:?}");

    server.inject_failure(404, "text/plain", "Not Found");
    let result = client.read_file("bucket", "file.txt").await;
    assert!(matches!(result, Err(Error::NotFound { .. })), "{result:?}");
}

#[tokio::test]
async fn lists_and_deletes_objects() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = client(&server).await;

    for name in ["a.txt", "b.txt", "dir/c.txt", "dir/d.txt"] {
        client
            .write_file("bucket", name, "content", "text/plain")
            .await
            .unwrap();
    }

    let options = ListObjects {
        delimiter: Some("/".into()),
        ..Default::default()
    };
    let list = client.objects().list("bucket", &options).await.unwrap();
    let names: Vec<_> = list.items.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["a.txt", "b.txt"]);
    assert_eq!(list.prefixes, ["dir/"]);

    let options = ListObjects {
        prefix: Some("dir/".into()),
        max_results: Some(1),
        ..Default::default()
    };
    let first = client.objects().list("bucket", &options).await.unwrap();
    assert_eq!(first.items[0].name, "dir/c.txt");
    let options = ListObjects {
        page_token: first.next_page_token,
        ..options
    };
    let second = client.objects().list("bucket", &options).await.unwrap();
    assert_eq!(second.items[0].name, "dir/d.txt");
    assert_eq!(second.next_page_token, None);

    client.objects().delete("bucket", "a.txt").await.unwrap();
    let result = client.objects().delete("bucket", "a.txt").await;
    assert!(matches!(result, Err(Error::NotFound { .. })), "{result:?}");
}

#[tokio::test]
async fn manages_buckets() {
    let server = TestServer::new().await;
    let client = client(&server).await;
    let buckets = client.buckets();

    let bucket = buckets.insert(TestServer::PROJECT, "fresh").await.unwrap();
    assert_eq!(bucket.name, "fresh");

    let result = buckets.insert(TestServer::PROJECT, "fresh").await;
    assert!(matches!(result, Err(Error::Service { .. })), "{result:?}");

    let list = buckets.list(TestServer::PROJECT, None).await.unwrap();
    assert_eq!(list.items.len(), 1);
    assert_eq!(buckets.get("fresh").await.unwrap().name, "fresh");

    buckets.delete("fresh").await.unwrap();
    let result = buckets.get("fresh").await;
    assert!(matches!(result, Err(Error::NotFound { .. })), "{result:?}");
}

#[tokio::test]
async fn manages_access_controls() {
    let server = TestServer::new().await;
    server.create_bucket("bucket");
    let client = client(&server).await;

    let acl = client.bucket_access_controls();
    let entry = acl
        .insert("bucket", "user-alice@example.com", "WRITER")
        .await
        .unwrap();
    assert_eq!(entry.entity, "user-alice@example.com");
    assert_eq!(entry.role, "WRITER");
    assert_eq!(acl.list("bucket").await.unwrap(), [entry.clone()]);
    assert_eq!(acl.get("bucket", "user-alice@example.com").await.unwrap(), entry);

    acl.delete("bucket", "user-alice@example.com").await.unwrap();
    assert!(acl.list("bucket").await.unwrap().is_empty());

    let result = acl.insert("bucket", "allUsers", "ADMIN").await;
    assert!(matches!(result, Err(Error::InvalidParameter { .. })), "{result:?}");

    let defaults = client.default_object_access_controls();
    defaults.insert("bucket", "allUsers", "READER").await.unwrap();
    assert_eq!(defaults.list("bucket").await.unwrap().len(), 1);
    assert!(acl.list("bucket").await.unwrap().is_empty());
    defaults.delete("bucket", "allUsers").await.unwrap();

    let result = defaults.get("bucket", "allUsers").await;
    assert!(matches!(result, Err(Error::NotFound { .. })), "{result:?}");
}

#[tokio::test]
async fn stops_channels() {
    let server = TestServer::new().await;
    let client = client(&server).await;

    let channel = Channel {
        id: "channel-1".into(),
        resource_id: "resource-1".into(),
        ..Default::default()
    };
    client.channels().stop(&channel).await.unwrap();

    let result = client.channels().stop(&Channel::default()).await;
    assert!(result.is_err());
}
