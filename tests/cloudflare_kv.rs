use std::time::Duration;

use bytes::Bytes;
use edgecache::cache::{KeyValueStore, StoreError};
use edgecache::config::CloudflareSettings;
use edgecache::infra::cloudflare::CloudflareKvStore;
use httpmock::prelude::*;
use url::Url;

fn store(server: &MockServer) -> CloudflareKvStore {
    let settings = CloudflareSettings {
        account_id: "acct".to_string(),
        api_token: "kv-token".to_string(),
        base_url: Url::parse(&server.url("/client/v4/")).expect("mock url"),
        timeout: Duration::from_secs(5),
    };
    CloudflareKvStore::new(&settings, "ns1").expect("client should build")
}

#[tokio::test]
async fn get_returns_stored_bytes() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).header("authorization", "Bearer kv-token");
        then.status(200).body(r#"[{"temp":20}]"#);
    });

    let value = store(&server).get("/weather").await.expect("get");

    mock.assert();
    assert_eq!(value, Some(Bytes::from_static(br#"[{"temp":20}]"#)));
}

#[tokio::test]
async fn missing_key_reads_as_absent() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET);
        then.status(404)
            .header("content-type", "application/json")
            .body(r#"{"success":false,"errors":[{"code":10009,"message":"get: 'key not found'"}]}"#);
    });

    let value = store(&server).get("/articles/42").await.expect("get");

    assert_eq!(value, None);
}

#[tokio::test]
async fn put_sends_raw_value() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .header("authorization", "Bearer kv-token")
            .header("content-type", "application/octet-stream")
            .body(r#"{"id":1}"#);
        then.status(200).body(r#"{"success":true}"#);
    });

    store(&server)
        .put("/articles/1", Bytes::from_static(br#"{"id":1}"#))
        .await
        .expect("put");

    mock.assert();
}

#[tokio::test]
async fn deleting_absent_key_succeeds() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(DELETE);
        then.status(404);
    });

    store(&server).delete("/articles/9").await.expect("delete");

    mock.assert();
}

#[tokio::test]
async fn api_failures_are_rejections() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(PUT);
        then.status(500).body("internal error");
    });

    let err = store(&server)
        .put("/weather", Bytes::from_static(b"[]"))
        .await
        .expect_err("put should fail");

    match err {
        StoreError::Rejected { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "internal error");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
