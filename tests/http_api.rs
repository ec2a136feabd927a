use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use edgecache::application::context::{CollectionContext, CollectionRegistry};
use edgecache::cache::{CacheAdapter, CacheConfig, CacheConsistencyEngine, MemoryKvStore};
use edgecache::domain::collection::{CollectionName, CollectionSpec, Granularity};
use edgecache::infra::http::{CACHE_STATUS_HEADER, HttpState, REQUEST_ID_HEADER, build_router};
use edgecache::infra::memory::MemoryBackingStore;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: HttpState,
    backing: Arc<MemoryBackingStore>,
    weather_kv: Arc<MemoryKvStore>,
    articles_kv: Arc<MemoryKvStore>,
}

impl TestApp {
    fn new() -> Self {
        let backing = Arc::new(MemoryBackingStore::new());
        let weather_kv = Arc::new(MemoryKvStore::new());
        let articles_kv = Arc::new(MemoryKvStore::new());

        let mut weather = CollectionSpec::new(
            CollectionName::parse("weather").expect("valid name"),
            Granularity::Collection,
        );
        weather.webhook_path = "/weather".to_string();

        let mut articles = CollectionSpec::new(
            CollectionName::parse("articles").expect("valid name"),
            Granularity::Item,
        );
        articles.accepts_writes = true;
        articles.required_fields = vec!["title".to_string(), "content".to_string()];
        articles.webhook_path = "/revalidate".to_string();

        let mut registry = CollectionRegistry::new();
        registry
            .register(CollectionContext::new(
                weather,
                backing.clone(),
                CacheAdapter::new("weather", weather_kv.clone()),
            ))
            .expect("register weather");
        registry
            .register(CollectionContext::new(
                articles,
                backing.clone(),
                CacheAdapter::new("articles", articles_kv.clone()),
            ))
            .expect("register articles");

        let state = HttpState::new(CacheConsistencyEngine::new(CacheConfig::default()));
        Self {
            router: build_router(state.clone(), &registry),
            state,
            backing,
            weather_kv,
            articles_kv,
        }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<&str>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request should build"))
            .await
            .expect("router should respond")
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str, body: &str) -> Response {
        self.send(Method::POST, uri, Some(body)).await
    }

    async fn settle(&self) {
        for _ in 0..400 {
            if self.state.engine.deferred().in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("deferred refreshes did not settle");
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

async fn text_body(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("body should be UTF-8")
}

fn cache_status(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(CACHE_STATUS_HEADER)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn collection_read_misses_then_hits() {
    let app = TestApp::new();
    app.backing.seed("weather", vec![json!({"temp": 20})]).await;

    let first = app.get("/weather").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(cache_status(&first), Some("MISS"));
    assert_eq!(json_body(first).await, json!([{"temp": 20}]));
    assert!(app.weather_kv.contains("/weather"));

    let second = app.get("/weather").await;
    assert_eq!(cache_status(&second), Some("HIT"));
    assert_eq!(json_body(second).await, json!([{"temp": 20}]));
    assert_eq!(app.backing.collection_queries(), 1);
}

#[tokio::test]
async fn webhook_on_read_path_refreshes_collection() {
    let app = TestApp::new();
    app.backing.seed("weather", vec![json!({"id": 1, "temp": 20})]).await;
    app.get("/weather").await;

    app.backing
        .upsert("weather", "id", json!({"id": 1, "temp": 25}))
        .await;
    let response = app
        .post(
            "/weather",
            r#"{"type":"UPDATE","record":{"id":1,"temp":25},"old_record":{"id":1,"temp":20}}"#,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"received": true}));

    app.settle().await;
    let refreshed = app.get("/weather").await;
    assert_eq!(cache_status(&refreshed), Some("HIT"));
    assert_eq!(json_body(refreshed).await, json!([{"id": 1, "temp": 25}]));
}

#[tokio::test]
async fn forced_refresh_reports_cache_update() {
    let app = TestApp::new();
    app.backing.seed("weather", vec![json!({"temp": 11})]).await;

    let response = app.get("/set-weather").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"cache_updated": true}));
    let cached = app.get("/weather").await;
    assert_eq!(cache_status(&cached), Some("HIT"));
}

#[tokio::test]
async fn item_read_is_cached_under_its_path() {
    let app = TestApp::new();
    app.backing
        .seed("articles", vec![json!({"id": 7, "title": "Hi", "content": "There"})])
        .await;

    let response = app.get("/articles/7").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(cache_status(&response), Some("MISS"));
    assert_eq!(
        json_body(response).await,
        json!({"id": 7, "title": "Hi", "content": "There"})
    );
    assert!(app.articles_kv.contains("/articles/7"));
}

#[tokio::test]
async fn missing_item_is_not_found_and_not_cached() {
    let app = TestApp::new();

    let response = app.get("/articles/42").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await, json!({"error": "not found"}));
    assert!(!app.articles_kv.contains("/articles/42"));
}

#[tokio::test]
async fn insert_returns_created_rows_without_touching_cache() {
    let app = TestApp::new();

    let response = app
        .post("/articles", r#"{"title":"Hello","content":"World","draft":true}"#)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!([{"id": 1, "title": "Hello", "content": "World"}])
    );
    assert!(app.articles_kv.is_empty());
}

#[tokio::test]
async fn insert_failures_answer_with_generic_error() {
    let app = TestApp::new();

    let missing_field = app.post("/articles", r#"{"title":"Hello"}"#).await;
    assert_eq!(missing_field.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(missing_field).await, json!({"error": "insert failed"}));

    let malformed = app.post("/articles", "{not json").await;
    assert_eq!(malformed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(malformed).await, json!({"error": "insert failed"}));

    app.backing.reject_inserts("duplicate key value").await;
    let rejected = app
        .post("/articles", r#"{"title":"Hello","content":"World"}"#)
        .await;
    assert_eq!(rejected.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.backing.rows("articles").await.is_empty());
}

#[tokio::test]
async fn read_only_collection_has_no_insert_route() {
    let app = TestApp::new();

    let response = app.post("/weather/extra", "{}").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unavailable_backing_store_is_bad_gateway() {
    let app = TestApp::new();
    app.backing.set_unavailable(true);

    let response = app.get("/weather").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        json_body(response).await,
        json!({"error": "backing store unavailable"})
    );
    assert!(app.weather_kv.is_empty());
}

#[tokio::test]
async fn malformed_change_event_is_rejected() {
    let app = TestApp::new();

    let response = app.post("/revalidate", r#"{"type":"TRUNCATE"}"#).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({"error": "invalid change event"})
    );
    assert_eq!(app.state.engine.deferred().in_flight(), 0);
}

#[tokio::test]
async fn item_delete_event_evicts_item_and_refreshes_collection() {
    let app = TestApp::new();
    app.backing
        .seed("articles", vec![json!({"id": 1, "title": "a"}), json!({"id": 2, "title": "b"})])
        .await;
    app.get("/set-articles").await;
    app.get("/articles/2").await;
    app.backing.remove("articles", "id", "2").await;

    let response = app
        .post("/revalidate", r#"{"type":"DELETE","old_record":{"id":2}}"#)
        .await;
    assert_eq!(json_body(response).await, json!({"received": true}));
    app.settle().await;

    assert!(!app.articles_kv.contains("/articles/2"));
    let collection = app.get("/articles").await;
    assert_eq!(cache_status(&collection), Some("HIT"));
    assert_eq!(json_body(collection).await, json!([{"id": 1, "title": "a"}]));
}

#[tokio::test]
async fn unknown_paths_fall_back_to_plain_not_found() {
    let app = TestApp::new();

    for uri in ["/weather/1", "/nowhere", "/"] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(text_body(response).await, "Not found");
    }
}

#[tokio::test]
async fn known_paths_with_other_methods_are_not_found() {
    let app = TestApp::new();

    for (method, uri) in [
        (Method::PUT, "/weather"),
        (Method::DELETE, "/articles/1"),
        (Method::POST, "/set-weather"),
        (Method::GET, "/revalidate"),
        (Method::PATCH, "/_health"),
    ] {
        let response = app.send(method.clone(), uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(text_body(response).await, "Not found");
    }
}

#[tokio::test]
async fn health_probe_answers_without_content() {
    let app = TestApp::new();

    let response = app.get("/_health").await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let app = TestApp::new();

    let request = Request::builder()
        .uri("/_health")
        .header(REQUEST_ID_HEADER, "trace-abc")
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    assert_eq!(
        response.headers().get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()),
        Some("trace-abc")
    );

    let response = app.get("/_health").await;
    let generated = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("request id header");
    assert!(uuid_like(generated), "{generated}");
}

fn uuid_like(value: &str) -> bool {
    value.len() == 36 && value.chars().filter(|c| *c == '-').count() == 4
}
