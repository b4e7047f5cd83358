//! Integration Tests for the Forwarding Path
//!
//! Runs a local origin on an ephemeral port and drives the proxy router
//! against it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use cache_proxy::{
    api::create_router,
    cache::{CacheEngine, EngineSettings, FallbackPolicy},
    proxy::{Forwarder, CACHE_STATUS_HEADER},
    store::VolatileStore,
    AppState,
};
use reqwest::Url;
use tokio::net::TcpListener;
use tower::ServiceExt;

// == Origin ==

const BINARY_BODY: &[u8] = &[0x00, 0xff, 0x10, 0x80, 0x7f, 0x00, 0xc3];

#[derive(Clone, Default)]
struct Origin {
    hits: Arc<AtomicUsize>,
}

impl Origin {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn hello(State(origin): State<Origin>) -> &'static str {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    "hello world"
}

async fn echo_query(State(origin): State<Origin>, RawQuery(query): RawQuery) -> String {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    query.unwrap_or_default()
}

async fn missing(State(origin): State<Origin>) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::NOT_FOUND, "nope")
}

async fn submit(State(origin): State<Origin>, body: String) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::CREATED, format!("received {}", body))
}

async fn binary(State(origin): State<Origin>) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "application/octet-stream")], BINARY_BODY)
}

async fn file(State(origin): State<Origin>, headers: HeaderMap) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    if headers.contains_key(header::RANGE) {
        (
            StatusCode::PARTIAL_CONTENT,
            [(header::CONTENT_RANGE, "bytes 0-1/11")],
            "he",
        )
            .into_response()
    } else {
        (StatusCode::OK, "hello world").into_response()
    }
}

async fn accepted(State(origin): State<Origin>) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::ACCEPTED, "queued")
}

async fn spawn_origin() -> (Url, Origin) {
    let origin = Origin::default();
    let app = Router::new()
        .route("/hello", get(hello))
        .route("/echo", get(echo_query))
        .route("/missing", get(missing))
        .route("/submit", post(submit))
        .route("/binary", get(binary))
        .route("/file", get(file))
        .route("/accepted", get(accepted))
        .with_state(origin.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (Url::parse(&format!("http://{}", addr)).unwrap(), origin)
}

/// An address nothing listens on.
async fn dead_origin() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{}", addr)).unwrap()
}

// == Helper Functions ==

fn proxy_app(origin: Url, store: Arc<VolatileStore>, fallback: FallbackPolicy) -> Router {
    let settings = EngineSettings {
        fallback,
        ..EngineSettings::default()
    };
    let cache = Arc::new(CacheEngine::new(store, settings));
    let forwarder = Forwarder::new(origin, Duration::from_secs(5)).unwrap();
    create_router(AppState::new(cache, forwarder, Duration::from_secs(60)))
}

fn request(method: &str, uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let cache_status = response
        .headers()
        .get(CACHE_STATUS_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, cache_status, body.to_vec())
}

// == Cache Hit/Miss Tests ==

#[tokio::test]
async fn test_miss_then_hit() {
    let (url, origin) = spawn_origin().await;
    let app = proxy_app(url, Arc::new(VolatileStore::new()), FallbackPolicy::MemoryOnly);

    let (status, cache_status, body) = send(&app, request("GET", "/hello", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_status.as_deref(), Some("MISS"));
    assert_eq!(body, b"hello world");
    assert_eq!(origin.hits(), 1);

    let (status, cache_status, body) = send(&app, request("GET", "/hello", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_status.as_deref(), Some("HIT"));
    assert_eq!(body, b"hello world");
    assert_eq!(origin.hits(), 1);
}

#[tokio::test]
async fn test_miss_persists_to_store() {
    let (url, _origin) = spawn_origin().await;
    let store = Arc::new(VolatileStore::new());
    let app = proxy_app(url, store.clone(), FallbackPolicy::MemoryOnly);

    send(&app, request("GET", "/hello", "")).await;

    let row = store.row("/hello").unwrap();
    assert_eq!(row.value, "hello world");
    assert_eq!(row.ttl, Duration::from_secs(60));
}

#[tokio::test]
async fn test_binary_body_is_served_byte_identical() {
    let (url, origin) = spawn_origin().await;
    let app = proxy_app(url, Arc::new(VolatileStore::new()), FallbackPolicy::MemoryOnly);

    let (_, _, first) = send(&app, request("GET", "/binary", "")).await;
    let (_, cache_status, second) = send(&app, request("GET", "/binary", "")).await;

    assert_eq!(first, BINARY_BODY);
    assert_eq!(second, BINARY_BODY);
    assert_eq!(cache_status.as_deref(), Some("HIT"));
    assert_eq!(origin.hits(), 1);
}

#[tokio::test]
async fn test_query_string_is_part_of_key() {
    let (url, origin) = spawn_origin().await;
    let app = proxy_app(url, Arc::new(VolatileStore::new()), FallbackPolicy::MemoryOnly);

    let (_, first_status, first) = send(&app, request("GET", "/echo?page=1", "")).await;
    let (_, second_status, second) = send(&app, request("GET", "/echo?page=2", "")).await;

    assert_eq!(first_status.as_deref(), Some("MISS"));
    assert_eq!(second_status.as_deref(), Some("MISS"));
    assert_eq!(first, b"page=1");
    assert_eq!(second, b"page=2");
    assert_eq!(origin.hits(), 2);

    let (_, cache_status, body) = send(&app, request("GET", "/echo?page=1", "")).await;
    assert_eq!(cache_status.as_deref(), Some("HIT"));
    assert_eq!(body, b"page=1");
    assert_eq!(origin.hits(), 2);
}

#[tokio::test]
async fn test_persisted_entry_survives_engine_restart() {
    let (url, origin) = spawn_origin().await;
    let store = Arc::new(VolatileStore::new());

    let first = proxy_app(url.clone(), store.clone(), FallbackPolicy::MemoryOnly);
    send(&first, request("GET", "/hello", "")).await;
    assert_eq!(origin.hits(), 1);

    // fresh engine, same persistent tier
    let second = proxy_app(url, store, FallbackPolicy::MemoryOnly);
    let (_, cache_status, body) = send(&second, request("GET", "/hello", "")).await;

    assert_eq!(cache_status.as_deref(), Some("HIT"));
    assert_eq!(body, b"hello world");
    assert_eq!(origin.hits(), 1);
}

// == Pass-Through Tests ==

#[tokio::test]
async fn test_error_responses_are_not_cached() {
    let (url, origin) = spawn_origin().await;
    let store = Arc::new(VolatileStore::new());
    let app = proxy_app(url, store.clone(), FallbackPolicy::MemoryOnly);

    for _ in 0..2 {
        let (status, cache_status, body) = send(&app, request("GET", "/missing", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(cache_status, None);
        assert_eq!(body, b"nope");
    }

    assert_eq!(origin.hits(), 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_ranged_response_is_not_cached() {
    let (url, origin) = spawn_origin().await;
    let store = Arc::new(VolatileStore::new());
    let app = proxy_app(url, store.clone(), FallbackPolicy::MemoryOnly);

    let ranged = Request::builder()
        .method("GET")
        .uri("/file")
        .header(header::RANGE, "bytes=0-1")
        .body(Body::empty())
        .unwrap();
    let (status, cache_status, body) = send(&app, ranged).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(cache_status, None);
    assert_eq!(body, b"he");
    assert!(store.is_empty());

    let (status, cache_status, body) = send(&app, request("GET", "/file", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_status.as_deref(), Some("MISS"));
    assert_eq!(body, b"hello world");

    let (_, cache_status, body) = send(&app, request("GET", "/file", "")).await;
    assert_eq!(cache_status.as_deref(), Some("HIT"));
    assert_eq!(body, b"hello world");
    assert_eq!(origin.hits(), 2);
}

#[tokio::test]
async fn test_ranged_request_bypasses_cached_entry() {
    let (url, origin) = spawn_origin().await;
    let app = proxy_app(url, Arc::new(VolatileStore::new()), FallbackPolicy::MemoryOnly);

    send(&app, request("GET", "/file", "")).await;

    let ranged = Request::builder()
        .method("GET")
        .uri("/file")
        .header(header::RANGE, "bytes=0-1")
        .body(Body::empty())
        .unwrap();
    let (status, cache_status, body) = send(&app, ranged).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(cache_status, None);
    assert_eq!(body, b"he");
    assert_eq!(origin.hits(), 2);
}

#[tokio::test]
async fn test_non_200_success_is_not_cached() {
    let (url, origin) = spawn_origin().await;
    let store = Arc::new(VolatileStore::new());
    let app = proxy_app(url, store.clone(), FallbackPolicy::MemoryOnly);

    for _ in 0..2 {
        let (status, cache_status, body) = send(&app, request("GET", "/accepted", "")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(cache_status, None);
        assert_eq!(body, b"queued");
    }

    assert_eq!(origin.hits(), 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_post_is_forwarded_and_not_cached() {
    let (url, origin) = spawn_origin().await;
    let store = Arc::new(VolatileStore::new());
    let app = proxy_app(url, store.clone(), FallbackPolicy::MemoryOnly);

    for _ in 0..2 {
        let (status, cache_status, body) =
            send(&app, request("POST", "/submit", "payload")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(cache_status, None);
        assert_eq!(body, b"received payload");
    }

    assert_eq!(origin.hits(), 2);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    let url = dead_origin().await;
    let store = Arc::new(VolatileStore::new());
    let app = proxy_app(url, store.clone(), FallbackPolicy::MemoryOnly);

    let (status, cache_status, _) = send(&app, request("GET", "/hello", "")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(cache_status, None);
    assert!(store.is_empty());
}

// == Degraded Store Tests ==

#[tokio::test]
async fn test_store_outage_falls_back_to_memory() {
    let (url, origin) = spawn_origin().await;
    let store = Arc::new(VolatileStore::new());
    store.set_available(false);
    let app = proxy_app(url, store.clone(), FallbackPolicy::MemoryOnly);

    let (status, cache_status, _) = send(&app, request("GET", "/hello", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_status.as_deref(), Some("MISS"));

    let (status, cache_status, body) = send(&app, request("GET", "/hello", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_status.as_deref(), Some("HIT"));
    assert_eq!(body, b"hello world");

    assert_eq!(origin.hits(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_store_outage_strict_serves_without_caching() {
    let (url, origin) = spawn_origin().await;
    let store = Arc::new(VolatileStore::new());
    store.set_available(false);
    let app = proxy_app(url, store, FallbackPolicy::Strict);

    for _ in 0..2 {
        let (status, cache_status, body) = send(&app, request("GET", "/hello", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache_status.as_deref(), Some("MISS"));
        assert_eq!(body, b"hello world");
    }

    assert_eq!(origin.hits(), 2);
}

// == Admin Interaction Tests ==

#[tokio::test]
async fn test_clear_cache_forces_refetch() {
    let (url, origin) = spawn_origin().await;
    let store = Arc::new(VolatileStore::new());
    let app = proxy_app(url, store.clone(), FallbackPolicy::MemoryOnly);

    send(&app, request("GET", "/hello", "")).await;
    let (status, _, _) = send(&app, request("POST", "/clear-cache", "")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.is_empty());

    let (_, cache_status, _) = send(&app, request("GET", "/hello", "")).await;
    assert_eq!(cache_status.as_deref(), Some("MISS"));
    assert_eq!(origin.hits(), 2);
}

#[tokio::test]
async fn test_admin_entry_is_served_by_proxy() {
    let (url, origin) = spawn_origin().await;
    let app = proxy_app(url, Arc::new(VolatileStore::new()), FallbackPolicy::MemoryOnly);

    let add = Request::builder()
        .method("POST")
        .uri("/api/cache/add")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"key":"/hello","value":"seeded","ttl":60}"#))
        .unwrap();
    let (status, _, _) = send(&app, add).await;
    assert_eq!(status, StatusCode::OK);

    let (_, cache_status, body) = send(&app, request("GET", "/hello", "")).await;
    assert_eq!(cache_status.as_deref(), Some("HIT"));
    assert_eq!(body, b"seeded");
    assert_eq!(origin.hits(), 0);
}
