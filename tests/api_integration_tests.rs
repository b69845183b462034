//! Integration Tests for API Endpoints
//!
//! Drives the full router against a local stand-in for the upstream registry
//! served over real HTTP, so the reqwest client is exercised end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use nuget_cache_proxy::{
    api::create_router, cache::CacheStore, upstream::HttpUpstreamClient, AppState,
};
use serde_json::Value;
use tower::ServiceExt;

// == Fake Upstream ==

#[derive(Clone, Default)]
struct FakeRegistry {
    requests: Arc<AtomicUsize>,
    seen_headers: Arc<Mutex<Vec<HeaderMap>>>,
}

impl FakeRegistry {
    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn registry_handler(
    State(registry): State<FakeRegistry>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    registry.requests.fetch_add(1, Ordering::SeqCst);
    registry.seen_headers.lock().unwrap().push(headers);

    if key.starts_with("missing/") {
        StatusCode::NOT_FOUND.into_response()
    } else if key.starts_with("blob/") {
        (StatusCode::OK, vec![b'z'; 100]).into_response()
    } else {
        (StatusCode::OK, format!("content of {key}")).into_response()
    }
}

async fn spawn_registry() -> (String, FakeRegistry) {
    let registry = FakeRegistry::default();
    let app = Router::new()
        .route("/flat/*key", get(registry_handler))
        .with_state(registry.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/flat"), registry)
}

// == Helper Functions ==

async fn create_test_app(dir: &std::path::Path, capacity: u64) -> (Router, FakeRegistry) {
    let (base, registry) = spawn_registry().await;
    let store = CacheStore::new(dir, capacity).await.unwrap();
    let upstream = HttpUpstreamClient::new(base).unwrap();
    let app = create_router(AppState::new(Arc::new(store), Arc::new(upstream)));
    (app, registry)
}

async fn send_get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

// == Service Index ==

#[tokio::test]
async fn test_service_index_over_https() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _registry) = create_test_app(dir.path(), 1024).await;

    let response = send_get(&app, "https://example.com/v3/index.json").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["version"], "3.0.0");
    let resources = json["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["@id"], "https://example.com/v3/flatcontainer/");
    assert_eq!(resources[0]["@type"], "PackageBaseAddress/3.0.0");
}

// == Flat Container ==

#[tokio::test]
async fn test_miss_then_hit_fetches_upstream_once() {
    let dir = tempfile::tempdir().unwrap();
    let (app, registry) = create_test_app(dir.path(), 1024).await;
    let uri = "/v3/flatcontainer/pkg/1.0.0/pkg.1.0.0.nupkg";
    let expected = b"content of pkg/1.0.0/pkg.1.0.0.nupkg".to_vec();

    let first = send_get(&app, uri).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first.headers()["content-type"],
        "application/octet-stream"
    );
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(body_bytes(first).await, expected);
    assert_eq!(registry.requests(), 1);

    let second = send_get(&app, uri).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(body_bytes(second).await, expected);
    assert_eq!(registry.requests(), 1);

    assert!(dir.path().join("v3/pkg/1.0.0/pkg.1.0.0.nupkg").is_file());
}

#[tokio::test]
async fn test_upstream_not_found_is_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    let (app, registry) = create_test_app(dir.path(), 1024).await;

    let response = send_get(&app, "/v3/flatcontainer/missing/index.json").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!dir.path().join("v3/missing").exists());

    send_get(&app, "/v3/flatcontainer/missing/index.json").await;
    assert_eq!(registry.requests(), 2);
}

#[tokio::test]
async fn test_only_authorization_is_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    let (app, registry) = create_test_app(dir.path(), 1024).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v3/flatcontainer/private/index.json")
                .header("authorization", "Basic dXNlcjpwYXNz")
                .header("x-nuget-apikey", "do-not-forward")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let seen = registry.seen_headers.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["authorization"], "Basic dXNlcjpwYXNz");
    assert!(seen[0].get("x-nuget-apikey").is_none());
}

#[tokio::test]
async fn test_traversal_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, registry) = create_test_app(dir.path(), 1024).await;

    let response = send_get(&app, "/v3/flatcontainer/..%2F..%2Fsecret").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(registry.requests(), 0);
}

#[tokio::test]
async fn test_capacity_is_enforced_across_requests() {
    let dir = tempfile::tempdir().unwrap();
    let (app, registry) = create_test_app(dir.path(), 250).await;

    for n in 0..3 {
        let response = send_get(&app, &format!("/v3/flatcontainer/blob/{n}.nupkg")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await.len(), 100);
    }

    let stats: Value = serde_json::from_slice(&body_bytes(send_get(&app, "/stats").await).await).unwrap();
    assert_eq!(stats["total_entries"], 2);
    assert_eq!(stats["total_bytes"], 200);
    assert_eq!(stats["evictions"], 1);
    assert!(!dir.path().join("v3/blob/0.nupkg").exists());

    // the evicted artifact is fetched again
    send_get(&app, "/v3/flatcontainer/blob/0.nupkg").await;
    assert_eq!(registry.requests(), 4);
}

#[tokio::test]
async fn test_object_larger_than_cache_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _registry) = create_test_app(dir.path(), 50).await;

    let response = send_get(&app, "/v3/flatcontainer/blob/huge.nupkg").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(json["error"].as_str().unwrap().contains("capacity"));
}

// == Health ==

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _registry) = create_test_app(dir.path(), 1024).await;

    let response = send_get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK");
}
