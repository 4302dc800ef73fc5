//! Proxy routes against a local upstream store.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chunk_engine::{Dataset, EngineConfig, ErrorKind};
use metadata_proxy::{router, AppState, ProxyConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use tower::ServiceExt;

type Objects = Arc<BTreeMap<String, Vec<u8>>>;

/// Serve a store's objects under `/data/`; `/forbidden/` and `/broken/`
/// answer 403 and 500.
async fn upstream_object(State(objects): State<Objects>, Path(key): Path<String>) -> Response {
    if key.starts_with("forbidden/") {
        return StatusCode::FORBIDDEN.into_response();
    }
    if key.starts_with("broken/") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    if key.starts_with("garbage/") {
        return "not json".into_response();
    }

    match key.strip_prefix("data/").and_then(|k| objects.get(k)) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_upstream() -> SocketAddr {
    let objects: Objects = Arc::new(test_utils::air_temperature_store().build());
    let app = Router::new()
        .route("/*key", get(upstream_object))
        .with_state(objects);
    spawn(app).await
}

fn proxy() -> Router {
    let state = AppState::new(ProxyConfig::default(), None).unwrap();
    router(Arc::new(state))
}

async fn get_metadata(app: Router, path: &str) -> (StatusCode, serde_json::Value) {
    let uri = format!("/api/metadata?path={}", path);
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health() {
    let response = proxy()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_path_is_bad_request() {
    let (status, body) = get_metadata(proxy(), "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, _) = get_metadata(proxy(), "ftp://host/store.zarr").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_proxies_consolidated_metadata() {
    let upstream = spawn_upstream().await;
    let (status, body) = get_metadata(proxy(), &format!("http://{}/data", upstream)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["zarr_consolidated_format"], 1);
    assert!(body["metadata"]["air_temperature/.zarray"].is_object());
}

#[tokio::test]
async fn test_upstream_status_mapping() {
    let upstream = spawn_upstream().await;

    let (status, body) = get_metadata(proxy(), &format!("http://{}/forbidden", upstream)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);
    assert!(body["error"].as_str().unwrap().contains("access forbidden"));

    let (status, body) = get_metadata(proxy(), &format!("http://{}/missing", upstream)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let (status, body) = get_metadata(proxy(), &format!("http://{}/broken", upstream)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], 500);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("request failed with status 500"));

    let (status, _) = get_metadata(proxy(), &format!("http://{}/garbage", upstream)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Nothing listens on the discard port.
    let (status, body) = get_metadata(proxy(), "http://127.0.0.1:9/store.zarr").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], 502);
}

#[tokio::test]
async fn test_metrics_rendered() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let state = AppState::new(ProxyConfig::default(), Some(recorder.handle())).unwrap();
    let response = router(Arc::new(state))
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = proxy()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_dataset_through_proxy() {
    let upstream = spawn_upstream().await;
    let proxy_addr = spawn(proxy()).await;

    let config = EngineConfig {
        metadata_proxy_url: Some(format!("http://{}", proxy_addr)),
        ..EngineConfig::default()
    };
    let mut dataset = Dataset::initialize(&format!("http://{}/data", upstream), config)
        .await
        .unwrap();

    dataset.select_variable("air_temperature").await.unwrap();
    let window = dataset.fetch_window().await.unwrap();
    assert_eq!(window.chunks.len(), 12);
    assert_eq!(window.chunks["0/2/2"].bounds.lon, [0.0, 90.0]);

    // Upstream refusals surface as network errors with their status.
    let config = EngineConfig {
        metadata_proxy_url: Some(format!("http://{}", proxy_addr)),
        ..EngineConfig::default()
    };
    let err = Dataset::initialize(&format!("http://{}/forbidden", upstream), config)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert_eq!(err.status(), Some(403));
}
