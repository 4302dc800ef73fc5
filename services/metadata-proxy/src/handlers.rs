//! HTTP handlers.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chunk_engine::metadata::CONSOLIDATED_KEY;
use chunk_engine::normalize_url;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::ProxyError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MetadataQuery {
    /// Dataset root URL (`https://`, `http://`, `s3://` or `gs://`).
    pub path: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /api/metadata?path=<url> - consolidated metadata of a dataset
#[instrument(skip(state))]
pub async fn metadata_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<MetadataQuery>,
) -> Result<Response, ProxyError> {
    counter!("metadata_proxy_requests_total").increment(1);

    let path = query
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or(ProxyError::MissingPath)?;
    let base = normalize_url(&path).map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;
    let url = format!("{}/{}", base, CONSOLIDATED_KEY);

    let body = fetch_metadata(&state, &url).await.map_err(|e| {
        counter!("metadata_proxy_upstream_errors_total").increment(1);
        warn!(url = %url, error = %e, "Metadata request failed");
        e
    })?;

    debug!(url = %url, bytes = body.len(), "Proxied metadata");
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

async fn fetch_metadata(state: &AppState, url: &str) -> Result<Bytes, ProxyError> {
    let response = state
        .client
        .get(url)
        .send()
        .await
        .map_err(|e| ProxyError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProxyError::upstream(status.as_u16(), url));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ProxyError::Transport(e.to_string()))?;

    if body.len() > state.config.max_metadata_bytes {
        return Err(ProxyError::InvalidMetadata(format!(
            "document of {} bytes exceeds the {} byte limit",
            body.len(),
            state.config.max_metadata_bytes
        )));
    }

    serde_json::from_slice::<serde::de::IgnoredAny>(&body)
        .map_err(|e| ProxyError::InvalidMetadata(e.to_string()))?;

    Ok(body)
}

/// GET /health - Basic health check
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
