//! Consolidated Zarr Metadata Proxy
//!
//! Fetches `<dataset>/.zmetadata` on behalf of browser clients that cannot
//! reach a store directly, and re-maps upstream failures to stable status
//! codes: 403 and 404 pass through, anything else becomes a 502 with a
//! `{"error", "status"}` body.

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use state::AppState;

/// Build the proxy router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/metadata", get(handlers::metadata_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .layer(Extension(state))
}
