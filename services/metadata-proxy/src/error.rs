//! Proxy errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chunk_engine::status_message;
use serde_json::json;
use thiserror::Error;

/// Errors returned by the metadata endpoint.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("missing 'path' query parameter")]
    MissingPath,

    #[error("invalid dataset URL: {0}")]
    InvalidUrl(String),

    /// Non-2xx answer from the upstream store.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// The upstream store could not be reached.
    #[error("upstream request failed: {0}")]
    Transport(String),

    #[error("upstream metadata is not valid JSON: {0}")]
    InvalidMetadata(String),
}

impl ProxyError {
    pub fn upstream(status: u16, url: &str) -> Self {
        Self::Upstream {
            status,
            message: format!("{}: {}", status_message(status), url),
        }
    }

    /// Status returned to the client: 403 and 404 pass through, every
    /// other upstream failure is a 502.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingPath | Self::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status: 403, .. } => StatusCode::FORBIDDEN,
            Self::Upstream { status: 404, .. } => StatusCode::NOT_FOUND,
            Self::Upstream { .. } | Self::Transport(_) | Self::InvalidMetadata(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Upstream failures report the store's own status.
        let reported = match &self {
            Self::Upstream { status, .. } => *status,
            _ => status.as_u16(),
        };
        let body = json!({
            "error": self.to_string(),
            "status": reported,
        });
        (status, Json(body)).into_response()
    }
}
