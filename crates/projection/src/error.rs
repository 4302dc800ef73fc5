//! Error types for projection fitting.

use thiserror::Error;

/// Errors raised while fitting or rebuilding a projection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("unknown projection '{0}'")]
    UnknownProjection(String),

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
