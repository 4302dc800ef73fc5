//! Error types for the chunk engine.

use thiserror::Error;

/// Broad category of an [`EngineError`].
///
/// Callers at the UI boundary branch on this rather than on individual
/// variants: configuration errors are fatal, network errors may be
/// resubmitted by the user, decode errors point at a corrupt store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Network,
    Decode,
    Uninitialized,
}

/// Errors that can occur while loading metadata or chunk windows.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Invalid dataset, variable, or engine configuration. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-2xx response or transport failure.
    #[error("{message}")]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// Corrupt or unexpected chunk byte layout.
    #[error("decode error: {0}")]
    Decode(String),

    /// Derived state was read before a successful initialization.
    #[error("not initialized: {0}")]
    Uninitialized(String),

    /// A lower-layer error annotated with the variable, level or key involved.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a Decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an Uninitialized error.
    pub fn uninitialized(msg: impl Into<String>) -> Self {
        Self::Uninitialized(msg.into())
    }

    /// Create a Network error for a transport failure (no HTTP status).
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Network {
            status: None,
            message: msg.into(),
        }
    }

    /// Create a Network error for a non-2xx response, with a
    /// status-specific, human-readable message.
    pub fn http_status(status: u16, url: &str) -> Self {
        Self::Network {
            status: Some(status),
            message: format!("{}: {}", status_message(status), url),
        }
    }

    /// Wrap this error with context describing where it happened.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Category of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Network { .. } => ErrorKind::Network,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Uninitialized(_) => ErrorKind::Uninitialized,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// HTTP status of the innermost network error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Network { status, .. } => *status,
            Self::Context { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// User-facing category for a non-2xx HTTP status.
pub fn status_message(status: u16) -> String {
    match status {
        403 => "access forbidden".to_string(),
        404 => "not found".to_string(),
        other => format!("request failed with status {}", other),
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("invalid metadata JSON: {}", err))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages() {
        assert_eq!(status_message(403), "access forbidden");
        assert_eq!(status_message(404), "not found");
        assert_eq!(status_message(500), "request failed with status 500");
    }

    #[test]
    fn test_context_preserves_kind_and_status() {
        let err = EngineError::http_status(404, "https://example.com/data.zarr/.zmetadata")
            .with_context("level 0")
            .with_context("variable 'tas'");

        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.status(), Some(404));

        let msg = err.to_string();
        assert!(msg.starts_with("variable 'tas': level 0: not found"));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            EngineError::configuration("bad").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(EngineError::decode("bad").kind(), ErrorKind::Decode);
        assert_eq!(EngineError::transport("reset").kind(), ErrorKind::Network);
        assert_eq!(EngineError::transport("reset").status(), None);
    }
}
