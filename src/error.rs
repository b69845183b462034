//! Error types for the caching proxy
//!
//! Provides layered error handling using thiserror: storage failures,
//! upstream failures, and the proxy-level errors that map onto HTTP statuses.

use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Storage Error Enum ==
/// Failures raised by the disk cache store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No entry for the key (possibly evicted between `exists` and `open`)
    #[error("Cache entry not found: {0}")]
    NotFound(String),

    /// Key is empty or would resolve outside the cache root
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Object cannot fit within the configured capacity
    #[error("Object of {size} bytes does not fit in cache capacity of {capacity} bytes")]
    CapacityExceeded { size: u64, capacity: u64 },

    /// Reading the incoming content stream failed mid-transfer
    #[error("Content stream failed: {0}")]
    Source(#[source] io::Error),

    /// Local disk failure
    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),
}

// == Upstream Error Enum ==
/// Failures raised by the upstream client.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Transport or connection failure reaching the upstream registry
    #[error("Error connecting to upstream feed: {0}")]
    Connectivity(String),
}

// == Proxy Error Enum ==
/// Outward-facing error type for the proxy routes.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Request path is not a valid cache key
    #[error("Invalid package path: {0}")]
    InvalidKey(String),

    /// Upstream could not be reached or broke mid-transfer
    #[error("Bad gateway: {0}")]
    UpstreamUnreachable(String),

    /// Local cache failure (capacity or disk)
    #[error("Cache access error: {0}")]
    Storage(String),
}

impl From<UpstreamError> for ProxyError {
    fn from(err: UpstreamError) -> Self {
        ProxyError::UpstreamUnreachable(err.to_string())
    }
}

impl From<StorageError> for ProxyError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(key) => ProxyError::InvalidKey(key),
            StorageError::Source(e) => ProxyError::UpstreamUnreachable(e.to_string()),
            other => ProxyError::Storage(other.to_string()),
        }
    }
}

impl ProxyError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string()
        }));

        (self.status(), body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_proxy_errors() {
        let err: ProxyError = StorageError::CapacityExceeded {
            size: 10,
            capacity: 5,
        }
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ProxyError = StorageError::Io(io::Error::other("disk full")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ProxyError = StorageError::InvalidKey("../x".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_source_failure_blames_upstream() {
        let err: ProxyError = StorageError::Source(io::Error::other("reset")).into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_upstream_error_is_bad_gateway() {
        let err: ProxyError = UpstreamError::Connectivity("refused".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("refused"));
    }
}
