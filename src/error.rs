//! Error types for the caching engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Storage Error Enum ==
/// Failures raised by a storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend refused the write because it would exceed its quota
    #[error("Storage quota exceeded: {needed} bytes requested, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    /// Underlying I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored entry could not be decoded
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Returns true if the failure is a quota rejection.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

// == Engine Error Enum ==
/// Unified error type for request interception.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Network call failed or was rejected
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Bounded network wait exceeded
    #[error("Network timeout after {0}ms")]
    NetworkTimeout(u64),

    /// No usable cached entry and the strategy forbids or failed the network
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Cache store read or write failed
    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StorageError),

    /// Request could not be interpreted (e.g. unparseable URL)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Admin request named a partition that does not exist
    #[error("Partition '{0}' not found")]
    PartitionNotFound(String),

    /// Route table or startup configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::NetworkUnavailable(_) => StatusCode::BAD_GATEWAY,
            EngineError::NetworkTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::ResourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::PartitionNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type for storage backends.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
