//! Error types for the cache core
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache core and its HTTP surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key (or snapshot composite key) not present
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key is present but its TTL has elapsed
    #[error("Key expired: {0}")]
    Expired(String),

    /// Empty key, invalid TTL or window, malformed bulk payload
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Entry store is at capacity even after sweeping expired entries
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// Value could not be encoded for size accounting
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A named preload routine could not fetch or write its data
    #[error("Preload '{routine}' failed: {reason}")]
    PreloadFailure { routine: String, reason: String },

    /// An error surfaced by a scheduler tick; recorded, never fatal
    #[error("Scheduler tick failed: {0}")]
    SchedulerTick(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) | CacheError::Expired(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidArgument(_) | CacheError::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::CacheFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::PreloadFailure { .. } => StatusCode::BAD_GATEWAY,
            CacheError::SchedulerTick(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache core.
pub type Result<T> = std::result::Result<T, CacheError>;
