//! Error taxonomy surfaced by the sync engine.
//!
//! Every failure that reaches a query result, a subscriber, or the caller of
//! `mutate` is a `SyncError`. The type is `Clone` so a single fetch outcome can
//! be handed to every caller that joined the same in-flight request.

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Transport-level failure (unreachable host, timeout). Retried up to
    /// `SyncConfig::network_retries` times.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the article service. Never retried.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Malformed filter or search input, rejected before any network call.
    #[error("Invalid query: {0}")]
    Validation(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No cached data for {0}")]
    NotCached(String),

    #[error("Request cancelled before it completed")]
    Cancelled,

    #[error("Sync engine has been disposed")]
    Disposed,
}

impl SyncError {
    /// Whether the engine retries this error on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(e) if e.is_decode() => SyncError::InvalidResponse(e.to_string()),
            ApiError::Network(e) => SyncError::Network(e.to_string()),
            ApiError::Server { status, message } => SyncError::Server { status, message },
            ApiError::InvalidResponse(msg) => SyncError::InvalidResponse(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_retry() {
        assert!(SyncError::Network("timed out".into()).is_retryable());
        assert!(!SyncError::Server { status: 503, message: "busy".into() }.is_retryable());
        assert!(!SyncError::Validation("page must be >= 1".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn test_server_error_from_api_error() {
        let err: SyncError = ApiError::Server { status: 404, message: "gone".into() }.into();
        assert_eq!(err, SyncError::Server { status: 404, message: "gone".into() });
        assert_eq!(err.to_string(), "Server error 404: gone");
    }
}
