//! Error types for the picks service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Result alias used across the service.
pub type PicksResult<T> = Result<T, PicksError>;

/// Errors raised while fetching, scoring or publishing reports.
///
/// `Clone` so a single in-flight result can be handed to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PicksError {
    /// Session cookie / crumb acquisition failed, or a request was still
    /// unauthorized after a forced refresh
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Non-2xx response from a data provider
    #[error("Upstream {endpoint} returned HTTP {status}")]
    Upstream { endpoint: String, status: u16 },

    /// Some chunks of a batch failed; partial data was still returned
    #[error("Partial batch failure: {failed} of {total} symbols missing")]
    PartialBatch { failed: usize, total: usize },

    /// A full refresh cycle failed
    #[error("Report generation failed: {0}")]
    Generation(String),

    /// Malformed inbound parameters
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream body could not be decoded
    #[error("Failed to parse upstream response: {0}")]
    Parse(String),

    /// Deadline exceeded
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Distributed store read/write failure
    #[error("Report store error: {0}")]
    Store(String),

    /// Operation disabled by configuration
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl PicksError {
    /// Map a transport error from reqwest.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout("upstream request".into())
        } else if err.is_connect() {
            Self::Network("connection failed".into())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Check if this is an authentication error.
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// HTTP status used when this error reaches a client.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Auth(_) | Self::Upstream { .. } | Self::Network(_) | Self::Parse(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Generation(_) | Self::PartialBatch { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PicksError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
