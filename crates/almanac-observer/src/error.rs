//! Error types for the boundary API server.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Engine
//! errors map on their [`ErrorKind`]:
//!
//! | Kind | Status |
//! |------|--------|
//! | `validation` | 400, or 404 when something named does not exist |
//! | `concurrency` | 409 |
//! | `branch_conflict` | 409 |
//! | `durability` | 503 |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use almanac_core::EngineError;
use almanac_types::ErrorKind;

/// Errors that can occur in the boundary API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The engine rejected the request.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The requested value or resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An invalid query parameter or body field was provided.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Autoplay controls were called but no autoplay runner is attached.
    #[error("autoplay is not running")]
    NoAutoplay,

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ObserverError {
    /// Machine-readable error class for the response body.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Engine(e) if e.is_not_found() => "not_found",
            Self::Engine(e) => e.kind().as_str(),
            Self::NotFound(_) => "not_found",
            Self::InvalidQuery(_) => "validation",
            Self::NoAutoplay => "no_autoplay",
            Self::Serialization(_) | Self::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Engine(e) => match e.kind() {
                ErrorKind::Validation if e.is_not_found() => StatusCode::NOT_FOUND,
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Concurrency | ErrorKind::BranchConflict => StatusCode::CONFLICT,
                ErrorKind::Durability => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::RuleFault => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::NoAutoplay => StatusCode::CONFLICT,
            Self::Serialization(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "kind": self.kind(),
        });

        (status, axum::Json(body)).into_response()
    }
}
