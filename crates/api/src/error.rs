use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use meshforge_core::error::CoreError;
use meshforge_store::StoreError;
use meshforge_upstream::api::UpstreamError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors of the workspace crates and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses of the form `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `meshforge_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Reading or writing the metadata store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The generation service could not be reached or rejected the request.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
            },

            // --- Storage errors ---
            AppError::Store(err) => {
                tracing::error!(error = %err, "Store error");
                internal()
            }

            // --- Upstream errors ---
            AppError::Upstream(err) => classify_upstream_error(err),

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Classify an upstream failure into an HTTP status, error code, and message.
///
/// - Connection failures and timeouts map to 503.
/// - Non-2xx answers and other transport failures map to 502.
/// - A request that could not be built maps to 400.
fn classify_upstream_error(err: &UpstreamError) -> (StatusCode, &'static str, String) {
    match err {
        UpstreamError::Request(e) if e.is_connect() || e.is_timeout() => {
            tracing::error!(error = %e, "Generation service unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "UPSTREAM_UNAVAILABLE",
                "Generation service is unavailable".to_string(),
            )
        }
        UpstreamError::Request(e) => {
            tracing::error!(error = %e, "Generation request failed");
            (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                "Generation service request failed".to_string(),
            )
        }
        UpstreamError::ApiError { status, body } => {
            tracing::error!(status, body = %body, "Generation service rejected request");
            (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                format!("Generation service returned status {status}"),
            )
        }
        UpstreamError::InvalidRequest(msg) => {
            (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone())
        }
    }
}
