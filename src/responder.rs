//! HTTP error responses for axum handlers.
//!
//! Handlers return `Result<T, ApiError>` and use `?` on any error. A failure
//! is captured by the current error-reporting hub and answered with
//! `500 {"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Handler failure.
#[derive(Debug)]
pub struct ApiError(pub anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let event_id = sentry::integrations::anyhow::capture_anyhow(&self.0);
        // Warn, not error: the error-reporting sink would capture it again.
        tracing::warn!(error = %self.0, %event_id, "Request failed");

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}
