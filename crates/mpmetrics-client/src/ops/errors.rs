//! HTTP rendering of inference failures.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use mpmetrics_core::InferenceException;

/// Wrapper so handlers can return `Result<T, InferenceError>`.
#[derive(Debug, Clone)]
pub struct InferenceError(pub InferenceException);

impl From<InferenceException> for InferenceError {
    fn from(e: InferenceException) -> Self {
        Self(e)
    }
}

impl IntoResponse for InferenceError {
    fn into_response(self) -> Response {
        // Normalized codes are always 4xx/5xx.
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_json())).into_response()
    }
}
