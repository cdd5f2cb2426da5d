//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use opsboard_core::OpsError;
use thiserror::Error;
use tracing::error;

use crate::response::ApiResponse;

/// Wrapper giving `OpsError` an HTTP status. Write endpoints return this;
/// read endpoints degrade upstream failures to a 200 envelope instead (see
/// [`degrade`]).
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub OpsError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            OpsError::Validation(_) => StatusCode::BAD_REQUEST,
            OpsError::DuplicateName { .. } => StatusCode::CONFLICT,
            OpsError::NotFound { .. } => StatusCode::NOT_FOUND,
            OpsError::Upstream(_) | OpsError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
        }
        (status, Json(ApiResponse::failure(self.0.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Read-side degradation: a retryable upstream failure becomes a 200
/// `success: false` envelope; everything else keeps its error status.
pub fn degrade<T: serde::Serialize>(
    result: Result<T, OpsError>,
) -> Result<Response, ApiError> {
    match result {
        Ok(data) => Ok(ApiResponse::success(data).into_response()),
        Err(e) if e.is_retryable() => Ok(ApiResponse::failure(e.to_string()).into_response()),
        Err(e) => Err(ApiError(e)),
    }
}
