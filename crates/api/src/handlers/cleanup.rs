//! Result-store cleanup endpoints.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::{degrade, ApiResult};
use crate::response::ApiResponse;
use crate::routes::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    pub retention_hours: Option<i64>,
}

pub async fn trigger(
    State(state): State<AppState>,
    payload: Option<Json<CleanupRequest>>,
) -> ApiResult<impl IntoResponse> {
    let retention = payload.and_then(|Json(p)| p.retention_hours);
    let task_id = state.cleanup.run_cleanup(retention).await?;
    Ok(ApiResponse::success_with_message(
        json!({ "task_id": task_id, "status": "queued" }),
        "Cleanup task submitted",
    ))
}

pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<CleanupRequest>,
) -> ApiResult<Response> {
    degrade(state.cleanup.compute_stats(query.retention_hours).await)
}
