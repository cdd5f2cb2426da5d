//! Job template catalog endpoints.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use opsboard_core::OpsError;
use opsboard_domain::entities::{JobTemplateUpdate, NewJobTemplate};

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: Option<i64>,
    pub job_type: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<NewJobTemplate>,
) -> ApiResult<impl IntoResponse> {
    let created = state.templates.create(payload).await?;
    Ok(ApiResponse::success_with_message(
        created,
        "Template created",
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let templates = state
        .templates
        .list(query.owner_id, query.job_type.as_deref())
        .await?;
    Ok(ApiResponse::success(templates))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    match state.templates.get_by_id(id).await? {
        Some(template) => Ok(ApiResponse::success(template)),
        None => Err(ApiError(OpsError::not_found(format!("template {id}")))),
    }
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(fields): Json<JobTemplateUpdate>,
) -> ApiResult<impl IntoResponse> {
    match state.templates.update(id, fields).await? {
        Some(template) => Ok(ApiResponse::success_with_message(
            template,
            "Template updated",
        )),
        None => Err(ApiError(OpsError::not_found(format!("template {id}")))),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    if state.templates.delete(id).await? {
        Ok(ApiResponse::message_only("Template deleted"))
    } else {
        Err(ApiError(OpsError::not_found(format!("template {id}"))))
    }
}

pub async fn template_types(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::success(state.templates.job_types().to_vec())
}
