//! Queue control-plane endpoints.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use opsboard_core::models::TaskMessage;
use opsboard_core::OpsError;
use opsboard_infrastructure::control::QueueSettingsUpdate;

use crate::error::{degrade, ApiResult};
use crate::response::ApiResponse;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub job_type: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub schedule_id: Option<i64>,
    #[serde(default)]
    pub credential_id: Option<i64>,
    #[serde(default)]
    pub job_parameters: Option<Value>,
    #[serde(default)]
    pub target_devices: Option<Vec<String>>,
    #[serde(default)]
    pub template: Option<Value>,
    #[serde(default)]
    pub job_run_id: Option<i64>,
}

pub async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<SubmitTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.job_type.trim().is_empty() {
        return Err(OpsError::validation("job_type must not be empty").into());
    }
    let queue = request.queue.unwrap_or_else(|| "default".to_string());
    let settings = state.control.get_settings().await?;
    if !settings.queues.iter().any(|q| q.name == queue) {
        return Err(OpsError::validation(format!("unknown queue '{queue}'")).into());
    }

    let mut message = TaskMessage::new(request.job_type, queue);
    message.schedule_id = request.schedule_id;
    message.credential_id = request.credential_id;
    message.job_parameters = request.job_parameters.unwrap_or(Value::Null);
    message.target_devices = request.target_devices.unwrap_or_default();
    message.template = request.template;
    message.job_run_id = request.job_run_id;

    let task_id = state.queue_client.submit(message).await?;
    Ok(ApiResponse::success_with_message(
        json!({ "task_id": task_id, "status": "queued" }),
        "Task submitted",
    ))
}

pub async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    degrade(state.queue_client.status(&id).await)
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    #[serde(default)]
    pub terminate: bool,
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CancelQuery>,
) -> ApiResult<impl IntoResponse> {
    state.queue_client.cancel(&id, query.terminate).await?;
    Ok(ApiResponse::message_only(format!("Task {id} revoked")))
}

pub async fn workers(State(state): State<AppState>) -> ApiResult<Response> {
    degrade(state.control.list_workers().await)
}

pub async fn queues(State(state): State<AppState>) -> ApiResult<Response> {
    degrade(state.control.list_queues().await)
}

pub async fn purge_queue(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let purged = state.control.purge_queue(&name).await?;
    Ok(ApiResponse::success_with_message(
        json!({ "queue": name, "purged": purged }),
        format!("Purged {purged} tasks"),
    ))
}

pub async fn purge_all(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let report = state.control.purge_all_queues().await?;
    Ok(ApiResponse::success(report))
}

pub async fn schedules(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::success(state.control.list_schedules())
}

pub async fn beat_status(State(state): State<AppState>) -> ApiResult<Response> {
    degrade(state.control.beat_status().await)
}

pub async fn overall_status(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::success(state.control.overall_status().await)
}

pub async fn config_snapshot(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(state.control.config_snapshot()?))
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Response> {
    degrade(state.control.get_settings().await)
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<QueueSettingsUpdate>,
) -> ApiResult<impl IntoResponse> {
    let settings = state.control.update_settings(update).await?;
    Ok(ApiResponse::success_with_message(
        settings,
        "Settings updated",
    ))
}
