//! Cache inspection and invalidation endpoints.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::response::ApiResponse;
use crate::routes::AppState;

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::success(state.cache.stats().await)
}

#[derive(Debug, Default, Deserialize)]
pub struct EntriesQuery {
    #[serde(default)]
    pub include_expired: bool,
}

pub async fn entries(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> impl IntoResponse {
    ApiResponse::success(state.cache.get_entries(query.include_expired).await)
}

pub async fn namespace_info(
    State(state): State<AppState>,
    Path(ns): Path<String>,
) -> impl IntoResponse {
    ApiResponse::success(state.cache.get_namespace_info(&ns).await)
}

pub async fn performance(State(state): State<AppState>) -> impl IntoResponse {
    ApiResponse::success(state.cache.get_performance_metrics().await)
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearRequest {
    pub namespace: Option<String>,
}

pub async fn clear(
    State(state): State<AppState>,
    payload: Option<Json<ClearRequest>>,
) -> impl IntoResponse {
    let namespace = payload.and_then(|Json(p)| p.namespace);
    let (removed, message) = match namespace {
        Some(ns) => {
            let removed = state.cache.clear_namespace(&ns).await;
            (removed, format!("Cleared namespace '{ns}'"))
        }
        None => {
            let removed = state.cache.clear_all().await;
            (removed, "Cleared entire cache".to_string())
        }
    };
    ApiResponse::success_with_message(json!({ "removed": removed }), message)
}

pub async fn cleanup(State(state): State<AppState>) -> impl IntoResponse {
    let removed = state.cache.cleanup_expired().await;
    ApiResponse::success(json!({ "removed": removed }))
}
