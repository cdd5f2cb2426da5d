use axum::response::IntoResponse;
use serde_json::json;

use crate::response::ApiResponse;

pub async fn root() -> impl IntoResponse {
    ApiResponse::success(json!({
        "service": "opsboard",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health() -> impl IntoResponse {
    ApiResponse::success(json!({ "status": "healthy" }))
}
