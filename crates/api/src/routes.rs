//! Route table and shared handler state.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use opsboard_core::traits::QueueClient;
use opsboard_domain::JobTemplateService;
use opsboard_infrastructure::{CleanupService, QueueControlService, TtlCache};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub templates: Arc<JobTemplateService>,
    pub queue_client: Arc<dyn QueueClient>,
    pub control: Arc<QueueControlService>,
    pub cleanup: Arc<CleanupService>,
    pub cache: Arc<TtlCache>,
}

pub fn create_router(state: AppState) -> Router {
    let jobs = Router::new()
        .route(
            "/templates",
            post(handlers::templates::create).get(handlers::templates::list),
        )
        .route(
            "/templates/{id}",
            get(handlers::templates::get_by_id)
                .put(handlers::templates::update)
                .delete(handlers::templates::remove),
        )
        .route("/template-types", get(handlers::templates::template_types));

    let queue = Router::new()
        .route("/tasks", post(handlers::queue::submit_task))
        .route(
            "/tasks/{id}",
            get(handlers::queue::task_status).delete(handlers::queue::cancel_task),
        )
        .route("/workers", get(handlers::queue::workers))
        .route("/queues", get(handlers::queue::queues))
        .route("/queues/purge-all", delete(handlers::queue::purge_all))
        .route("/queues/{name}/purge", delete(handlers::queue::purge_queue))
        .route("/schedules", get(handlers::queue::schedules))
        .route("/beat/status", get(handlers::queue::beat_status))
        .route("/status", get(handlers::queue::overall_status))
        .route("/config", get(handlers::queue::config_snapshot))
        .route(
            "/settings",
            get(handlers::queue::get_settings).put(handlers::queue::update_settings),
        )
        .route("/cleanup", post(handlers::cleanup::trigger))
        .route("/cleanup/stats", get(handlers::cleanup::stats));

    let cache = Router::new()
        .route("/stats", get(handlers::cache::stats))
        .route("/entries", get(handlers::cache::entries))
        .route("/namespace/{ns}", get(handlers::cache::namespace_info))
        .route("/performance", get(handlers::cache::performance))
        .route("/clear", post(handlers::cache::clear))
        .route("/cleanup", post(handlers::cache::cleanup));

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .nest(
            "/api",
            Router::new()
                .nest("/jobs", jobs)
                .nest("/queue", queue)
                .nest("/cache", cache),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
