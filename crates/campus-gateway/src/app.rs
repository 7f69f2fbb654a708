use axum::{
    routing::{delete, get, post},
    Router,
};
use campus_core::CampusConfig;
use campus_scheduler::SchedulerHandle;
use campus_tasks::SqliteTaskStore;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::http::{health, tasks};

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: CampusConfig,
    pub store: SqliteTaskStore,
    /// `None` when `scheduler.enabled = false`.
    pub scheduler: Option<SchedulerHandle>,
}

impl AppState {
    pub fn new(
        config: CampusConfig,
        store: SqliteTaskStore,
        scheduler: Option<SchedulerHandle>,
    ) -> Self {
        Self {
            config,
            store,
            scheduler,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/series/{id}", delete(tasks::delete_series))
        .route("/api/scheduler/rehydrate", post(tasks::rehydrate))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
