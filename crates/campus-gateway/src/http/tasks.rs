//! Task endpoints under `/api/tasks`.
//!
//! Every mutation cancels the task's pending timer before touching the row
//! and re-schedules from the stored state afterwards, so a timer never fires
//! against data the handler is about to change.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use campus_core::CampusError;
use campus_tasks::{NewTask, Task, TaskStore, TaskUpdate};

use super::error::ApiError;
use crate::app::AppState;

/// GET /api/tasks
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.store.list_tasks().await?))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .store
        .find_task(&id)
        .await?
        .ok_or_else(|| CampusError::NotFound {
            what: format!("task {id}"),
        })?;
    Ok(Json(task))
}

/// POST /api/tasks
///
/// Generates an id when none is given. A `Custom` task is scheduled once stored.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::invalid_input("title cannot be empty"));
    }
    let task = req.into_task(Utc::now().to_rfc3339());
    state.store.insert_task(&task).await?;
    info!(task_id = %task.id, repeating = task.repeat_config.is_custom(), "task created");

    schedule_if_repeating(&state, &task).await;
    Ok((StatusCode::CREATED, Json(task)))
}

/// PUT /api/tasks/{id}
///
/// Partial update. The stored result decides whether a timer is re-armed.
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<Task>, ApiError> {
    if update.is_empty() {
        return Err(ApiError::invalid_input("no fields to update"));
    }
    if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::invalid_input("title cannot be empty"));
    }

    cancel_pending(&state, &id).await;
    let result = state.store.update_task(&id, update).await;
    // Re-arm from whatever is stored now, including after a failed update.
    let stored = reschedule_from_store(&state, &id).await;

    let updated = result?;
    info!(task_id = %id, "task updated");
    Ok(Json(stored.unwrap_or(updated)))
}

/// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    cancel_pending(&state, &id).await;
    state.store.delete_task(&id).await?;
    Ok(Json(json!({ "deleted": id })))
}

/// DELETE /api/tasks/series/{id}
///
/// `id` is the first task of the series. Removes it and every task it generated.
pub async fn delete_series(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ids = state.store.series_task_ids(&id).await?;
    if ids.is_empty() {
        return Err(CampusError::NotFound {
            what: format!("task series {id}"),
        }
        .into());
    }
    for task_id in &ids {
        cancel_pending(&state, task_id).await;
    }
    let count = state.store.delete_series(&id).await?;
    Ok(Json(json!({ "seriesId": id, "deleted": count })))
}

/// POST /api/scheduler/rehydrate
///
/// Drops every timer and rebuilds them from the store.
pub async fn rehydrate(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let handle = state
        .scheduler
        .as_ref()
        .ok_or_else(|| CampusError::Scheduler("scheduler is disabled".into()))?;
    let armed = handle.initialize().await?;
    Ok(Json(json!({ "armed": armed })))
}

// --- scheduler glue ----------------------------------------------------------

/// Cancel the task's timer and wait for the engine to confirm.
///
/// Failure is logged only; the mutation goes ahead regardless.
async fn cancel_pending(state: &AppState, task_id: &str) {
    let Some(handle) = &state.scheduler else {
        return;
    };
    if let Err(e) = handle.cancel(task_id).await {
        warn!(task_id = %task_id, error = %e, "could not cancel scheduled occurrence");
    }
}

async fn schedule_if_repeating(state: &AppState, task: &Task) {
    let Some(handle) = &state.scheduler else {
        return;
    };
    if !task.repeat_config.is_custom() {
        return;
    }
    match handle.schedule(task).await {
        Ok(outcome) => info!(task_id = %task.id, ?outcome, "repeating task scheduled"),
        Err(e) => warn!(task_id = %task.id, error = %e, "could not schedule repeating task"),
    }
}

/// Re-read the task and schedule it if it is still `Custom`.
async fn reschedule_from_store(state: &AppState, task_id: &str) -> Option<Task> {
    match state.store.find_task(task_id).await {
        Ok(Some(task)) => {
            schedule_if_repeating(state, &task).await;
            Some(task)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "could not re-read task after update");
            None
        }
    }
}
