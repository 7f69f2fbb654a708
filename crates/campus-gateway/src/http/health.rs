use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check plus scheduler status.
///
/// `armed` is `null` when the scheduler is disabled or not responding.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let armed = match &state.scheduler {
        Some(handle) => handle.armed().await.ok().map(|ids| ids.len()),
        None => None,
    };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "scheduler": {
            "enabled": state.scheduler.is_some(),
            "armed": armed,
            "utcOffsetMinutes": state.config.scheduler.utc_offset_minutes,
        },
    }))
}
