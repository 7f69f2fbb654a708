use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use campus_core::CampusError;
use campus_scheduler::SchedulerError;
use campus_tasks::TaskStoreError;

/// JSON error body: `{"error": "...", "code": "NOT_FOUND"}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// Error returned by every task handler.
#[derive(Debug)]
pub struct ApiError(pub CampusError);

impl ApiError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self(CampusError::InvalidInput(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CampusError::NotFound { .. } => StatusCode::NOT_FOUND,
            CampusError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CampusError::Conflict(_) => StatusCode::CONFLICT,
            CampusError::Scheduler(_) => StatusCode::SERVICE_UNAVAILABLE,
            CampusError::Config(_)
            | CampusError::Database(_)
            | CampusError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: self.0.code(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CampusError> for ApiError {
    fn from(e: CampusError) -> Self {
        Self(e)
    }
}

impl From<TaskStoreError> for ApiError {
    fn from(e: TaskStoreError) -> Self {
        let inner = match e {
            TaskStoreError::NotFound { id } => CampusError::NotFound {
                what: format!("task {id}"),
            },
            TaskStoreError::Conflict { id } => {
                CampusError::Conflict(format!("task {id} is no longer repeating"))
            }
            TaskStoreError::Database(rusqlite::Error::SqliteFailure(f, _))
                if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                CampusError::Conflict("a task with this id already exists".into())
            }
            TaskStoreError::Database(e) => CampusError::Database(e.to_string()),
            TaskStoreError::Serialization(e) => CampusError::Serialization(e),
            TaskStoreError::InvalidData(msg) => CampusError::Database(msg),
            TaskStoreError::Unavailable(msg) => CampusError::Database(msg),
        };
        Self(inner)
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Store(store) => store.into(),
            SchedulerError::EngineStopped => Self(CampusError::Scheduler(
                "scheduler engine is not running".into(),
            )),
        }
    }
}
