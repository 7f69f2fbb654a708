use thiserror::Error;

/// Errors that can occur while reading or writing tasks.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No task with the given ID exists in the store.
    #[error("task not found: {id}")]
    NotFound { id: String },

    /// The task to retire is gone or no longer an active repeating occurrence.
    #[error("task {id} is no longer an active repeating occurrence")]
    Conflict { id: String },

    /// Caller-supplied or stored data failed validation.
    #[error("invalid task data: {0}")]
    InvalidData(String),

    /// The connection could not be reached (poisoned lock, lost worker thread).
    #[error("task store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, TaskStoreError>;
