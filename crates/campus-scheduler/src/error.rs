use campus_tasks::TaskStoreError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The task store failed (bootstrap scan, fire transaction, re-fetch).
    #[error("task store error: {0}")]
    Store(#[from] TaskStoreError),

    /// The engine loop is not running, so the command could not be delivered.
    #[error("scheduler engine is not running")]
    EngineStopped,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
