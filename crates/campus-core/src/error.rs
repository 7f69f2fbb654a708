use thiserror::Error;

#[derive(Debug, Error)]
pub enum CampusError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CampusError {
    /// Short error code string sent to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            CampusError::Config(_) => "CONFIG_ERROR",
            CampusError::Database(_) => "DATABASE_ERROR",
            CampusError::NotFound { .. } => "NOT_FOUND",
            CampusError::InvalidInput(_) => "INVALID_INPUT",
            CampusError::Conflict(_) => "CONFLICT",
            CampusError::Scheduler(_) => "SCHEDULER_ERROR",
            CampusError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CampusError>;
