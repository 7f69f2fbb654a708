//! `campus-tasks`: the task data model and its durable store.
//!
//! # Overview
//!
//! A [`Task`] is one occurrence of possibly-repeating work. Repeating series
//! are chains of tasks linked through `generator_task_id` to the first task
//! of the series.
//!
//! The [`TaskStore`] trait is the narrow surface the recurring scheduler
//! depends on; [`SqliteTaskStore`] implements it on SQLite and also carries
//! the CRUD operations used by the HTTP layer.

pub mod db;
pub mod error;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::{Result, TaskStoreError};
pub use sqlite::SqliteTaskStore;
pub use store::TaskStore;
pub use types::{
    Attachment, EndCondition, Frequency, NewTask, Priority, RepeatConfig, Task, TaskStatus,
    TaskUpdate,
};
