use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{error::Result, types::Task};

/// Durable-storage operations the recurring scheduler depends on.
///
/// Implementations must be `Send + Sync` so a single store can be shared
/// between the scheduler engine and the request handlers.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fetch one task, `None` if no row has this ID.
    async fn find_task(&self, id: &str) -> Result<Option<Task>>;

    /// All tasks whose repeat rule is `Custom` and whose due date is on or after `since`.
    async fn find_tasks_with_active_custom_repeat(&self, since: NaiveDate) -> Result<Vec<Task>>;

    /// Insert `successor` and retire `retire_id` (repeat rule set to `None`) atomically.
    ///
    /// Either both writes are committed or neither is. Fails with
    /// [`Conflict`](crate::TaskStoreError::Conflict) when `retire_id` no longer
    /// exists or is no longer `Custom`.
    async fn generate_successor(&self, successor: &Task, retire_id: &str) -> Result<()>;
}
