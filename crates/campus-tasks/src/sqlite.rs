use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{types::Type, Connection, OptionalExtension};
use tracing::{debug, info, instrument, warn};

use crate::{
    db::init_db,
    error::{Result, TaskStoreError},
    store::TaskStore,
    types::{
        format_due_date, format_due_time, parse_due_date, parse_due_time, RepeatConfig, Task,
        TaskUpdate,
    },
};

const TASK_COLUMNS: &str = "id, title, description, due_date, due_time, priority, status,
     created_at, attachment_required, text_submission_required, submission_text,
     assigned_to, tagged_members, repeat_config, occurrence_count, attachments,
     generator_task_id";

/// SQLite-backed task store.
///
/// Wraps a single connection in a `Mutex`; every call runs on the blocking
/// thread pool so async callers never stall on SQLite I/O.
#[derive(Clone)]
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A fresh private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| TaskStoreError::Unavailable("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| TaskStoreError::Unavailable(e.to_string()))?
    }

    /// Insert a new task row.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let task = task.clone();
        self.with_conn(move |conn| insert_row(conn, &task)).await?;
        debug!("task inserted");
        Ok(())
    }

    /// All tasks, newest first, then by due date.
    #[instrument(skip(self))]
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, due_date ASC"
            ))?;
            let rows = stmt.query_map([], row_to_task)?;
            Ok(collect_readable(rows))
        })
        .await
    }

    /// Apply a partial update and return the stored result.
    #[instrument(skip(self, update), fields(task_id = %id))]
    pub async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Task> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut task = select_task(&tx, &id)?.ok_or(TaskStoreError::NotFound { id })?;
            update.apply_to(&mut task);
            write_row(&tx, &task)?;
            tx.commit()?;
            Ok(task)
        })
        .await
    }

    /// Delete one task. Returns `NotFound` if no row is deleted.
    #[instrument(skip(self), fields(task_id = %id))]
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute("DELETE FROM tasks WHERE id = ?1", [&id])?;
            if n == 0 {
                return Err(TaskStoreError::NotFound { id });
            }
            info!(task_id = %id, "task deleted");
            Ok(())
        })
        .await
    }

    /// IDs of every task in the series headed by `generator_id`, head included.
    #[instrument(skip(self))]
    pub async fn series_task_ids(&self, generator_id: &str) -> Result<Vec<String>> {
        let generator_id = generator_id.to_string();
        self.with_conn(move |conn| select_series_ids(conn, &generator_id))
            .await
    }

    /// Delete a whole series in one transaction. Returns the number of rows removed.
    #[instrument(skip(self))]
    pub async fn delete_series(&self, generator_id: &str) -> Result<usize> {
        let generator_id = generator_id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "DELETE FROM tasks WHERE id = ?1 OR generator_task_id = ?1",
                [&generator_id],
            )?;
            if n == 0 {
                return Err(TaskStoreError::NotFound { id: generator_id });
            }
            tx.commit()?;
            info!(series_id = %generator_id, count = n, "task series deleted");
            Ok(n)
        })
        .await
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    #[instrument(skip(self), fields(task_id = %id))]
    async fn find_task(&self, id: &str) -> Result<Option<Task>> {
        let id = id.to_string();
        self.with_conn(move |conn| select_task(conn, &id)).await
    }

    #[instrument(skip(self))]
    async fn find_tasks_with_active_custom_repeat(&self, since: NaiveDate) -> Result<Vec<Task>> {
        let since = format_due_date(since);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE json_extract(repeat_config, '$.type') = 'Custom' AND due_date >= ?1
                 ORDER BY due_date, due_time"
            ))?;
            let rows = stmt.query_map([&since], row_to_task)?;
            Ok(collect_readable(rows))
        })
        .await
    }

    #[instrument(skip(self, successor), fields(successor_id = %successor.id))]
    async fn generate_successor(&self, successor: &Task, retire_id: &str) -> Result<()> {
        let successor = successor.clone();
        let retire_id = retire_id.to_string();
        let retired = serde_json::to_string(&RepeatConfig::None)?;
        self.with_conn(move |conn| {
            // Dropping `tx` without commit rolls back both statements.
            let tx = conn.transaction()?;
            insert_row(&tx, &successor)?;
            let n = tx.execute(
                "UPDATE tasks SET repeat_config = ?1
                 WHERE id = ?2 AND json_extract(repeat_config, '$.type') = 'Custom'",
                rusqlite::params![retired, retire_id],
            )?;
            if n == 0 {
                return Err(TaskStoreError::Conflict { id: retire_id });
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

// --- private helpers -------------------------------------------------------

fn select_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        [id],
        row_to_task,
    )
    .optional()
    .map_err(|e| match e {
        rusqlite::Error::FromSqlConversionFailure(idx, _, err) => {
            TaskStoreError::InvalidData(format!("task {id}, column {idx}: {err}"))
        }
        other => other.into(),
    })
}

fn select_series_ids(conn: &Connection, generator_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM tasks WHERE id = ?1 OR generator_task_id = ?1")?;
    let ids = stmt
        .query_map([generator_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

fn insert_row(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO tasks ({TASK_COLUMNS})
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)"
        ),
        rusqlite::params![
            task.id,
            task.title,
            task.description,
            format_due_date(task.due_date),
            format_due_time(task.due_time),
            task.priority.to_string(),
            task.status.to_string(),
            task.created_at,
            task.attachment_required,
            task.text_submission_required,
            task.submission_text,
            serde_json::to_string(&task.assigned_to)?,
            serde_json::to_string(&task.tagged_members)?,
            serde_json::to_string(&task.repeat_config)?,
            task.occurrence_count,
            serde_json::to_string(&task.attachments)?,
            task.generator_task_id,
        ],
    )?;
    Ok(())
}

/// Overwrite every mutable column of an existing row.
fn write_row(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET title=?1, description=?2, due_date=?3, due_time=?4, priority=?5,
              status=?6, attachment_required=?7, text_submission_required=?8,
              submission_text=?9, assigned_to=?10, tagged_members=?11, repeat_config=?12,
              occurrence_count=?13, attachments=?14
         WHERE id=?15",
        rusqlite::params![
            task.title,
            task.description,
            format_due_date(task.due_date),
            format_due_time(task.due_time),
            task.priority.to_string(),
            task.status.to_string(),
            task.attachment_required,
            task.text_submission_required,
            task.submission_text,
            serde_json::to_string(&task.assigned_to)?,
            serde_json::to_string(&task.tagged_members)?,
            serde_json::to_string(&task.repeat_config)?,
            task.occurrence_count,
            serde_json::to_string(&task.attachments)?,
            task.id,
        ],
    )?;
    Ok(())
}

/// Keep every row that maps cleanly; log and skip the rest.
fn collect_readable<I>(rows: I) -> Vec<Task>
where
    I: Iterator<Item = rusqlite::Result<Task>>,
{
    rows.filter_map(|r| match r {
        Ok(task) => Some(task),
        Err(e) => {
            warn!(error = %e, "skipping unreadable task row");
            None
        }
    })
    .collect()
}

fn conversion_failure<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_failure(idx, e))
}

/// Map a SQLite row (selected with `TASK_COLUMNS`) to a `Task`.
fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let due_date: String = row.get(3)?;
    let due_time: String = row.get(4)?;
    let priority: String = row.get(5)?;
    let status: String = row.get(6)?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        due_date: parse_due_date(&due_date).map_err(|e| conversion_failure(3, e))?,
        due_time: parse_due_time(&due_time).map_err(|e| conversion_failure(4, e))?,
        priority: priority.parse().map_err(|e| conversion_failure(5, e))?,
        status: status.parse().map_err(|e| conversion_failure(6, e))?,
        created_at: row.get(7)?,
        attachment_required: row.get(8)?,
        text_submission_required: row.get(9)?,
        submission_text: row.get(10)?,
        assigned_to: json_column(row, 11)?,
        tagged_members: json_column(row, 12)?,
        repeat_config: json_column(row, 13)?,
        occurrence_count: row.get(14)?,
        attachments: json_column(row, 15)?,
        generator_task_id: row.get(16)?,
    })
}
