use rusqlite::Connection;

use crate::error::Result;

/// Initialise the task schema in `conn`.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id                       TEXT    NOT NULL PRIMARY KEY,
            title                    TEXT    NOT NULL,
            description              TEXT    NOT NULL DEFAULT '',
            due_date                 TEXT    NOT NULL,   -- YYYY-MM-DD, reference timezone
            due_time                 TEXT    NOT NULL,   -- HH:MM:SS, reference timezone
            priority                 TEXT    NOT NULL DEFAULT 'Medium',
            status                   TEXT    NOT NULL DEFAULT 'Not Started',
            created_at               TEXT    NOT NULL,
            attachment_required      INTEGER NOT NULL DEFAULT 0,
            text_submission_required INTEGER NOT NULL DEFAULT 0,
            submission_text          TEXT    NOT NULL DEFAULT '',
            assigned_to              TEXT    NOT NULL DEFAULT '[]',
            tagged_members           TEXT    NOT NULL DEFAULT '[]',
            repeat_config            TEXT    NOT NULL DEFAULT '{"type":"None"}',
            occurrence_count         INTEGER NOT NULL DEFAULT 0,
            attachments              TEXT    NOT NULL DEFAULT '[]',
            generator_task_id        TEXT                -- NULL for the first task of a series
        ) STRICT;

        -- Bootstrap scan: WHERE due_date >= ?
        CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks (due_date);
        -- Series lookups: WHERE id = ? OR generator_task_id = ?
        CREATE INDEX IF NOT EXISTS idx_tasks_generator ON tasks (generator_task_id);
        "#,
    )?;
    Ok(())
}
