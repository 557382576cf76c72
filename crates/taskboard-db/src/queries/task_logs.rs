//! Query functions for the append-only `task_logs` table.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::StoreResult;
use crate::models::{TaskLog, TaskLogEventType};

/// Append a single log entry for a task. Logs are never updated or
/// deleted individually; they are dropped only when their task (and in
/// turn its workspace) is deleted, via the cascading foreign key.
pub async fn append_task_log(
    pool: &SqlitePool,
    task_id: &str,
    event_type: TaskLogEventType,
    payload: &str,
    tool_name: Option<&str>,
) -> StoreResult<TaskLog> {
    let now = Utc::now();
    let id = sqlx::query(
        "INSERT INTO task_logs (task_id, event_type, payload, tool_name, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(task_id)
    .bind(event_type)
    .bind(payload)
    .bind(tool_name)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(TaskLog {
        id,
        task_id: task_id.to_string(),
        event_type,
        payload: payload.to_string(),
        tool_name: tool_name.map(str::to_string),
        created_at: now,
    })
}

/// Fetch a task's log, oldest first, optionally bounded to the most
/// recent `limit` entries (tail semantics: when `limit` is set, this
/// returns the last `limit` entries still in chronological order).
pub async fn get_task_log(pool: &SqlitePool, task_id: &str, limit: Option<i64>) -> StoreResult<Vec<TaskLog>> {
    let rows = match limit {
        Some(limit) => {
            sqlx::query_as::<_, TaskLog>(
                "SELECT * FROM (\
                     SELECT * FROM task_logs WHERE task_id = ? ORDER BY id DESC LIMIT ?\
                 ) ORDER BY id ASC",
            )
            .bind(task_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, TaskLog>("SELECT * FROM task_logs WHERE task_id = ? ORDER BY id ASC")
                .bind(task_id)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}
