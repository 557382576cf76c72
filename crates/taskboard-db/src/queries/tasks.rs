//! Query functions for the `tasks` table.
//!
//! Status transitions use an optimistic-lock compare-and-swap: every
//! write includes `AND status = <expected>` in its `WHERE` clause and
//! reports back whether a row was actually touched, so a caller racing
//! another writer observes zero rows affected instead of silently
//! clobbering a status it didn't expect.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{StatusCounts, Task, TaskRow, TaskStatus};

const TASK_COLUMNS: &str = "id, workspace_id, title, description, prompt, priority, status, \
     depends_on, tags, max_retries, retry_count, assigned_session, result, error, \
     created_at, started_at, completed_at";

/// Fields accepted by a plain task edit (not a status transition).
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub prompt: Option<String>,
    pub priority: Option<i64>,
    pub tags: Option<Vec<String>>,
}

/// A single task to be materialized as part of a plan. `depends_on_indices`
/// refers to other entries in the same slice by position.
#[derive(Debug, Clone)]
pub struct NewTaskSpec {
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub priority: i64,
    pub depends_on_indices: Vec<usize>,
    pub tags: Vec<String>,
    pub max_retries: i64,
}

async fn fetch_one_task(pool: &SqlitePool, id: &str) -> StoreResult<Option<Task>> {
    let row = sqlx::query_as::<_, TaskRow>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(TaskRow::decode).transpose()
}

pub async fn get_task(pool: &SqlitePool, id: &str) -> StoreResult<Option<Task>> {
    fetch_one_task(pool, id).await
}

/// Create a single, freestanding task (not part of a plan). The caller
/// decides the initial status -- `ready` if it has no dependencies and
/// the caller wants it immediately schedulable, `backlog` otherwise.
#[allow(clippy::too_many_arguments)]
pub async fn create_task(
    pool: &SqlitePool,
    workspace_id: Uuid,
    title: &str,
    description: &str,
    prompt: &str,
    priority: i64,
    depends_on: &[String],
    tags: &[String],
    max_retries: i64,
    initial_status: TaskStatus,
) -> StoreResult<Task> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let depends_on_json = serde_json::to_string(depends_on).expect("Vec<String> always serializes");
    let tags_json = serde_json::to_string(tags).expect("Vec<String> always serializes");

    sqlx::query(
        "INSERT INTO tasks \
         (id, workspace_id, title, description, prompt, priority, status, depends_on, tags, \
          max_retries, retry_count, assigned_session, result, error, created_at, started_at, completed_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, NULL, NULL, ?, NULL, NULL)",
    )
    .bind(&id)
    .bind(workspace_id)
    .bind(title)
    .bind(description)
    .bind(prompt)
    .bind(priority)
    .bind(initial_status)
    .bind(&depends_on_json)
    .bind(&tags_json)
    .bind(max_retries)
    .bind(now)
    .execute(pool)
    .await
    .map_err(StoreError::from_insert_error)?;

    fetch_one_task(pool, &id)
        .await?
        .ok_or_else(|| StoreError::not_found("task", &id))
}

/// Atomically materialize a workspace plus all of its tasks from a
/// validated plan.
///
/// Task ids are deterministic: `"<workspace_id>-t<1-based index>"`. Each
/// task's `depends_on_indices` are mapped through that same scheme.
/// Dependency-free tasks start `ready`; everything else starts `backlog`.
/// Any insertion failure rolls back the whole transaction (the `tx` is
/// dropped without `commit()`).
pub async fn create_from_plan(
    pool: &SqlitePool,
    workspace_name: &str,
    goal: &str,
    context: &str,
    max_concurrent: i64,
    work_dir: &str,
    tasks: &[NewTaskSpec],
) -> StoreResult<(Uuid, Vec<Task>)> {
    let workspace_id = Uuid::new_v4();
    let now = Utc::now();

    let task_ids: Vec<String> = (1..=tasks.len()).map(|i| format!("{workspace_id}-t{i}")).collect();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO workspaces \
         (id, name, goal, context, max_concurrent, work_dir, status, summary, summary_generated, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'active', NULL, 0, ?, ?)",
    )
    .bind(workspace_id)
    .bind(workspace_name)
    .bind(goal)
    .bind(context)
    .bind(max_concurrent)
    .bind(work_dir)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(StoreError::from_insert_error)?;

    for (i, spec) in tasks.iter().enumerate() {
        let id = &task_ids[i];
        let depends_on: Vec<String> = spec
            .depends_on_indices
            .iter()
            .map(|idx| task_ids[*idx].clone())
            .collect();
        let initial_status = if depends_on.is_empty() {
            TaskStatus::Ready
        } else {
            TaskStatus::Backlog
        };
        let depends_on_json = serde_json::to_string(&depends_on).expect("Vec<String> always serializes");
        let tags_json = serde_json::to_string(&spec.tags).expect("Vec<String> always serializes");

        sqlx::query(
            "INSERT INTO tasks \
             (id, workspace_id, title, description, prompt, priority, status, depends_on, tags, \
              max_retries, retry_count, assigned_session, result, error, created_at, started_at, completed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, NULL, NULL, ?, NULL, NULL)",
        )
        .bind(id)
        .bind(workspace_id)
        .bind(&spec.title)
        .bind(&spec.description)
        .bind(&spec.prompt)
        .bind(spec.priority)
        .bind(initial_status)
        .bind(&depends_on_json)
        .bind(&tags_json)
        .bind(spec.max_retries)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_insert_error)?;
    }

    tx.commit().await?;

    let mut created = Vec::with_capacity(task_ids.len());
    for id in &task_ids {
        let task = fetch_one_task(pool, id)
            .await?
            .ok_or_else(|| StoreError::not_found("task", id))?;
        created.push(task);
    }

    Ok((workspace_id, created))
}

/// List tasks, optionally filtered by workspace and/or status set.
/// Always ordered priority ascending, then created_at ascending.
pub async fn list_tasks(
    pool: &SqlitePool,
    workspace_id: Option<Uuid>,
    statuses: Option<&[TaskStatus]>,
) -> StoreResult<Vec<Task>> {
    if let Some(statuses) = statuses {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
    }

    let mut query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1 = 1");
    if workspace_id.is_some() {
        query.push_str(" AND workspace_id = ?");
    }
    if let Some(statuses) = statuses {
        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        query.push_str(&format!(" AND status IN ({placeholders})"));
    }
    query.push_str(" ORDER BY priority ASC, created_at ASC");

    let mut q = sqlx::query_as::<_, TaskRow>(&query);
    if let Some(workspace_id) = workspace_id {
        q = q.bind(workspace_id);
    }
    if let Some(statuses) = statuses {
        for status in statuses {
            q = q.bind(*status);
        }
    }
    let rows = q.fetch_all(pool).await?;
    rows.into_iter().map(TaskRow::decode).collect()
}

/// Ready-only tasks for a workspace, same ordering, bounded to `limit`.
pub async fn get_ready_tasks(pool: &SqlitePool, workspace_id: Uuid, limit: i64) -> StoreResult<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks \
         WHERE workspace_id = ? AND status = 'ready' \
         ORDER BY priority ASC, created_at ASC \
         LIMIT ?"
    ))
    .bind(workspace_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(TaskRow::decode).collect()
}

/// Bulk fetch by id. Missing ids are silently omitted.
pub async fn get_tasks_by_ids(pool: &SqlitePool, ids: &[String]) -> StoreResult<Vec<Task>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id IN ({placeholders})");
    let mut q = sqlx::query_as::<_, TaskRow>(&query);
    for id in ids {
        q = q.bind(id);
    }
    let rows = q.fetch_all(pool).await?;
    rows.into_iter().map(TaskRow::decode).collect()
}

/// A single grouped query returning per-status counts for a workspace.
pub async fn count_by_status(pool: &SqlitePool, workspace_id: Uuid) -> StoreResult<StatusCounts> {
    let rows: Vec<(TaskStatus, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) as cnt FROM tasks WHERE workspace_id = ? GROUP BY status")
            .bind(workspace_id)
            .fetch_all(pool)
            .await?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        counts.record(status, count);
    }
    Ok(counts)
}

/// Global per-status task counts across every workspace, used by the
/// Board's overview aggregation.
pub async fn global_count_by_status(pool: &SqlitePool) -> StoreResult<StatusCounts> {
    let rows: Vec<(TaskStatus, i64)> = sqlx::query_as("SELECT status, COUNT(*) as cnt FROM tasks GROUP BY status")
        .fetch_all(pool)
        .await?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        counts.record(status, count);
    }
    Ok(counts)
}

/// Tasks in `workspace_id` whose `depends_on` contains `task_id`.
///
/// Uses a `LIKE` prefilter on the raw JSON column and then decodes and
/// exact-matches each candidate, since an id can be a textual prefix of
/// another id and a substring match alone would over-select.
pub async fn get_dependents(pool: &SqlitePool, workspace_id: Uuid, task_id: &str) -> StoreResult<Vec<Task>> {
    let needle = format!("%\"{task_id}\"%");
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE workspace_id = ? AND depends_on LIKE ?"
    ))
    .bind(workspace_id)
    .bind(&needle)
    .fetch_all(pool)
    .await?;

    let mut dependents = Vec::new();
    for row in rows {
        let task = row.decode()?;
        if task.depends_on.iter().any(|d| d == task_id) {
            dependents.push(task);
        }
    }
    Ok(dependents)
}

/// Apply a non-status edit (title/description/prompt/priority/tags).
pub async fn update_task(pool: &SqlitePool, id: &str, patch: &TaskPatch) -> StoreResult<Task> {
    let current = fetch_one_task(pool, id).await?.ok_or_else(|| StoreError::not_found("task", id))?;

    let title = patch.title.clone().unwrap_or(current.title);
    let description = patch.description.clone().unwrap_or(current.description);
    let prompt = patch.prompt.clone().unwrap_or(current.prompt);
    let priority = patch.priority.unwrap_or(current.priority);
    let tags = patch.tags.clone().unwrap_or(current.tags);
    let tags_json = serde_json::to_string(&tags).expect("Vec<String> always serializes");

    sqlx::query("UPDATE tasks SET title = ?, description = ?, prompt = ?, priority = ?, tags = ? WHERE id = ?")
        .bind(&title)
        .bind(&description)
        .bind(&prompt)
        .bind(priority)
        .bind(&tags_json)
        .bind(id)
        .execute(pool)
        .await?;

    fetch_one_task(pool, id).await?.ok_or_else(|| StoreError::not_found("task", id))
}

pub async fn delete_task(pool: &SqlitePool, id: &str) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ?").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Promote a `backlog` task to `ready`. Returns `false` (not an error)
/// if the task was not in `backlog` -- a second, racing promotion is
/// simply a no-op.
pub async fn promote_to_ready(pool: &SqlitePool, id: &str) -> StoreResult<bool> {
    let result = sqlx::query("UPDATE tasks SET status = 'ready' WHERE id = ? AND status = 'backlog'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Coerce a `backlog` or `ready` task straight to `ready` (used by
/// `StartTask`, which is legal from either state).
pub async fn force_ready(pool: &SqlitePool, id: &str) -> StoreResult<bool> {
    let result = sqlx::query("UPDATE tasks SET status = 'ready' WHERE id = ? AND status IN ('backlog', 'ready')")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Transition `ready -> running`, stamping `started_at` and the assigned
/// session id.
pub async fn mark_running(pool: &SqlitePool, id: &str, session_id: &str) -> StoreResult<bool> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE tasks SET status = 'running', started_at = ?, assigned_session = ? \
         WHERE id = ? AND status = 'ready'",
    )
    .bind(now)
    .bind(session_id)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Transition `running -> done`, recording the result text.
pub async fn mark_done(pool: &SqlitePool, id: &str, result_text: &str) -> StoreResult<bool> {
    let now = Utc::now();
    let outcome = sqlx::query(
        "UPDATE tasks SET status = 'done', result = ?, completed_at = ?, assigned_session = NULL \
         WHERE id = ? AND status = 'running'",
    )
    .bind(result_text)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() > 0)
}

/// Transition `running -> failed`, recording the terminal error. Used
/// once the retry budget is exhausted.
pub async fn mark_failed(pool: &SqlitePool, id: &str, error: &str) -> StoreResult<bool> {
    let now = Utc::now();
    let outcome = sqlx::query(
        "UPDATE tasks SET status = 'failed', error = ?, completed_at = ?, assigned_session = NULL \
         WHERE id = ? AND status = 'running'",
    )
    .bind(error)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() > 0)
}

/// Transition `running -> ready` after a retryable failure: increments
/// `retry_count`, clears timing fields, and records the error.
pub async fn retry_from_running(pool: &SqlitePool, id: &str, error: &str) -> StoreResult<bool> {
    let outcome = sqlx::query(
        "UPDATE tasks SET status = 'ready', error = ?, retry_count = retry_count + 1, \
         started_at = NULL, completed_at = NULL, assigned_session = NULL \
         WHERE id = ? AND status = 'running'",
    )
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() > 0)
}

/// `RetryTask` lifecycle op: explicit `failed -> ready`, clearing error
/// and timing fields without touching `retry_count` (it was already
/// incremented when the task first failed).
pub async fn retry_from_failed(pool: &SqlitePool, id: &str) -> StoreResult<bool> {
    let outcome = sqlx::query(
        "UPDATE tasks SET status = 'ready', error = NULL, started_at = NULL, completed_at = NULL \
         WHERE id = ? AND status = 'failed'",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() > 0)
}

/// `CancelTask`: legal from any non-terminal status.
pub async fn cancel_task(pool: &SqlitePool, id: &str) -> StoreResult<bool> {
    let now = Utc::now();
    let outcome = sqlx::query(
        "UPDATE tasks SET status = 'cancelled', completed_at = ?, assigned_session = NULL \
         WHERE id = ? AND status IN ('backlog', 'ready', 'running', 'failed')",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(outcome.rows_affected() > 0)
}

/// Crash recovery: any task persisted as `running` is reset to `ready`
/// with its assigned session cleared. Returns the number recovered.
pub async fn recover_running_tasks(pool: &SqlitePool) -> StoreResult<u64> {
    let result = sqlx::query("UPDATE tasks SET status = 'ready', assigned_session = NULL WHERE status = 'running'")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
