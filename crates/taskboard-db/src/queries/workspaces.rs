//! Query functions for the `workspaces` table.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Workspace, WorkspaceStatus};

/// Fields accepted by a workspace update. `None` leaves the column
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct WorkspacePatch {
    pub name: Option<String>,
    pub goal: Option<String>,
    pub context: Option<String>,
    pub max_concurrent: Option<i64>,
    pub status: Option<WorkspaceStatus>,
}

/// Insert a new workspace row. Starts `active` with no summary.
pub async fn create_workspace(
    pool: &SqlitePool,
    name: &str,
    goal: &str,
    context: &str,
    max_concurrent: i64,
    work_dir: &str,
) -> StoreResult<Workspace> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO workspaces \
         (id, name, goal, context, max_concurrent, work_dir, status, summary, summary_generated, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'active', NULL, 0, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(goal)
    .bind(context)
    .bind(max_concurrent)
    .bind(work_dir)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(StoreError::from_insert_error)?;

    get_workspace(pool, id)
        .await?
        .ok_or_else(|| StoreError::not_found("workspace", id))
}

pub async fn get_workspace(pool: &SqlitePool, id: Uuid) -> StoreResult<Option<Workspace>> {
    let workspace = sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(workspace)
}

/// List workspaces newest-first.
pub async fn list_workspaces(pool: &SqlitePool) -> StoreResult<Vec<Workspace>> {
    let workspaces =
        sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces ORDER BY created_at DESC")
            .fetch_all(pool)
            .await?;
    Ok(workspaces)
}

/// Apply a partial update. Returns `NotFound` if no row matches `id`.
pub async fn update_workspace(
    pool: &SqlitePool,
    id: Uuid,
    patch: &WorkspacePatch,
) -> StoreResult<Workspace> {
    let current = get_workspace(pool, id)
        .await?
        .ok_or_else(|| StoreError::not_found("workspace", id))?;

    let name = patch.name.clone().unwrap_or(current.name);
    let goal = patch.goal.clone().unwrap_or(current.goal);
    let context = patch.context.clone().unwrap_or(current.context);
    let max_concurrent = patch.max_concurrent.unwrap_or(current.max_concurrent);
    let status = patch.status.unwrap_or(current.status);
    let now = Utc::now();

    sqlx::query(
        "UPDATE workspaces \
         SET name = ?, goal = ?, context = ?, max_concurrent = ?, status = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&name)
    .bind(&goal)
    .bind(&context)
    .bind(max_concurrent)
    .bind(status)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    get_workspace(pool, id)
        .await?
        .ok_or_else(|| StoreError::not_found("workspace", id))
}

/// Write the workspace summary and mark `summary_generated`. Idempotent
/// in the sense that it always overwrites, but callers check the flag
/// first to avoid re-synthesising.
pub async fn set_summary(pool: &SqlitePool, id: Uuid, summary: &str) -> StoreResult<()> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE workspaces SET summary = ?, summary_generated = 1, updated_at = ? WHERE id = ?",
    )
    .bind(summary)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("workspace", id));
    }
    Ok(())
}

/// Clear the completion flag, e.g. when new tasks are added to an
/// already-completed workspace so a later completion re-synthesises.
pub async fn clear_summary_generated(pool: &SqlitePool, id: Uuid) -> StoreResult<()> {
    sqlx::query("UPDATE workspaces SET summary_generated = 0, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a workspace. Cascades to its tasks and their logs via the
/// foreign-key constraints. Returns whether a row existed.
pub async fn delete_workspace(pool: &SqlitePool, id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM workspaces WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
