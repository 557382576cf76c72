//! The Board: the sole path by which external code mutates state (§4.4).
//!
//! Wraps the Store, enforces invariants, stamps timestamps/ids, writes
//! through, and broadcasts the corresponding event. Holds a
//! [`SchedulerHandle`] rather than a reference to the Scheduler itself,
//! breaking the cyclic dependency (§9 design note).

use std::sync::{Arc, RwLock};

use serde::Serialize;
use sqlx::SqlitePool;
use taskboard_db::models::{StatusCounts, Task, TaskStatus, Workspace, WorkspaceStatus};
use taskboard_db::queries::tasks::{self, TaskPatch};
use taskboard_db::queries::workspaces::{self, WorkspacePatch};
use uuid::Uuid;

use crate::bus::{BoardEvent, BoardEventKind, EventBus};
use crate::error::BoardError;
use crate::handle::{NoopSchedulerHandle, SchedulerHandle};
use crate::session::SessionManager;

/// Aggregated counts across every workspace (§4.4 Overview).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub total: i64,
    pub running: i64,
    pub pending: i64,
    pub completed: i64,
}

pub struct Board {
    pool: SqlitePool,
    bus: EventBus,
    // `RwLock` rather than a plain field so a `Board` can be wrapped in an
    // `Arc` and shared with the Scheduler *before* the Scheduler's handle
    // is known, then wired in afterwards (§9 design note).
    scheduler: RwLock<Arc<dyn SchedulerHandle>>,
    // Used for the Synthesizer pass on workspace completion. `None` until
    // wired in -- a Board used only for direct Store access (e.g. in
    // tests) never needs one.
    session_manager: RwLock<Option<Arc<dyn SessionManager>>>,
}

impl Board {
    pub fn new(pool: SqlitePool, bus: EventBus) -> Self {
        Board {
            pool,
            bus,
            scheduler: RwLock::new(Arc::new(NoopSchedulerHandle)),
            session_manager: RwLock::new(None),
        }
    }

    /// Wire in the real scheduler handle once the Scheduler is
    /// constructed (§9: avoids Board owning the Scheduler directly).
    pub fn set_scheduler(&self, scheduler: Arc<dyn SchedulerHandle>) {
        *self.scheduler.write().unwrap() = scheduler;
    }

    /// Wire in the session manager used for the post-completion
    /// Synthesizer pass.
    pub fn set_session_manager(&self, session_manager: Arc<dyn SessionManager>) {
        *self.session_manager.write().unwrap() = Some(session_manager);
    }

    fn trigger_scheduler(&self) {
        self.scheduler.read().unwrap().trigger();
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- Workspace CRUD -----------------------------------------------

    pub async fn create_workspace(
        &self,
        name: &str,
        goal: &str,
        context: &str,
        max_concurrent: i64,
        work_dir: &str,
    ) -> Result<Workspace, BoardError> {
        if name.trim().is_empty() {
            return Err(BoardError::Validation("workspace name must not be empty".to_string()));
        }
        if max_concurrent < 1 {
            return Err(BoardError::Validation("max_concurrent must be >= 1".to_string()));
        }
        let workspace = workspaces::create_workspace(&self.pool, name, goal, context, max_concurrent, work_dir).await?;
        self.bus.broadcast(BoardEvent::new(
            BoardEventKind::WorkspaceCreated,
            workspace.id,
            None,
            format!("workspace '{name}' created"),
        ));
        Ok(workspace)
    }

    pub async fn get_workspace(&self, id: Uuid) -> Result<Workspace, BoardError> {
        workspaces::get_workspace(&self.pool, id)
            .await?
            .ok_or(BoardError::WorkspaceNotFound(id))
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>, BoardError> {
        Ok(workspaces::list_workspaces(&self.pool).await?)
    }

    pub async fn update_workspace(&self, id: Uuid, patch: &WorkspacePatch) -> Result<Workspace, BoardError> {
        if let Some(max_concurrent) = patch.max_concurrent {
            if max_concurrent < 1 {
                return Err(BoardError::Validation("max_concurrent must be >= 1".to_string()));
            }
        }
        Ok(workspaces::update_workspace(&self.pool, id, patch).await?)
    }

    pub async fn delete_workspace(&self, id: Uuid) -> Result<(), BoardError> {
        let deleted = workspaces::delete_workspace(&self.pool, id).await?;
        if !deleted {
            return Err(BoardError::WorkspaceNotFound(id));
        }
        Ok(())
    }

    pub async fn pause_workspace(&self, id: Uuid) -> Result<Workspace, BoardError> {
        let workspace = workspaces::update_workspace(
            &self.pool,
            id,
            &WorkspacePatch { status: Some(WorkspaceStatus::Paused), ..Default::default() },
        )
        .await?;
        self.bus.broadcast(BoardEvent::new(BoardEventKind::WorkspacePaused, id, None, "workspace paused"));
        Ok(workspace)
    }

    pub async fn resume_workspace(&self, id: Uuid) -> Result<Workspace, BoardError> {
        let workspace = workspaces::update_workspace(
            &self.pool,
            id,
            &WorkspacePatch { status: Some(WorkspaceStatus::Active), ..Default::default() },
        )
        .await?;
        self.bus.broadcast(BoardEvent::new(BoardEventKind::WorkspaceResumed, id, None, "workspace resumed"));
        self.trigger_scheduler();
        Ok(workspace)
    }

    // ---- Task CRUD ------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn create_task(
        &self,
        workspace_id: Uuid,
        title: &str,
        description: &str,
        prompt: &str,
        priority: i64,
        depends_on: &[String],
        tags: &[String],
        max_retries: i64,
        auto_ready: bool,
    ) -> Result<Task, BoardError> {
        if title.trim().is_empty() {
            return Err(BoardError::Validation("task title must not be empty".to_string()));
        }
        if prompt.trim().is_empty() {
            return Err(BoardError::Validation("task prompt must not be empty".to_string()));
        }
        workspaces::get_workspace(&self.pool, workspace_id)
            .await?
            .ok_or(BoardError::WorkspaceNotFound(workspace_id))?;

        let initial_status = if auto_ready && depends_on.is_empty() {
            TaskStatus::Ready
        } else {
            TaskStatus::Backlog
        };

        let task = tasks::create_task(
            &self.pool,
            workspace_id,
            title,
            description,
            prompt,
            priority,
            depends_on,
            tags,
            max_retries,
            initial_status,
        )
        .await?;

        let kind = if task.status == TaskStatus::Ready {
            BoardEventKind::TaskReady
        } else {
            BoardEventKind::TaskCreated
        };
        self.bus.broadcast(BoardEvent::new(kind, workspace_id, Some(task.id.clone()), format!("task '{title}' created")));
        if task.status == TaskStatus::Ready {
            self.trigger_scheduler();
        }
        Ok(task)
    }

    pub async fn get_task(&self, id: &str) -> Result<Task, BoardError> {
        tasks::get_task(&self.pool, id).await?.ok_or_else(|| BoardError::TaskNotFound(id.to_string()))
    }

    pub async fn list_tasks(&self, workspace_id: Option<Uuid>, statuses: Option<&[TaskStatus]>) -> Result<Vec<Task>, BoardError> {
        Ok(tasks::list_tasks(&self.pool, workspace_id, statuses).await?)
    }

    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task, BoardError> {
        Ok(tasks::update_task(&self.pool, id, patch).await?)
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), BoardError> {
        let deleted = tasks::delete_task(&self.pool, id).await?;
        if !deleted {
            return Err(BoardError::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    // ---- Manual lifecycle transitions -----------------------------------

    /// Legal only from `backlog` or `ready`. Coerces to `ready` and
    /// triggers the scheduler.
    pub async fn start_task(&self, id: &str) -> Result<Task, BoardError> {
        let task = self.get_task(id).await?;
        if !matches!(task.status, TaskStatus::Backlog | TaskStatus::Ready) {
            return Err(BoardError::IllegalTransition {
                task_id: id.to_string(),
                from: status_name(task.status),
                to: "ready",
            });
        }
        let moved = tasks::force_ready(&self.pool, id).await?;
        if !moved {
            return Err(BoardError::Conflict(format!("task {id} changed status concurrently")));
        }
        self.bus.broadcast(BoardEvent::new(BoardEventKind::TaskReady, task.workspace_id, Some(id.to_string()), "task started manually"));
        self.trigger_scheduler();
        self.get_task(id).await
    }

    /// Legal from any non-terminal state.
    pub async fn cancel_task(&self, id: &str) -> Result<Task, BoardError> {
        let task = self.get_task(id).await?;
        if task.status.is_terminal() {
            return Err(BoardError::Conflict(format!("task {id} is already terminal")));
        }
        let cancelled = tasks::cancel_task(&self.pool, id).await?;
        if !cancelled {
            return Err(BoardError::Conflict(format!("task {id} changed status concurrently")));
        }
        self.bus.broadcast(BoardEvent::new(BoardEventKind::TaskCancelled, task.workspace_id, Some(id.to_string()), "task cancelled"));
        Ok(self.get_task(id).await?)
    }

    /// Legal only from `failed`.
    pub async fn retry_task(&self, id: &str) -> Result<Task, BoardError> {
        let task = self.get_task(id).await?;
        if task.status != TaskStatus::Failed {
            return Err(BoardError::IllegalTransition {
                task_id: id.to_string(),
                from: status_name(task.status),
                to: "ready",
            });
        }
        let retried = tasks::retry_from_failed(&self.pool, id).await?;
        if !retried {
            return Err(BoardError::Conflict(format!("task {id} changed status concurrently")));
        }
        self.bus.broadcast(BoardEvent::new(BoardEventKind::TaskReady, task.workspace_id, Some(id.to_string()), "task retried"));
        self.trigger_scheduler();
        self.get_task(id).await
    }

    // ---- Derived behaviours -----------------------------------------------

    /// Called by the Scheduler when a task reaches a terminal state.
    /// Promotes ready dependents and detects workspace completion (§4.4).
    pub async fn on_task_finished(&self, workspace_id: Uuid, task_id: &str) -> Result<(), BoardError> {
        let task = self.get_task(task_id).await?;

        if task.status == TaskStatus::Done {
            let dependents = tasks::get_dependents(&self.pool, workspace_id, task_id).await?;
            for dependent in dependents {
                if dependent.status != TaskStatus::Backlog {
                    continue;
                }
                let deps = tasks::get_tasks_by_ids(&self.pool, &dependent.depends_on).await?;
                let all_done = deps.len() == dependent.depends_on.len() && deps.iter().all(|d| d.status == TaskStatus::Done);
                if all_done {
                    let promoted = tasks::promote_to_ready(&self.pool, &dependent.id).await?;
                    if promoted {
                        self.bus.broadcast(BoardEvent::new(
                            BoardEventKind::TaskReady,
                            workspace_id,
                            Some(dependent.id.clone()),
                            format!("task '{}' ready: all dependencies done", dependent.title),
                        ));
                    }
                }
            }
            self.trigger_scheduler();
        }

        self.maybe_complete_workspace(workspace_id).await?;
        Ok(())
    }

    async fn maybe_complete_workspace(&self, workspace_id: Uuid) -> Result<(), BoardError> {
        let workspace = workspaces::get_workspace(&self.pool, workspace_id)
            .await?
            .ok_or(BoardError::WorkspaceNotFound(workspace_id))?;
        if workspace.summary_generated {
            return Ok(());
        }

        let counts = tasks::count_by_status(&self.pool, workspace_id).await?;
        let drained = counts.backlog == 0 && counts.ready == 0 && counts.running == 0 && counts.failed == 0;
        if drained && counts.done > 0 {
            self.bus.broadcast(BoardEvent::new(
                BoardEventKind::WorkspaceCompleted,
                workspace_id,
                None,
                "all tasks drained",
            ));

            let manager = self.session_manager.read().unwrap().clone();
            if let Some(manager) = manager {
                if let Err(err) = crate::synth::synthesize(&self.pool, &manager, workspace_id).await {
                    tracing::warn!(workspace_id = %workspace_id, error = %err, "workspace synthesis failed");
                }
            }
        }
        Ok(())
    }

    pub async fn overview(&self) -> Result<Overview, BoardError> {
        let counts: StatusCounts = tasks::global_count_by_status(&self.pool).await?;
        Ok(Overview {
            total: counts.total(),
            running: counts.running,
            pending: counts.backlog + counts.ready,
            completed: counts.done,
        })
    }
}

fn status_name(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Backlog => "backlog",
        TaskStatus::Ready => "ready",
        TaskStatus::Running => "running",
        TaskStatus::Done => "done",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskboard_test_utils::TestDb;

    async fn board() -> (Board, TestDb) {
        let db = TestDb::new().await;
        let board = Board::new(db.pool.clone(), EventBus::new());
        (board, db)
    }

    #[tokio::test]
    async fn create_workspace_rejects_empty_name() {
        let (board, _db) = board().await;
        let result = board.create_workspace("", "goal", "", 3, "/work").await;
        assert!(matches!(result, Err(BoardError::Validation(_))));
    }

    #[tokio::test]
    async fn start_task_coerces_backlog_to_ready() {
        let (board, _db) = board().await;
        let ws = board.create_workspace("ws", "goal", "", 3, "/work").await.unwrap();
        let task = board
            .create_task(ws.id, "t1", "", "p", 2, &[], &[], 0, false)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Backlog);

        let started = board.start_task(&task.id).await.unwrap();
        assert_eq!(started.status, TaskStatus::Ready);
    }

    #[tokio::test]
    async fn on_task_finished_promotes_dependent_when_all_deps_done() {
        let (board, db) = board().await;
        let ws = board.create_workspace("ws", "goal", "", 3, "/work").await.unwrap();
        let a = board.create_task(ws.id, "a", "", "p", 2, &[], &[], 0, true).await.unwrap();
        let b = board
            .create_task(ws.id, "b", "", "p", 2, &[a.id.clone()], &[], 0, true)
            .await
            .unwrap();
        assert_eq!(b.status, TaskStatus::Backlog);

        tasks::mark_running(&db.pool, &a.id, "s1").await.unwrap();
        tasks::mark_done(&db.pool, &a.id, "a-out").await.unwrap();

        board.on_task_finished(ws.id, &a.id).await.unwrap();

        let b = board.get_task(&b.id).await.unwrap();
        assert_eq!(b.status, TaskStatus::Ready);
    }

    #[tokio::test]
    async fn workspace_completes_once_all_tasks_drained() {
        let (board, db) = board().await;
        let ws = board.create_workspace("ws", "goal", "", 3, "/work").await.unwrap();
        let a = board.create_task(ws.id, "a", "", "p", 2, &[], &[], 0, true).await.unwrap();

        let mut sub = board.bus().subscribe();
        tasks::mark_running(&db.pool, &a.id, "s1").await.unwrap();
        tasks::mark_done(&db.pool, &a.id, "a-out").await.unwrap();
        board.on_task_finished(ws.id, &a.id).await.unwrap();

        let mut saw_completed = false;
        while let Ok(event) = sub.receiver.try_recv() {
            if event.kind == BoardEventKind::WorkspaceCompleted {
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }

    #[tokio::test]
    async fn cancel_task_rejects_terminal_task() {
        let (board, db) = board().await;
        let ws = board.create_workspace("ws", "goal", "", 3, "/work").await.unwrap();
        let a = board.create_task(ws.id, "a", "", "p", 2, &[], &[], 0, true).await.unwrap();
        tasks::mark_running(&db.pool, &a.id, "s1").await.unwrap();
        tasks::mark_done(&db.pool, &a.id, "out").await.unwrap();

        let result = board.cancel_task(&a.id).await;
        assert!(matches!(result, Err(BoardError::Conflict(_))));
    }

    #[tokio::test]
    async fn retry_task_only_legal_from_failed() {
        let (board, _db) = board().await;
        let ws = board.create_workspace("ws", "goal", "", 3, "/work").await.unwrap();
        let a = board.create_task(ws.id, "a", "", "p", 2, &[], &[], 0, true).await.unwrap();

        let result = board.retry_task(&a.id).await;
        assert!(matches!(result, Err(BoardError::IllegalTransition { .. })));
    }
}
