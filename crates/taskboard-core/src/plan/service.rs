//! `ApproveAndCreate`: materialises a validated [`PlanResult`] as a
//! workspace + task DAG (§4.6).

use sqlx::SqlitePool;
use taskboard_db::models::{Task, TaskStatus};
use taskboard_db::queries::tasks::{self, NewTaskSpec};
use uuid::Uuid;

use crate::bus::{BoardEvent, BoardEventKind, EventBus};
use crate::error::BoardError;
use crate::handle::SchedulerHandle;
use crate::plan::schema::PlanResult;

const DEFAULT_MAX_CONCURRENT: i64 = 3;
const DEFAULT_MAX_RETRIES: i64 = 2;

/// Validate (defensively -- callers should already have validated at
/// `plan()` time) and materialise `plan` into a new workspace and its
/// tasks, emitting `workspace_created` plus one `task_created` (or
/// `task_ready` if seeded ready) per task. Triggers the scheduler when
/// `auto_start` is set.
pub async fn approve_and_create(
    pool: &SqlitePool,
    bus: &EventBus,
    scheduler: &dyn SchedulerHandle,
    plan: &PlanResult,
    goal: &str,
    work_dir: &str,
    auto_start: bool,
) -> Result<(Uuid, Vec<Task>), BoardError> {
    plan.validate().map_err(|err| BoardError::Validation(err.to_string()))?;

    let specs: Vec<NewTaskSpec> = plan
        .tasks
        .iter()
        .map(|task| NewTaskSpec {
            title: task.title.clone(),
            description: task.description.clone(),
            prompt: task.prompt.clone(),
            priority: task.priority,
            depends_on_indices: task.depends_on.clone(),
            tags: task.tags.clone(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
        .collect();

    let max_concurrent = plan.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT);

    let (workspace_id, created) = tasks::create_from_plan(
        pool,
        &plan.workspace_name,
        goal,
        &plan.workspace_context,
        max_concurrent,
        work_dir,
        &specs,
    )
    .await?;

    bus.broadcast(BoardEvent::new(
        BoardEventKind::WorkspaceCreated,
        workspace_id,
        None,
        format!("workspace '{}' created from plan", plan.workspace_name),
    ));

    for task in &created {
        let kind = if task.status == TaskStatus::Ready {
            BoardEventKind::TaskReady
        } else {
            BoardEventKind::TaskCreated
        };
        bus.broadcast(BoardEvent::new(
            kind,
            workspace_id,
            Some(task.id.clone()),
            format!("task '{}' materialized from plan", task.title),
        ));
    }

    if auto_start {
        scheduler.trigger();
    }

    Ok((workspace_id, created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::schema::PlannedTask;
    use std::sync::atomic::{AtomicBool, Ordering};
    use taskboard_test_utils::TestDb;

    struct RecordingHandle {
        triggered: AtomicBool,
    }

    impl SchedulerHandle for RecordingHandle {
        fn trigger(&self) {
            self.triggered.store(true, Ordering::SeqCst);
        }
    }

    fn sample_plan() -> PlanResult {
        PlanResult {
            workspace_name: "widget project".to_string(),
            workspace_context: "be concise".to_string(),
            max_concurrent: Some(2),
            tasks: vec![
                PlannedTask {
                    title: "design".to_string(),
                    description: "".to_string(),
                    prompt: "design the widget".to_string(),
                    priority: 1,
                    tags: vec![],
                    depends_on: vec![],
                },
                PlannedTask {
                    title: "build".to_string(),
                    description: "".to_string(),
                    prompt: "build the widget".to_string(),
                    priority: 1,
                    tags: vec![],
                    depends_on: vec![0],
                },
            ],
        }
    }

    #[tokio::test]
    async fn approve_and_create_materializes_and_triggers() {
        let db = TestDb::new().await;
        let bus = EventBus::new();
        let handle = RecordingHandle { triggered: AtomicBool::new(false) };
        let plan = sample_plan();

        let (workspace_id, tasks) =
            approve_and_create(&db.pool, &bus, &handle, &plan, "ship a widget", "/work", true)
                .await
                .unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].status, TaskStatus::Ready);
        assert_eq!(tasks[1].status, TaskStatus::Backlog);
        assert!(handle.triggered.load(Ordering::SeqCst));

        let ws = taskboard_db::queries::workspaces::get_workspace(&db.pool, workspace_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ws.name, "widget project");
    }

    #[tokio::test]
    async fn approve_and_create_without_auto_start_does_not_trigger() {
        let db = TestDb::new().await;
        let bus = EventBus::new();
        let handle = RecordingHandle { triggered: AtomicBool::new(false) };
        let plan = sample_plan();

        approve_and_create(&db.pool, &bus, &handle, &plan, "ship a widget", "/work", false)
            .await
            .unwrap();

        assert!(!handle.triggered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn approve_and_create_rejects_invalid_plan() {
        let db = TestDb::new().await;
        let bus = EventBus::new();
        let handle = RecordingHandle { triggered: AtomicBool::new(false) };
        let mut plan = sample_plan();
        plan.workspace_name = "".to_string();

        let result = approve_and_create(&db.pool, &bus, &handle, &plan, "goal", "/work", false).await;
        assert!(matches!(result, Err(BoardError::Validation(_))));
    }
}
