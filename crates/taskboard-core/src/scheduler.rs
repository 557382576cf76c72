//! The Scheduler: the periodic + triggered dispatch loop (§4.5).
//!
//! Grounded on the host orchestrator's shape (one long-lived loop,
//! `tokio::select!` between a wake channel and a timer, a detached
//! `tokio::spawn` per dispatched task reporting back over an `mpsc`
//! channel) but driven by workspace-scoped concurrency counts rather than
//! a single global semaphore, since each workspace has its own
//! `max_concurrent`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use sqlx::SqlitePool;
use taskboard_db::models::{TaskLogEventType, TaskStatus, Workspace, WorkspaceStatus};
use taskboard_db::queries::{task_logs, tasks};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::board::Board;
use crate::bus::{BoardEvent, BoardEventKind, EventBus};
use crate::handle::SchedulerHandle;
use crate::session::{SessionEventKind, SessionManager};

/// A dependency's result is truncated to this many characters before
/// being prepended to a dependent task's prompt, with a footer noting
/// the original length (§4.5 Dispatch step a).
const DEPENDENCY_RESULT_TRUNCATE_CHARS: usize = 2000;

const TRIGGER_CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { tick_interval: Duration::from_secs(5) }
    }
}

/// A coalescing, non-blocking wake-up signal for the Scheduler's loop.
struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl SchedulerHandle for TriggerHandle {
    fn trigger(&self) {
        // A full channel means a wake-up is already pending; dropping
        // this one is correct, not a bug.
        let _ = self.tx.try_send(());
    }
}

pub struct Scheduler {
    pool: SqlitePool,
    board: Arc<Board>,
    bus: EventBus,
    session_manager: Arc<dyn SessionManager>,
    trigger_rx: mpsc::Receiver<()>,
    trigger_handle: Arc<dyn SchedulerHandle>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Construct a scheduler and the handle its `Board` should be wired
    /// to via [`Board::set_scheduler`] (§9 design note).
    pub fn new(
        pool: SqlitePool,
        board: Arc<Board>,
        bus: EventBus,
        session_manager: Arc<dyn SessionManager>,
        config: SchedulerConfig,
    ) -> (Scheduler, Arc<dyn SchedulerHandle>) {
        let (tx, rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
        let handle: Arc<dyn SchedulerHandle> = Arc::new(TriggerHandle { tx });
        board.set_session_manager(Arc::clone(&session_manager));
        let scheduler = Scheduler {
            pool,
            board,
            bus,
            session_manager,
            trigger_rx: rx,
            trigger_handle: Arc::clone(&handle),
            config,
        };
        (scheduler, handle)
    }

    /// Run the scheduling loop until `cancel` fires. Exits after the
    /// current cycle completes (§5 Cancellation & timeouts).
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("scheduler shutting down");
                    return;
                }
                _ = self.trigger_rx.recv() => {}
                _ = tokio::time::sleep(self.config.tick_interval) => {}
            }

            if let Err(err) = self.run_cycle().await {
                tracing::error!(error = %err, "scheduling cycle failed");
            }
        }
    }

    /// One schedule cycle: for each active workspace, admit ready tasks
    /// up to its remaining concurrency and dispatch them.
    async fn run_cycle(&self) -> Result<(), taskboard_db::StoreError> {
        tracing::debug!("scheduling cycle starting");
        let workspaces = self.board.list_workspaces().await.map_err(to_store_error)?;

        for workspace in workspaces {
            if workspace.status != WorkspaceStatus::Active {
                continue;
            }
            if let Err(err) = self.schedule_workspace(&workspace).await {
                tracing::error!(workspace_id = %workspace.id, error = %err, "failed to schedule workspace, continuing");
            }
        }
        Ok(())
    }

    async fn schedule_workspace(&self, workspace: &Workspace) -> Result<(), taskboard_db::StoreError> {
        let counts = tasks::count_by_status(&self.pool, workspace.id).await?;
        if counts.running >= workspace.max_concurrent {
            return Ok(());
        }
        let slots = workspace.max_concurrent - counts.running;
        let ready = tasks::get_ready_tasks(&self.pool, workspace.id, slots).await?;

        for task in ready {
            self.dispatch(workspace, task).await?;
        }
        Ok(())
    }

    /// Dispatch a single ready task: build its prompt, transition it to
    /// `running` synchronously, then hand the actual LLM call off to a
    /// detached task (§4.5 Dispatch).
    async fn dispatch(&self, workspace: &Workspace, task: taskboard_db::models::Task) -> Result<(), taskboard_db::StoreError> {
        let prompt = self.build_prompt(&task).await?;

        let session_name = format!("task-{}-attempt-{}", task.id, task.retry_count);
        let moved = tasks::mark_running(&self.pool, &task.id, &session_name).await?;
        if !moved {
            // Lost a race with another scheduling cycle or a manual
            // cancel; nothing to dispatch.
            return Ok(());
        }

        self.bus.broadcast(BoardEvent::new(
            BoardEventKind::TaskStarted,
            workspace.id,
            Some(task.id.clone()),
            format!("task '{}' started", task.title),
        ));

        let pool = self.pool.clone();
        let bus = self.bus.clone();
        let board = Arc::clone(&self.board);
        let session_manager = Arc::clone(&self.session_manager);
        let trigger = Arc::clone(&self.trigger_handle);
        let workspace_context = workspace.context.clone();
        let workspace_id = workspace.id;
        let task_id = task.id.clone();
        let max_retries = task.max_retries;
        let retry_count = task.retry_count;

        tokio::spawn(async move {
            run_dispatch_worker(
                pool,
                bus,
                board,
                session_manager,
                trigger,
                workspace_id,
                workspace_context,
                session_name,
                task_id,
                prompt,
                max_retries,
                retry_count,
            )
            .await;
        });

        Ok(())
    }

    /// Build the final prompt: each *done* dependency's truncated result,
    /// then the task's own prompt (§4.5 Dispatch step a).
    async fn build_prompt(&self, task: &taskboard_db::models::Task) -> Result<String, taskboard_db::StoreError> {
        if task.depends_on.is_empty() {
            return Ok(task.prompt.clone());
        }
        let deps = tasks::get_tasks_by_ids(&self.pool, &task.depends_on).await?;

        let mut prompt = String::new();
        for dep in deps.iter().filter(|d| d.status == TaskStatus::Done) {
            let result = dep.result.as_deref().unwrap_or("");
            let char_count = result.chars().count();
            if char_count > DEPENDENCY_RESULT_TRUNCATE_CHARS {
                // Cut on a char boundary, not a byte offset, so a multibyte
                // codepoint straddling the limit isn't sliced in half.
                let cut = result
                    .char_indices()
                    .nth(DEPENDENCY_RESULT_TRUNCATE_CHARS)
                    .map(|(idx, _)| idx)
                    .unwrap_or(result.len());
                prompt.push_str(&result[..cut]);
                prompt.push_str(&format!("\n... [truncated, {char_count} characters total]\n"));
            } else {
                prompt.push_str(result);
                prompt.push('\n');
            }
        }
        prompt.push_str(&task.prompt);
        Ok(prompt)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_dispatch_worker(
    pool: SqlitePool,
    bus: EventBus,
    board: Arc<Board>,
    session_manager: Arc<dyn SessionManager>,
    trigger: Arc<dyn SchedulerHandle>,
    workspace_id: Uuid,
    workspace_context: String,
    session_name: String,
    task_id: String,
    prompt: String,
    max_retries: i64,
    retry_count: i64,
) {
    let outcome = run_session(&pool, &session_manager, &workspace_context, &session_name, &task_id, &prompt).await;

    match outcome {
        Ok(result_text) => {
            let _ = tasks::mark_done(&pool, &task_id, &result_text).await;
            bus.broadcast(BoardEvent::new(
                BoardEventKind::TaskCompleted,
                workspace_id,
                Some(task_id.clone()),
                "task completed",
            ));
        }
        Err(error_message) => {
            if retry_count < max_retries {
                let message = format!("retry {}: {error_message}", retry_count + 1);
                let _ = tasks::retry_from_running(&pool, &task_id, &message).await;
                // Intentionally no task_completed / task_failed here; a
                // subsequent dispatch will emit the terminal event.
            } else {
                let _ = tasks::mark_failed(&pool, &task_id, &error_message).await;
                bus.broadcast(BoardEvent::new(
                    BoardEventKind::TaskFailed,
                    workspace_id,
                    Some(task_id.clone()),
                    "task failed: retries exhausted",
                ));
            }
        }
    }

    let _ = session_manager.delete(&session_name).await;
    let _ = board.on_task_finished(workspace_id, &task_id).await;
    trigger.trigger();
}

/// Run one session call to completion, returning the concatenated
/// content on success or the error message on failure. Every event is
/// appended to the task's log.
async fn run_session(
    pool: &SqlitePool,
    session_manager: &Arc<dyn SessionManager>,
    workspace_context: &str,
    session_name: &str,
    task_id: &str,
    prompt: &str,
) -> Result<String, String> {
    let session = session_manager
        .create_session(session_name)
        .await
        .map_err(|err| format!("failed to create session: {err}"))?;

    if !workspace_context.trim().is_empty() {
        session
            .inject_context(workspace_context)
            .await
            .map_err(|err| format!("failed to inject context: {err}"))?;
    }

    let mut result = String::new();
    let mut stream = session.chat_stream(prompt);

    while let Some(event) = stream.next().await {
        let (event_type, payload, tool_name) = match event.kind {
            SessionEventKind::Content => {
                let text = event.content.clone().unwrap_or_default();
                result.push_str(&text);
                (TaskLogEventType::Content, text, None)
            }
            SessionEventKind::Thinking => (TaskLogEventType::Thinking, event.content.clone().unwrap_or_default(), None),
            SessionEventKind::ToolCall => (
                TaskLogEventType::ToolCall,
                event.tool_result.clone().unwrap_or_default(),
                event.tool_name.clone(),
            ),
            SessionEventKind::ToolResult => (
                TaskLogEventType::ToolResult,
                event.tool_result.clone().unwrap_or_default(),
                event.tool_name.clone(),
            ),
            SessionEventKind::Error => {
                let message = event.error.clone().unwrap_or_else(|| "unknown error".to_string());
                let _ = task_logs::append_task_log(pool, task_id, TaskLogEventType::Error, &message, None).await;
                return Err(message);
            }
            SessionEventKind::Done => break,
        };
        let _ = task_logs::append_task_log(pool, task_id, event_type, &payload, tool_name.as_deref()).await;
    }

    Ok(result)
}


fn to_store_error(err: crate::error::BoardError) -> taskboard_db::StoreError {
    match err {
        crate::error::BoardError::Store(store_err) => store_err,
        other => taskboard_db::StoreError::Io(sqlx::Error::Protocol(other.to_string())),
    }
}
