//! Typed error taxonomy for the Board, Scheduler, and Planner.
//!
//! Mirrors the host's two-layer approach: `thiserror`-derived enums carry
//! the exact error *kind* a caller might need to `match` on; call sites one
//! layer up (CLI commands, HTTP handlers, the scheduler loop) wrap these in
//! `anyhow::Result` with `.context()`.

use thiserror::Error;
use uuid::Uuid;

use taskboard_db::StoreError;

/// Errors raised by Board operations (§7: ValidationError, NotFound,
/// ConflictError, StoreError).
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("workspace {0} not found")]
    WorkspaceNotFound(Uuid),

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("illegal transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        task_id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while parsing or validating a [`crate::plan::PlanResult`]
/// (§3, §8 invariant 9).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan workspace name must not be empty")]
    EmptyName,

    #[error("plan must contain at least one task")]
    EmptyTasks,

    #[error("task {index} has an empty title")]
    EmptyTitle { index: usize },

    #[error("task {index} has an empty prompt")]
    EmptyPrompt { index: usize },

    #[error("task {index} depends on out-of-range index {dep_index}")]
    DependencyOutOfRange { index: usize, dep_index: usize },

    #[error("task {index} depends on itself")]
    SelfDependency { index: usize },

    #[error("dependency cycle detected among tasks: {0:?}")]
    CycleDetected(Vec<usize>),

    #[error("no JSON object could be extracted from the session response")]
    NoJsonFound,

    #[error("failed to parse extracted JSON as a plan: {0}")]
    Malformed(String),
}

/// Errors surfaced by an execution (agent session) call, per §7
/// ExecutionError -- these fold into the task retry mechanism rather than
/// aborting the scheduler.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("agent session reported an error: {0}")]
    SessionError(String),

    #[error("session manager failed: {0}")]
    SessionManager(#[from] anyhow::Error),
}
