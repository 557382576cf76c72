//! Row types and status enums for the persisted task-board model.
//!
//! Each enum mirrors the pattern used throughout this store: a
//! `#[derive(sqlx::Type)]` backed by `TEXT` storage, a hand-written
//! `Display`, and a `FromStr` with a dedicated parse-error type so
//! invalid strings surface as a typed error rather than a panic.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a [`Workspace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone)]
pub struct WorkspaceStatusParseError(pub String);

impl fmt::Display for WorkspaceStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid workspace status: {:?}", self.0)
    }
}
impl std::error::Error for WorkspaceStatusParseError {}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkspaceStatus::Active => "active",
            WorkspaceStatus::Paused => "paused",
            WorkspaceStatus::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WorkspaceStatus {
    type Err = WorkspaceStatusParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(WorkspaceStatus::Active),
            "paused" => Ok(WorkspaceStatus::Paused),
            "archived" => Ok(WorkspaceStatus::Archived),
            other => Err(WorkspaceStatusParseError(other.to_string())),
        }
    }
}

/// Lifecycle status of a [`Task`]. See the transition table in the
/// task-board state machine for the legal edges between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Ready,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }

    /// Whether `self -> to` appears in the task status machine.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Backlog, Ready)
                | (Backlog, Cancelled)
                | (Ready, Running)
                | (Ready, Backlog)
                | (Ready, Cancelled)
                | (Running, Done)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Failed, Ready)
                | (Failed, Cancelled)
        )
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}
impl std::error::Error for TaskStatusParseError {}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(TaskStatus::Backlog),
            "ready" => Ok(TaskStatus::Ready),
            "running" => Ok(TaskStatus::Running),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(TaskStatusParseError(other.to_string())),
        }
    }
}

/// Task priority. Lower numeric value sorts first ("priority ascending").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i64)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

#[derive(Debug, Clone)]
pub struct PriorityParseError(pub i64);

impl fmt::Display for PriorityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid priority value: {}", self.0)
    }
}
impl std::error::Error for PriorityParseError {}

impl Priority {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(v: i64) -> Result<Self, PriorityParseError> {
        match v {
            0 => Ok(Priority::Critical),
            1 => Ok(Priority::High),
            2 => Ok(Priority::Normal),
            3 => Ok(Priority::Low),
            other => Err(PriorityParseError(other)),
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Event kind recorded in a task's append-only execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskLogEventType {
    Content,
    Thinking,
    ToolCall,
    ToolResult,
    Error,
}

impl fmt::Display for TaskLogEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskLogEventType::Content => "content",
            TaskLogEventType::Thinking => "thinking",
            TaskLogEventType::ToolCall => "tool_call",
            TaskLogEventType::ToolResult => "tool_result",
            TaskLogEventType::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A bounded execution context owning a DAG of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub goal: String,
    pub context: String,
    pub max_concurrent: i64,
    pub work_dir: String,
    pub status: WorkspaceStatus,
    pub summary: Option<String>,
    pub summary_generated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single unit of agent work inside a workspace.
///
/// `depends_on` and `tags` are stored as JSON arrays in `TEXT` columns;
/// callers get back decoded `Vec<String>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub workspace_id: Uuid,
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub priority: i64,
    pub status: TaskStatus,
    pub depends_on: Vec<String>,
    pub tags: Vec<String>,
    pub max_retries: i64,
    pub retry_count: i64,
    pub assigned_session: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Raw row as stored (JSON columns not yet decoded). Internal to the
/// `queries` module; [`Task`] is the decoded, public-facing shape.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TaskRow {
    pub id: String,
    pub workspace_id: Uuid,
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub priority: i64,
    pub status: TaskStatus,
    pub depends_on: String,
    pub tags: String,
    pub max_retries: i64,
    pub retry_count: i64,
    pub assigned_session: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    pub(crate) fn decode(self) -> crate::error::StoreResult<Task> {
        let depends_on: Vec<String> =
            serde_json::from_str(&self.depends_on).map_err(|e| crate::error::StoreError::Malformed {
                field: "depends_on",
                source: e,
            })?;
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| crate::error::StoreError::Malformed { field: "tags", source: e })?;
        Ok(Task {
            id: self.id,
            workspace_id: self.workspace_id,
            title: self.title,
            description: self.description,
            prompt: self.prompt,
            priority: self.priority,
            status: self.status,
            depends_on,
            tags,
            max_retries: self.max_retries,
            retry_count: self.retry_count,
            assigned_session: self.assigned_session,
            result: self.result,
            error: self.error,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// A single append-only entry in a task's execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskLog {
    pub id: i64,
    pub task_id: String,
    pub event_type: TaskLogEventType,
    pub payload: String,
    pub tool_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-status task counts for a single workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub backlog: i64,
    pub ready: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.backlog + self.ready + self.running + self.done + self.failed + self.cancelled
    }

    pub fn record(&mut self, status: TaskStatus, count: i64) {
        match status {
            TaskStatus::Backlog => self.backlog = count,
            TaskStatus::Ready => self.ready = count,
            TaskStatus::Running => self.running = count,
            TaskStatus::Done => self.done = count,
            TaskStatus::Failed => self.failed = count,
            TaskStatus::Cancelled => self.cancelled = count,
        }
    }
}
