//! Query functions grouped by table, mirroring the three persisted
//! entities: workspaces, tasks, task logs.

pub mod task_logs;
pub mod tasks;
pub mod workspaces;
