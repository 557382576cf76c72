//! Durable, single-file relational store for workspaces, tasks, and task
//! logs. Backed by SQLite in WAL mode with a bounded busy timeout so short
//! writer contention waits rather than fails.

pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod queries;

pub use error::{StoreError, StoreResult};
