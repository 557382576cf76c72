//! Typed error taxonomy for the store layer.
//!
//! Queries return `StoreResult<T>` rather than `anyhow::Result<T>` so
//! callers in `taskboard-core` can match on error *kind* (not-found vs.
//! conflict vs. I/O) instead of string-sniffing a boxed error.

use std::fmt;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("malformed {field} column: {source}")]
    Malformed {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("store I/O error: {0}")]
    Io(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Classify a raw `sqlx::Error` from a failed INSERT, distinguishing
    /// constraint violations the caller may want to react to specially.
    pub fn from_insert_error(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let message = db_err.message().to_string();
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation(message);
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation(message);
            }
        }
        StoreError::Io(err)
    }
}
