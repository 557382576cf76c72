use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Executor, Row, SqlitePool};
use tracing::info;

use crate::config::DbConfig;

/// Create a connection pool for the single-file store at `db_path`,
/// creating the file and its parent directory if they do not exist.
///
/// The journal mode is WAL and the busy timeout is bounded so that short
/// writer contention waits rather than fails outright, matching the
/// "write-ahead journal and a bounded busy timeout" requirement.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
        .with_context(|| format!("invalid database path {}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    Ok(pool)
}

/// Create a pool from a [`DbConfig`], ensuring the backing directory exists.
pub async fn create_pool_from_config(config: &DbConfig) -> Result<SqlitePool> {
    create_pool(&config.db_path).await
}

/// Run all pending migrations embedded under `migrations/`.
///
/// Uses a runtime [`sqlx::migrate::Migrator`] rather than the
/// `sqlx::migrate!()` macro so the migrations directory can be resolved
/// (and, if needed, overridden) without requiring a live database at
/// compile time.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let migrator = sqlx::migrate::Migrator::new(default_migrations_path())
        .await
        .with_context(|| {
            format!(
                "failed to load migrations from {}",
                default_migrations_path().display()
            )
        })?;

    migrator
        .run(pool)
        .await
        .context("failed to run database migrations")?;

    info!("migrations applied successfully");
    Ok(())
}

/// Return the row count for every user-defined table in the database.
pub async fn table_counts(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let tables: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%' \
         ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .context("failed to list tables")?;

    let mut counts = Vec::with_capacity(tables.len());
    for (table_name,) in &tables {
        // Table names come from sqlite_master so they are safe identifiers.
        let query = format!("SELECT COUNT(*) AS cnt FROM {table_name}");
        let row = pool
            .fetch_one(sqlx::query(&query))
            .await
            .with_context(|| format!("failed to count rows in {table_name}"))?;
        let count: i64 = row.get("cnt");
        counts.push((table_name.clone(), count));
    }
    Ok(counts)
}

/// Return the default path to the migrations directory shipped with
/// `taskboard-db`.
///
/// Resolves relative to this crate's source tree via `CARGO_MANIFEST_DIR`.
pub fn default_migrations_path() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations"))
}
