//! Shared test utilities for taskboard integration tests.
//!
//! Each test gets its own on-disk SQLite database inside a fresh
//! [`tempfile::TempDir`], with migrations applied. There is no shared
//! server to spin up first -- the store is a single file, so isolation
//! just means "a unique path per test".

use sqlx::SqlitePool;
use tempfile::TempDir;

use taskboard_db::pool;

/// An isolated, migrated test database. Dropping this removes the
/// backing directory (and therefore the database file).
pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

impl TestDb {
    /// Create a fresh database in a new temporary directory and run
    /// migrations against it.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir for test db");
        let path = dir.path().join("taskboard.db");
        let db_pool = pool::create_pool(&path)
            .await
            .expect("failed to create sqlite pool for test db");
        pool::run_migrations(&db_pool)
            .await
            .expect("migrations should succeed");
        TestDb {
            pool: db_pool,
            _dir: dir,
        }
    }
}
