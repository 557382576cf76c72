use std::env;
use std::path::{Path, PathBuf};

/// Database configuration.
///
/// Reads from the `TASKBOARD_DB_PATH` environment variable, falling back to
/// a well-known path under the user's data directory.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the single-file SQLite database.
    pub db_path: PathBuf,
}

impl DbConfig {
    /// Build a config from the environment.
    ///
    /// Priority: `TASKBOARD_DB_PATH` env var, then the per-user default
    /// data directory.
    pub fn from_env() -> Self {
        let db_path = env::var("TASKBOARD_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        Self { db_path }
    }

    /// Build a config from an explicit path (useful for tests and CLI
    /// flags).
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// The default on-disk location: `<user data dir>/taskboard/taskboard.db`.
    ///
    /// Falls back to a relative path if the platform data directory cannot
    /// be resolved (e.g. a minimal container with no `$HOME`).
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taskboard")
            .join("taskboard.db")
    }

    pub fn db_dir(&self) -> Option<&Path> {
        self.db_path.parent()
    }

    /// SQLite connection URL for this path, creating the file if absent.
    pub fn connection_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_new_keeps_given_path() {
        let cfg = DbConfig::new("/tmp/example/taskboard.db");
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/example/taskboard.db"));
    }

    #[test]
    fn db_dir_returns_parent() {
        let cfg = DbConfig::new("/tmp/example/taskboard.db");
        assert_eq!(cfg.db_dir(), Some(Path::new("/tmp/example")));
    }

    #[test]
    fn connection_url_uses_rwc_mode() {
        let cfg = DbConfig::new("/tmp/example/taskboard.db");
        assert_eq!(
            cfg.connection_url(),
            "sqlite:///tmp/example/taskboard.db?mode=rwc"
        );
    }

    #[test]
    fn default_path_ends_with_taskboard_db() {
        let path = DbConfig::default_path();
        assert_eq!(path.file_name().unwrap(), "taskboard.db");
        assert_eq!(path.parent().unwrap().file_name().unwrap(), "taskboard");
    }
}
