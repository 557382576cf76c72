//! Configuration resolution for taskboard.
//!
//! Layered order, highest priority last: built-in defaults -> optional
//! TOML config file -> environment variable overrides -> explicit CLI
//! flags.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use taskboard_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub db_path: Option<PathBuf>,
    pub tick_secs: Option<u64>,
    pub default_max_concurrent: Option<i64>,
    pub bind_addr: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the taskboard config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/taskboard` or
/// `~/.config/taskboard`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("taskboard");
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".config").join("taskboard")
}

/// Return the path to the taskboard config file, honouring
/// `$TASKBOARD_CONFIG` if set.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("TASKBOARD_CONFIG") {
        return PathBuf::from(path);
    }
    config_dir().join("config.toml")
}

/// Load and parse the config file, if present. A missing file is not an
/// error -- it simply contributes nothing to resolution.
pub fn load_config() -> Option<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str(&contents) {
        Ok(config) => Some(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring malformed config file");
            None
        }
    }
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

const DEFAULT_TICK_SECS: u64 = 5;
const DEFAULT_MAX_CONCURRENT: i64 = 3;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:4590";

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct TaskBoardConfig {
    pub db_config: DbConfig,
    pub tick_interval: Duration,
    pub default_max_concurrent: i64,
    pub bind_addr: String,
}

/// CLI-flag overrides, applied last. `None` leaves the lower layer's
/// value untouched.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub db_path: Option<PathBuf>,
    pub tick_secs: Option<u64>,
    pub default_max_concurrent: Option<i64>,
    pub bind_addr: Option<String>,
}

impl TaskBoardConfig {
    pub fn resolve(overrides: &CliOverrides) -> Result<Self> {
        let file = load_config();

        let db_path = overrides
            .db_path
            .clone()
            .or_else(|| std::env::var("TASKBOARD_DB_PATH").ok().map(PathBuf::from))
            .or_else(|| file.as_ref().and_then(|f| f.db_path.clone()))
            .unwrap_or_else(DbConfig::default_path);

        let tick_secs = overrides
            .tick_secs
            .or_else(|| std::env::var("TASKBOARD_TICK_SECS").ok().and_then(|v| v.parse().ok()))
            .or_else(|| file.as_ref().and_then(|f| f.tick_secs))
            .unwrap_or(DEFAULT_TICK_SECS);

        let default_max_concurrent = overrides
            .default_max_concurrent
            .or_else(|| {
                std::env::var("TASKBOARD_DEFAULT_MAX_CONCURRENT").ok().and_then(|v| v.parse().ok())
            })
            .or_else(|| file.as_ref().and_then(|f| f.default_max_concurrent))
            .unwrap_or(DEFAULT_MAX_CONCURRENT);

        let bind_addr = overrides
            .bind_addr
            .clone()
            .or_else(|| std::env::var("TASKBOARD_BIND_ADDR").ok())
            .or_else(|| file.as_ref().and_then(|f| f.bind_addr.clone()))
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Ok(TaskBoardConfig {
            db_config: DbConfig::new(db_path),
            tick_interval: Duration::from_secs(tick_secs),
            default_max_concurrent,
            bind_addr,
        })
    }
}

/// Serialize and write a starter config file, creating parent dirs.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;
    Ok(())
}
