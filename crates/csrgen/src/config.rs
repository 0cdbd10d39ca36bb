//! Process configuration: defaults, an optional JSON file, then environment
//! overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::generator::DEFAULT_TOOL_TIMEOUT;
use crate::worker::queue_worker::DEFAULT_POLL_INTERVAL;

/// Root of the per-job folders.
pub const ENV_JOBS_DIR: &str = "CSR_JOBS";
/// Directory holding the SQLite file.
pub const ENV_DB_DIR: &str = "CSR_DB";
/// Generation tool executable.
pub const ENV_OPENSSL: &str = "CSR_OPENSSL";

pub const DATABASE_FILE_NAME: &str = "sqlite.db";
pub const DEFAULT_MAX_QUEUE_LEN: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub jobs_dir: PathBuf,
    /// Full path of the SQLite file.
    pub database_path: PathBuf,
    pub openssl_path: PathBuf,
    pub tool_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Maximum pending queue entries; 0 disables the limit.
    pub max_queue_len: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            jobs_dir: cwd.join("jobs"),
            database_path: cwd.join(DATABASE_FILE_NAME),
            openssl_path: PathBuf::from("openssl"),
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT.as_secs(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_queue_len: DEFAULT_MAX_QUEUE_LEN,
        }
    }
}

impl AppConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file, then applies environment overrides.
    /// Keys missing from the file keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config = Self::from_json(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(content)?;
        Ok(config)
    }

    /// Overrides fields from `CSR_JOBS`, `CSR_DB` and `CSR_OPENSSL`. Empty
    /// values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(dir) = env_path(ENV_JOBS_DIR) {
            self.jobs_dir = dir;
        }
        if let Some(dir) = env_path(ENV_DB_DIR) {
            self.database_path = dir.join(DATABASE_FILE_NAME);
        }
        if let Some(program) = env_path(ENV_OPENSSL) {
            self.openssl_path = program;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                message: "tool_timeout_secs must be greater than 0".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation {
                message: "poll_interval_ms must be greater than 0".to_string(),
            });
        }
        if self.jobs_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: "jobs_dir must not be empty".to_string(),
            });
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                message: "database_path must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn queue_limit(&self) -> Option<u64> {
        match self.max_queue_len {
            0 => None,
            limit => Some(limit),
        }
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
