//! Isolated filesystem layout for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use csrgen::config::DATABASE_FILE_NAME;
use csrgen::{AppConfig, Database, JobRepository};

/// A temp directory holding a jobs root and a database directory.
pub struct TestHarness {
    temp_dir: TempDir,
    pub jobs_dir: PathBuf,
    pub db_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let jobs_dir = temp_dir.path().join("jobs");
        let db_dir = temp_dir.path().join("data");
        std::fs::create_dir_all(&jobs_dir).expect("Failed to create jobs directory");

        Self {
            temp_dir,
            jobs_dir,
            db_dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn database_path(&self) -> PathBuf {
        self.db_dir.join(DATABASE_FILE_NAME)
    }

    /// Config pointing at this harness, with a short poll interval.
    pub fn config(&self) -> AppConfig {
        AppConfig {
            jobs_dir: self.jobs_dir.clone(),
            database_path: self.database_path(),
            openssl_path: PathBuf::from("openssl"),
            tool_timeout_secs: 10,
            poll_interval_ms: 10,
            max_queue_len: 1024,
        }
    }

    /// Opens a repository on the harness database, as a request handler would.
    pub fn repository(&self) -> JobRepository {
        let db = Database::open(&self.database_path()).expect("Failed to open database");
        JobRepository::new(db, &self.jobs_dir)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls `condition` for up to five seconds.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}
