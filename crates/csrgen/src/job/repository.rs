//! Job repository: the only code that writes job records or job files.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};

use super::{IdGenerator, Job, JobError, JobId, JobPaths, JobStatus, RandomIdGenerator};
use crate::db::job_repo::{self, JobRow};
use crate::db::queue_repo::{self, QueueEntry};
use crate::db::{Database, DatabaseError};

/// Attempts at finding an unused id before `create` gives up.
const MAX_ID_ATTEMPTS: u32 = 64;

/// Outcome of the enqueue transaction, decided while the row is locked.
enum EnqueueDecision {
    Missing,
    Rejected(JobStatus),
    Corrupt(i64),
    Full(u64),
    Queued,
}

/// Job records in SQLite plus their folders under the jobs directory.
///
/// Cloning is cheap; clones share the same database handle.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
    jobs_dir: PathBuf,
    id_generator: Arc<dyn IdGenerator>,
    max_queue_len: Option<u64>,
}

impl JobRepository {
    pub fn new(db: Database, jobs_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            jobs_dir: jobs_dir.into(),
            id_generator: Arc::new(RandomIdGenerator),
            max_queue_len: None,
        }
    }

    /// Replaces the id source. Used by tests to force collisions.
    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Caps the number of pending queue entries; `None` is unbounded.
    pub fn with_max_queue_len(mut self, max_queue_len: Option<u64>) -> Self {
        self.max_queue_len = max_queue_len;
        self
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    pub fn paths(&self, id: &JobId) -> JobPaths {
        JobPaths::new(&self.jobs_dir, id)
    }

    /// Creates the jobs directory if it does not exist yet.
    pub fn ensure_jobs_dir(&self) -> Result<(), JobError> {
        fs::create_dir_all(&self.jobs_dir).map_err(|e| JobError::Io {
            path: self.jobs_dir.clone(),
            source: e,
        })
    }

    /// Creates a job in [`JobStatus::Created`] and writes its config file.
    ///
    /// Id collisions (in the table or with a leftover folder) are retried
    /// with a fresh id. If writing the folder or file fails after the row was
    /// inserted, the row is left behind for the startup sweep to remove.
    pub fn create(&self, config_text: &str, key_size: u32) -> Result<JobId, JobError> {
        if key_size == 0 {
            return Err(JobError::InvalidKeySize(key_size));
        }
        self.ensure_jobs_dir()?;

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = self.id_generator.generate()?;
            let row = JobRow {
                id: id.to_string(),
                key_size,
                status: JobStatus::Created.as_i64(),
                error_message: None,
            };

            match self.db.with_conn(|conn| job_repo::insert(conn, &row)) {
                Ok(()) => {}
                Err(DatabaseError::DuplicateId(_)) => {
                    debug!("Job id collision on attempt {}, regenerating", attempt);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let paths = self.paths(&id);
            match fs::create_dir(&paths.folder) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    // A folder without a record; leave it for the operator.
                    warn!(
                        "Folder {} already exists without a job record, choosing another id",
                        paths.folder.display()
                    );
                    self.db.with_conn(|conn| job_repo::delete(conn, id.as_str()))?;
                    continue;
                }
                Err(e) => {
                    return Err(JobError::Io {
                        path: paths.folder,
                        source: e,
                    })
                }
            }

            fs::write(&paths.config, config_text).map_err(|e| JobError::Io {
                path: paths.config.clone(),
                source: e,
            })?;

            info!("Created job {} ({}-bit key)", id, key_size);
            return Ok(id);
        }

        Err(JobError::IdSpaceExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Loads a job and its config file contents.
    pub fn get(&self, id: impl AsRef<str>) -> Result<Job, JobError> {
        let (id, row) = self.find_row(id.as_ref())?;
        let status = parse_status(&row)?;
        let paths = self.paths(&id);

        let config =
            fs::read_to_string(&paths.config).map_err(|e| JobError::MissingArtifact {
                id: id.to_string(),
                path: paths.config.clone(),
                source: e,
            })?;

        Ok(Job {
            id,
            key_size: row.key_size,
            status,
            error_message: row.error_message,
            config,
        })
    }

    /// Lists every job. All-or-nothing: the first job that cannot be loaded
    /// fails the whole listing. See [`list_partial`](Self::list_partial).
    pub fn list(&self) -> Result<Vec<Job>, JobError> {
        self.list_partial()?.into_iter().collect()
    }

    /// Lists every job, resolving each one independently.
    pub fn list_partial(&self) -> Result<Vec<Result<Job, JobError>>, JobError> {
        let ids = self.db.with_conn(job_repo::list_ids)?;
        Ok(ids.iter().map(|id| self.get(id)).collect())
    }

    /// Sets the status. Unknown ids are ignored.
    pub fn set_status(&self, id: impl AsRef<str>, status: JobStatus) -> Result<(), JobError> {
        let id = id.as_ref();
        let updated = self
            .db
            .with_conn(|conn| job_repo::update_status(conn, id, status.as_i64()))?;
        if updated == 0 {
            debug!("Ignoring status update for unknown job {}", id);
        }
        Ok(())
    }

    /// Stores the error message, or clears it when `message` is `None`.
    /// Unknown ids are ignored.
    pub fn set_error_message(
        &self,
        id: impl AsRef<str>,
        message: Option<&str>,
    ) -> Result<(), JobError> {
        let id = id.as_ref();
        self.db
            .with_conn(|conn| job_repo::update_error_message(conn, id, message))?;
        Ok(())
    }

    /// Overwrites the config file. The status is left alone, including for
    /// generated jobs whose key and CSR then no longer match the config.
    pub fn update_config(&self, id: impl AsRef<str>, config_text: &str) -> Result<(), JobError> {
        let (id, _) = self.find_row(id.as_ref())?;
        let paths = self.paths(&id);

        fs::write(&paths.config, config_text).map_err(|e| match e.kind() {
            ErrorKind::NotFound => JobError::MissingArtifact {
                id: id.to_string(),
                path: paths.config.clone(),
                source: e,
            },
            _ => JobError::Io {
                path: paths.config.clone(),
                source: e,
            },
        })
    }

    /// Moves the job to [`JobStatus::Queued`] and appends it to the queue in
    /// one transaction.
    pub fn enqueue(&self, id: impl AsRef<str>) -> Result<(), JobError> {
        // Same lookup as `get`, so missing files are reported before queueing.
        let job = self.get(id)?;
        let key = job.id.as_str();
        let timestamp = Utc::now().timestamp();
        let limit = self.max_queue_len;

        let decision = self.db.with_transaction(|conn| {
            let Some(row) = job_repo::find_by_id(conn, key)? else {
                return Ok(EnqueueDecision::Missing);
            };
            let Some(status) = JobStatus::from_i64(row.status) else {
                return Ok(EnqueueDecision::Corrupt(row.status));
            };
            let Some(next) = status.on_enqueue() else {
                return Ok(EnqueueDecision::Rejected(status));
            };
            if let Some(limit) = limit {
                if queue_repo::len(conn)? >= limit {
                    return Ok(EnqueueDecision::Full(limit));
                }
            }

            job_repo::update_status(conn, key, next.as_i64())?;
            queue_repo::push(conn, key, timestamp)?;
            Ok(EnqueueDecision::Queued)
        })?;

        match decision {
            EnqueueDecision::Queued => {
                info!("Job {} queued for generation", key);
                Ok(())
            }
            EnqueueDecision::Missing => Err(JobError::NotFound { id: key.to_string() }),
            EnqueueDecision::Rejected(from) => Err(JobError::InvalidTransition {
                id: key.to_string(),
                from,
            }),
            EnqueueDecision::Corrupt(value) => Err(JobError::InvalidStatus {
                id: key.to_string(),
                value,
            }),
            EnqueueDecision::Full(limit) => {
                warn!("Rejecting job {}: queue holds {} entries", key, limit);
                Err(JobError::QueueFull { limit })
            }
        }
    }

    /// Reads the generated private key.
    pub fn read_key(&self, id: impl AsRef<str>) -> Result<String, JobError> {
        self.read_artifact(id.as_ref(), |paths| paths.key)
    }

    /// Reads the generated certificate signing request.
    pub fn read_csr(&self, id: impl AsRef<str>) -> Result<String, JobError> {
        self.read_artifact(id.as_ref(), |paths| paths.csr)
    }

    /// Number of entries waiting in the queue.
    pub fn queue_len(&self) -> Result<u64, JobError> {
        Ok(self.db.with_conn(queue_repo::len)?)
    }

    pub fn is_queued(&self, id: impl AsRef<str>) -> Result<bool, JobError> {
        let id = id.as_ref();
        Ok(self.db.with_conn(|conn| queue_repo::contains(conn, id))?)
    }

    pub(crate) fn next_queued(&self) -> Result<Option<QueueEntry>, JobError> {
        Ok(self.db.with_conn(queue_repo::peek_oldest)?)
    }

    /// Drops the entry the worker just handled. Entries added for the same
    /// job after it was taken are left alone.
    pub(crate) fn finish_queued(&self, entry: &QueueEntry) -> Result<(), JobError> {
        self.db
            .with_conn(|conn| queue_repo::remove_entry(conn, entry.rowid))?;
        Ok(())
    }

    /// Records a successful generation and consumes its queue entry in one
    /// transaction: clears the message, sets the status.
    pub(crate) fn record_success(
        &self,
        id: &JobId,
        status: JobStatus,
        entry: &QueueEntry,
    ) -> Result<(), JobError> {
        self.db.with_transaction(|conn| {
            job_repo::update_error_message(conn, id.as_str(), None)?;
            job_repo::update_status(conn, id.as_str(), status.as_i64())?;
            queue_repo::remove_entry(conn, entry.rowid)?;
            Ok(())
        })?;
        Ok(())
    }

    /// Records a failed generation with its diagnostic output and consumes
    /// its queue entry in one transaction.
    pub(crate) fn record_failure(
        &self,
        id: &JobId,
        status: JobStatus,
        message: &str,
        entry: &QueueEntry,
    ) -> Result<(), JobError> {
        self.db.with_transaction(|conn| {
            job_repo::update_error_message(conn, id.as_str(), Some(message))?;
            job_repo::update_status(conn, id.as_str(), status.as_i64())?;
            queue_repo::remove_entry(conn, entry.rowid)?;
            Ok(())
        })?;
        Ok(())
    }

    pub(crate) fn rows(&self) -> Result<Vec<JobRow>, JobError> {
        Ok(self.db.with_conn(job_repo::list_rows)?)
    }

    pub(crate) fn has_record(&self, id: &str) -> Result<bool, JobError> {
        Ok(self.db.with_conn(|conn| job_repo::exists(conn, id))?)
    }

    /// Deletes the record with its queue entries, then the folder. Folder
    /// removal is best-effort and skipped for ids that are not valid folder
    /// names.
    pub(crate) fn remove(&self, id: &str) -> Result<(), JobError> {
        self.db.with_transaction(|conn| {
            job_repo::delete(conn, id)?;
            queue_repo::remove_job(conn, id)?;
            Ok(())
        })?;

        let Some(job_id) = JobId::parse(id) else {
            return Ok(());
        };
        let folder = self.paths(&job_id).folder;
        match fs::remove_dir_all(&folder) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove folder {}: {}", folder.display(), e),
        }
        Ok(())
    }

    fn find_row(&self, id: &str) -> Result<(JobId, JobRow), JobError> {
        let not_found = || JobError::NotFound { id: id.to_string() };
        let job_id = JobId::parse(id).ok_or_else(not_found)?;
        let row = self
            .db
            .with_conn(|conn| job_repo::find_by_id(conn, id))?
            .ok_or_else(not_found)?;
        Ok((job_id, row))
    }

    fn read_artifact(
        &self,
        id: &str,
        select: impl FnOnce(JobPaths) -> PathBuf,
    ) -> Result<String, JobError> {
        let job = self.get(id)?;
        if !job.status.has_artifacts() {
            return Err(JobError::NotGenerated {
                id: job.id.to_string(),
                status: job.status,
            });
        }

        let path = select(self.paths(&job.id));
        fs::read_to_string(&path).map_err(|e| JobError::MissingArtifact {
            id: job.id.to_string(),
            path,
            source: e,
        })
    }
}

fn parse_status(row: &JobRow) -> Result<JobStatus, JobError> {
    JobStatus::from_i64(row.status).ok_or_else(|| JobError::InvalidStatus {
        id: row.id.clone(),
        value: row.status,
    })
}
