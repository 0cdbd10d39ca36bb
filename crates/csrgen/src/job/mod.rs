//! Jobs: one CSR generation request each, with its lifecycle state and the
//! files it owns under the jobs directory.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub mod error;
pub mod id;
pub mod repository;

pub use error::JobError;
pub use id::{IdGenerator, JobId, RandomIdGenerator, ID_ALPHABET, ID_LEN};
pub use repository::JobRepository;

/// Key sizes the submission form offers.
pub const SUPPORTED_KEY_SIZES: &[u32] = &[2048, 4096];

/// Checks a submitted key size against [`SUPPORTED_KEY_SIZES`].
pub fn validate_key_size(key_size: u32) -> Result<u32, JobError> {
    if SUPPORTED_KEY_SIZES.contains(&key_size) {
        Ok(key_size)
    } else {
        Err(JobError::InvalidKeySize(key_size))
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// Created ──enqueue──▶ Queued ──tool ok──▶ Generated
///                        ▲  └───tool fail──▶ Error
///                        └──enqueue── Error | Generated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Queued,
    Generated,
    Error,
}

impl JobStatus {
    /// Integer stored in the `status` column.
    pub fn as_i64(self) -> i64 {
        match self {
            JobStatus::Created => 0,
            JobStatus::Queued => 1,
            JobStatus::Generated => 2,
            JobStatus::Error => 3,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(JobStatus::Created),
            1 => Some(JobStatus::Queued),
            2 => Some(JobStatus::Generated),
            3 => Some(JobStatus::Error),
            _ => None,
        }
    }

    /// State after a user enqueues the job, or `None` if it is already
    /// waiting in the queue.
    pub fn on_enqueue(self) -> Option<JobStatus> {
        match self {
            JobStatus::Created | JobStatus::Error | JobStatus::Generated => {
                Some(JobStatus::Queued)
            }
            JobStatus::Queued => None,
        }
    }

    /// State after the generation tool has run, or `None` if the job was not
    /// waiting in the queue and must not be generated.
    pub fn on_generation(self, succeeded: bool) -> Option<JobStatus> {
        match self {
            JobStatus::Queued if succeeded => Some(JobStatus::Generated),
            JobStatus::Queued => Some(JobStatus::Error),
            JobStatus::Created | JobStatus::Generated | JobStatus::Error => None,
        }
    }

    /// Whether the key and CSR files must exist on disk.
    pub fn has_artifacts(self) -> bool {
        match self {
            JobStatus::Generated => true,
            JobStatus::Created | JobStatus::Queued | JobStatus::Error => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Generated => "generated",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job as seen by request handlers: the stored record plus the current
/// contents of its config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub key_size: u32,
    pub status: JobStatus,
    /// Diagnostic output of the last failed generation. Only set in
    /// [`JobStatus::Error`].
    pub error_message: Option<String>,
    pub config: String,
}

/// Locations of a job's files: `<jobs_dir>/<id>/<id>.{conf,key,csr}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub folder: PathBuf,
    pub config: PathBuf,
    pub key: PathBuf,
    pub csr: PathBuf,
}

impl JobPaths {
    pub fn new(jobs_dir: &Path, id: &JobId) -> Self {
        let folder = jobs_dir.join(id.as_str());
        Self {
            config: folder.join(format!("{}.conf", id)),
            key: folder.join(format!("{}.key", id)),
            csr: folder.join(format!("{}.csr", id)),
            folder,
        }
    }
}
