//! Job repository error types.

use std::path::PathBuf;
use thiserror::Error;

use super::JobStatus;
use crate::db::DatabaseError;

/// Errors surfaced by [`JobRepository`](super::JobRepository) operations.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("No job found with id '{id}'")]
    NotFound { id: String },

    #[error("Could not read '{path}' for job '{id}': {source}")]
    MissingArtifact {
        id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Job '{id}' hasn't been generated yet (status: {status})")]
    NotGenerated { id: String, status: JobStatus },

    #[error("Job '{id}' has unknown status value {value}")]
    InvalidStatus { id: String, value: i64 },

    #[error("Job '{id}' cannot be queued while {from}")]
    InvalidTransition { id: String, from: JobStatus },

    #[error("Invalid key size {0}: must be a positive number of bits")]
    InvalidKeySize(u32),

    #[error("The generation queue is full ({limit} pending jobs)")]
    QueueFull { limit: u64 },

    #[error("Could not allocate a unique job id after {attempts} attempts")]
    IdSpaceExhausted { attempts: u32 },

    #[error("Failed to gather randomness for a job id: {0}")]
    Entropy(String),

    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl JobError {
    /// True for errors a request handler should present as "not found":
    /// an unknown id, a job whose files are gone, or artifacts that do not
    /// exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            JobError::NotFound { .. }
                | JobError::MissingArtifact { .. }
                | JobError::NotGenerated { .. }
        )
    }
}
