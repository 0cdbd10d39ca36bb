//! One step of the queue worker: take the oldest entry, run the tool, record
//! the outcome.

use std::sync::Arc;

use log::{info, warn};
use tracing::{info_span, Instrument};

use crate::db::queue_repo::QueueEntry;
use crate::generator::{CsrGenerator, GenerationOutput, GenerationRequest};
use crate::job::{Job, JobError, JobId, JobRepository, JobStatus};

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The queue was empty.
    Idle,
    Generated { job_id: JobId },
    Failed {
        job_id: JobId,
        exit_code: Option<i32>,
    },
    /// The entry was dropped without running the tool.
    Skipped { job_id: String, reason: String },
}

pub struct QueueProcessor {
    repo: JobRepository,
    generator: Arc<dyn CsrGenerator>,
}

impl QueueProcessor {
    pub fn new(repo: JobRepository, generator: Arc<dyn CsrGenerator>) -> Self {
        Self { repo, generator }
    }

    pub fn repository(&self) -> &JobRepository {
        &self.repo
    }

    /// Processes the oldest queue entry, if any.
    ///
    /// The entry is consumed in the same transaction that records the
    /// outcome, whether generation succeeded or not. If recording fails the
    /// entry stays so the next tick picks it up again.
    pub async fn tick(&self) -> Result<TickOutcome, JobError> {
        let Some(entry) = self.repo.next_queued()? else {
            return Ok(TickOutcome::Idle);
        };

        let span = info_span!("worker.tick", job_id = %entry.job_id);
        self.process(&entry).instrument(span).await
    }

    async fn process(&self, entry: &QueueEntry) -> Result<TickOutcome, JobError> {
        let job = match self.repo.get(&entry.job_id) {
            Ok(job) => job,
            Err(JobError::NotFound { .. }) => {
                warn!("Queued job {} no longer exists, dropping it", entry.job_id);
                return self.skip(entry, "job not found".to_string());
            }
            Err(e @ (JobError::MissingArtifact { .. } | JobError::InvalidStatus { .. })) => {
                return self.fail_without_running(entry, e);
            }
            Err(e) => return Err(e),
        };

        let (Some(on_success), Some(on_failure)) = (
            job.status.on_generation(true),
            job.status.on_generation(false),
        ) else {
            warn!(
                "Job {} is {} rather than queued, dropping its queue entry",
                job.id, job.status
            );
            return self.skip(entry, format!("job is {}", job.status));
        };

        let output = self.run_tool(&job).await;
        let next = if output.success { on_success } else { on_failure };
        self.record(&job, next, output, entry)
    }

    async fn run_tool(&self, job: &Job) -> GenerationOutput {
        let paths = self.repo.paths(&job.id);
        let request = GenerationRequest::for_job(&paths, job.key_size);

        let output = match self.generator.generate(&request).await {
            Ok(output) => output,
            Err(e) => GenerationOutput::failed(None, e.to_string()),
        };

        if output.success && !(paths.key.is_file() && paths.csr.is_file()) {
            return GenerationOutput::failed(
                output.exit_code,
                format!(
                    "{}\nThe generation tool reported success but did not write both {} and {}.",
                    output.output,
                    paths.key.display(),
                    paths.csr.display()
                ),
            );
        }
        output
    }

    fn record(
        &self,
        job: &Job,
        next: JobStatus,
        output: GenerationOutput,
        entry: &QueueEntry,
    ) -> Result<TickOutcome, JobError> {
        if output.success {
            self.repo.record_success(&job.id, next, entry)?;
            info!("Generated key and CSR for job {}", job.id);
            Ok(TickOutcome::Generated {
                job_id: job.id.clone(),
            })
        } else {
            self.repo
                .record_failure(&job.id, next, &output.output, entry)?;
            warn!(
                "Generation failed for job {} (exit code {:?}): {}",
                job.id,
                output.exit_code,
                output.output.trim_end()
            );
            Ok(TickOutcome::Failed {
                job_id: job.id.clone(),
                exit_code: output.exit_code,
            })
        }
    }

    fn skip(&self, entry: &QueueEntry, reason: String) -> Result<TickOutcome, JobError> {
        self.repo.finish_queued(entry)?;
        Ok(TickOutcome::Skipped {
            job_id: entry.job_id.clone(),
            reason,
        })
    }

    /// The record exists but cannot be generated as stored (config file
    /// unreadable, status value unknown): the job fails without running the
    /// tool.
    fn fail_without_running(
        &self,
        entry: &QueueEntry,
        error: JobError,
    ) -> Result<TickOutcome, JobError> {
        let Some(id) = JobId::parse(&entry.job_id) else {
            return self.skip(entry, error.to_string());
        };
        let message = error.to_string();
        self.repo
            .record_failure(&id, JobStatus::Error, &message, entry)?;
        warn!("Job {} cannot be generated: {}", id, message);
        Ok(TickOutcome::Failed {
            job_id: id,
            exit_code: None,
        })
    }
}
