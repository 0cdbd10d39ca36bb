//! Process lifecycle: open the store, repair drift, run the worker.

use std::sync::Arc;

use log::info;

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::Result;
use crate::generator::{CsrGenerator, OpensslGenerator};
use crate::job::{JobError, JobRepository};
use crate::sweep::{self, SweepReport};
use crate::worker::{QueueProcessor, QueueWorker, WorkerConfig};

/// A running service: the repository request handlers call into, plus the
/// queue worker behind it.
pub struct App {
    repository: JobRepository,
    worker: Option<QueueWorker>,
    sweep_report: SweepReport,
}

impl App {
    /// Starts the service. The sweep always completes before the worker
    /// takes its first queue entry.
    pub fn start(config: &AppConfig, generator: Arc<dyn CsrGenerator>) -> Result<Self> {
        config.validate()?;

        std::fs::create_dir_all(&config.jobs_dir).map_err(|e| JobError::Io {
            path: config.jobs_dir.clone(),
            source: e,
        })?;

        let db = Database::open(&config.database_path)?;
        let repository = JobRepository::new(db, &config.jobs_dir)
            .with_max_queue_len(config.queue_limit());

        let sweep_report = sweep::reconcile(&repository)?;

        let processor = QueueProcessor::new(repository.clone(), generator);
        let worker = QueueWorker::start(
            processor,
            WorkerConfig {
                poll_interval: config.poll_interval(),
            },
        )?;

        info!(
            "csrgen started (jobs: {}, database: {})",
            config.jobs_dir.display(),
            config.database_path.display()
        );

        Ok(Self {
            repository,
            worker: Some(worker),
            sweep_report,
        })
    }

    /// Starts the service with the configured OpenSSL executable.
    pub fn with_openssl(config: &AppConfig) -> Result<Self> {
        let generator =
            OpensslGenerator::new(&config.openssl_path).with_timeout(config.tool_timeout());
        Self::start(config, Arc::new(generator))
    }

    pub fn repository(&self) -> &JobRepository {
        &self.repository
    }

    /// What the startup sweep repaired.
    pub fn sweep_report(&self) -> &SweepReport {
        &self.sweep_report
    }

    /// Stops the worker, letting an in-flight generation finish first.
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            worker.shutdown()?;
        }
        info!("csrgen stopped");
        Ok(())
    }
}
