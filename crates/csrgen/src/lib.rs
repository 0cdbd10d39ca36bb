pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod job;
pub mod logging;
pub mod sweep;
pub mod worker;

pub use app::App;
pub use config::AppConfig;
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, CsrgenError, GeneratorError, LoggingError, Result, WorkerError};
pub use generator::{CsrGenerator, GenerationOutput, GenerationRequest, OpensslGenerator};
pub use job::{Job, JobError, JobId, JobPaths, JobRepository, JobStatus};
pub use sweep::{reconcile, SweepReport};
pub use worker::{QueueProcessor, QueueWorker, TickOutcome, WorkerConfig};
