pub mod processor;
pub mod queue_worker;

pub use processor::{QueueProcessor, TickOutcome};
pub use queue_worker::{QueueWorker, WorkerConfig};
