use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::watch;

use super::processor::{QueueProcessor, TickOutcome};
use crate::error::WorkerError;

/// Default wait between polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// The single background worker draining the job queue.
///
/// Owns its thread and a stop channel. A stop request is observed as soon as
/// the worker is idle; a tool run in progress is always allowed to finish so
/// the job is recorded before the thread exits.
pub struct QueueWorker {
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl QueueWorker {
    pub fn start(processor: QueueProcessor, config: WorkerConfig) -> Result<Self, WorkerError> {
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = thread::Builder::new()
            .name("csrgen-queue".to_string())
            .spawn(move || run_worker(processor, config, stop_rx))
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        info!("Queue worker started");

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Asks the worker to exit after its current tick.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Waits for the worker thread to exit. Call [`stop`](Self::stop) first.
    pub fn join(mut self) -> Result<(), WorkerError> {
        self.join_inner()
    }

    /// Stops the worker and waits for it.
    pub fn shutdown(self) -> Result<(), WorkerError> {
        info!("Shutting down queue worker...");
        self.stop();
        self.join()
    }

    fn join_inner(&mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked),
            None => Ok(()),
        }
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
            if let Err(e) = self.join_inner() {
                error!("{}", e);
            }
        }
    }
}

fn run_worker(processor: QueueProcessor, config: WorkerConfig, mut stop_rx: watch::Receiver<bool>) {
    debug!("Queue worker thread started");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Queue worker could not build its runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async {
        loop {
            if *stop_rx.borrow() {
                break;
            }

            let idle = match processor.tick().await {
                Ok(TickOutcome::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    error!("Queue worker tick failed: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });

    info!("Queue worker stopped");
}
