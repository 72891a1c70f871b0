//! Bounded worker pool behind [`Dispatcher::send_async`](crate::Dispatcher::send_async).
//!
//! Jobs wait in a bounded channel; at most `workers` deliveries run at
//! once. A full channel rejects new jobs instead of blocking the caller.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use logship_core::LogRecord;
use logship_core::logging;

use crate::dispatcher::{Delivery, DispatcherConfig};

/// One queued async send.
pub(crate) struct Job {
    pub record: Box<dyn LogRecord>,
    pub requested: Option<String>,
}

/// Why a job was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitError {
    Full,
    Closed,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Full => f.write_str("dispatch queue full"),
            SubmitError::Closed => f.write_str("dispatcher shut down"),
        }
    }
}

pub(crate) struct WorkerPool {
    job_tx: mpsc::Sender<Job>,
    shutdown_tx: mpsc::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn start(delivery: Delivery, config: &DispatcherConfig) -> Self {
        let (job_tx, job_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let workers = config.workers.max(1);

        info!(
            subsystem = logging::SUBSYSTEM_DISPATCH,
            component = "worker",
            workers,
            queue_capacity = config.queue_capacity,
            "Dispatch worker pool started"
        );

        let handle = tokio::spawn(run(delivery, job_rx, shutdown_rx, workers));
        Self {
            job_tx,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue a job without waiting. The job comes back on rejection.
    pub(crate) fn try_submit(&self, job: Job) -> Result<(), (Job, SubmitError)> {
        self.job_tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => (job, SubmitError::Full),
            mpsc::error::TrySendError::Closed(job) => (job, SubmitError::Closed),
        })
    }

    /// Close the queue and wait until every accepted job has finished.
    /// Later calls return immediately.
    pub(crate) async fn shutdown(&self) {
        let Some(handle) = self.handle.lock().await.take() else {
            return;
        };
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = handle.await {
            error!(
                subsystem = logging::SUBSYSTEM_DISPATCH,
                component = "worker",
                error = ?e,
                "Dispatch worker loop panicked"
            );
        }
    }
}

async fn run(
    delivery: Delivery,
    mut job_rx: mpsc::Receiver<Job>,
    mut shutdown_rx: mpsc::Receiver<()>,
    workers: usize,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!(
                    subsystem = logging::SUBSYSTEM_DISPATCH,
                    component = "worker",
                    "Dispatch worker pool received shutdown signal"
                );
                break;
            }
            job = job_rx.recv() => match job {
                Some(job) => spawn_job(&mut tasks, &permits, &delivery, job).await,
                None => break,
            },
        }

        while let Some(result) = tasks.try_join_next() {
            log_join_error(result);
        }
    }

    // Refuse new work, then finish what was already accepted.
    job_rx.close();
    let mut drained = 0usize;
    while let Some(job) = job_rx.recv().await {
        drained += 1;
        spawn_job(&mut tasks, &permits, &delivery, job).await;
    }
    while let Some(result) = tasks.join_next().await {
        log_join_error(result);
    }

    info!(
        subsystem = logging::SUBSYSTEM_DISPATCH,
        component = "worker",
        drained,
        "Dispatch worker pool stopped"
    );
}

/// Wait for a free worker, then run the delivery in the background.
async fn spawn_job(
    tasks: &mut JoinSet<()>,
    permits: &Arc<Semaphore>,
    delivery: &Delivery,
    job: Job,
) {
    let Ok(permit) = permits.clone().acquire_owned().await else {
        return;
    };
    let delivery = delivery.clone();
    tasks.spawn(async move {
        let _permit = permit;
        let state = delivery
            .deliver_isolated(job.record.as_ref(), job.requested.as_deref())
            .await;
        debug!(
            subsystem = logging::SUBSYSTEM_DISPATCH,
            component = "worker",
            record_id = job.record.id(),
            state = %state,
            "Async send finished"
        );
    });
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(
            subsystem = logging::SUBSYSTEM_DISPATCH,
            component = "worker",
            error = ?e,
            "Delivery task panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_error_display() {
        assert_eq!(SubmitError::Full.to_string(), "dispatch queue full");
        assert_eq!(SubmitError::Closed.to_string(), "dispatcher shut down");
    }
}
