//! Worker pool
//!
//! Independent workers pull job ids from the shared queue and execute them
//! one at a time. Shutdown stops claiming new work; a job already claimed
//! runs to its terminal status.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::service::JobService;

/// Handle to a running set of job workers
pub struct WorkerPool {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers on the current runtime
    pub fn spawn(service: Arc<JobService>, size: usize) -> Self {
        let shutdown = CancellationToken::new();
        let handles = (0..size.max(1))
            .map(|worker_id| {
                let service = Arc::clone(&service);
                let shutdown = shutdown.clone();
                tokio::spawn(work(worker_id, service, shutdown))
            })
            .collect();

        tracing::info!(workers = size.max(1), "Worker pool started");
        Self { shutdown, handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stop claiming jobs and wait for in-flight jobs to finish
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn work(worker_id: usize, service: Arc<JobService>, shutdown: CancellationToken) {
    tracing::debug!(worker_id, "Worker ready");
    loop {
        let job_id = tokio::select! {
            _ = shutdown.cancelled() => break,
            job_id = service.queue().claim() => job_id,
        };

        tracing::info!(worker_id, %job_id, "Job claimed");
        if let Err(e) = service.execute(job_id).await {
            tracing::warn!(worker_id, %job_id, error = %e, "Job ended in failure");
        }
    }
    tracing::debug!(worker_id, "Worker exiting");
}
