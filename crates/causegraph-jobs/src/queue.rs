//! FIFO work queue
//!
//! Queued job ids waiting for a worker. Claiming pops under the queue lock,
//! so no two workers ever claim the same job.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// Shared first-in-first-out queue of job ids
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Mutex<VecDeque<Uuid>>,
    available: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job, returning its 0-based position (jobs ahead of it)
    pub async fn enqueue(&self, job_id: Uuid) -> usize {
        let position = {
            let mut pending = self.pending.lock().await;
            pending.push_back(job_id);
            pending.len() - 1
        };
        self.available.notify_one();
        position
    }

    /// Claim the oldest job, waiting until one is available
    pub async fn claim(&self) -> Uuid {
        loop {
            if let Some(job_id) = self.try_claim().await {
                return job_id;
            }
            self.available.notified().await;
        }
    }

    /// Claim the oldest job if there is one
    pub async fn try_claim(&self) -> Option<Uuid> {
        let mut pending = self.pending.lock().await;
        let job_id = pending.pop_front();
        // Pass the wakeup on if more work is left
        if job_id.is_some() && !pending.is_empty() {
            self.available.notify_one();
        }
        job_id
    }

    /// Withdraw a queued job. Returns false if it was already claimed.
    pub async fn remove(&self, job_id: Uuid) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.iter().position(|id| *id == job_id) {
            Some(index) => pending.remove(index).is_some(),
            None => false,
        }
    }

    /// Current 0-based position of a queued job
    pub async fn position(&self, job_id: Uuid) -> Option<usize> {
        self.pending
            .lock()
            .await
            .iter()
            .position(|id| *id == job_id)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}
