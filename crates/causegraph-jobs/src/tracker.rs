//! Job progress tracking
//!
//! The tracker owns a job's `{status, progress, total}` while the job runs.
//! Every change is written to the job store and then emitted to the event
//! sink supplied at construction.
//!
//! State machine:
//!
//! ```text
//! queued -> cause_effect -> create_clusters -> finished   (clustering)
//! queued -> cause_effect -> finished                      (no clustering)
//! any live status -> failed
//! ```
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use causegraph_core::{
    CausalError, EventSink, JobEvent, JobFailure, JobResult, JobStatus, Result,
};

use crate::store::JobStore;

/// Single writer of one job's status and progress
pub struct JobProgressTracker {
    job_id: Uuid,
    status: JobStatus,
    progress: usize,
    total: usize,
    cluster_requested: bool,
    result: Option<Arc<JobResult>>,
    failure: Option<JobFailure>,
    store: JobStore,
    sink: Arc<dyn EventSink>,
}

impl JobProgressTracker {
    /// Create a tracker for a queued job
    ///
    /// # Arguments
    /// * `job_id` - Job whose record this tracker writes
    /// * `cluster_requested` - Whether the job must pass through `create_clusters`
    /// * `store` - Job store receiving every change
    /// * `sink` - Receiver of the status event emitted after every change
    pub fn new(
        job_id: Uuid,
        cluster_requested: bool,
        store: JobStore,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            progress: 0,
            total: 0,
            cluster_requested,
            result: None,
            failure: None,
            store,
            sink,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> usize {
        self.progress
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Enter `cause_effect` with a known total; emits a progress-0 event
    pub async fn start(&mut self, total: usize) -> Result<()> {
        self.check_transition(JobStatus::CauseEffect)?;
        self.total = total;
        self.progress = 0;
        self.status = JobStatus::CauseEffect;
        self.commit(None, None).await;
        Ok(())
    }

    /// Record that `new_progress` rows are done
    pub async fn advance(&mut self, new_progress: usize) -> Result<()> {
        if self.status != JobStatus::CauseEffect {
            return Err(CausalError::InternalConsistency(format!(
                "progress reported in status {}",
                self.status
            )));
        }
        if new_progress < self.progress || new_progress > self.total {
            return Err(CausalError::InternalConsistency(format!(
                "progress {new_progress} outside {}..={}",
                self.progress, self.total
            )));
        }

        self.progress = new_progress;
        self.commit(None, None).await;
        Ok(())
    }

    /// Move to a non-terminal status
    ///
    /// Terminal statuses are reached through [`finish`](Self::finish) and
    /// [`fail`](Self::fail), which carry the payload.
    pub async fn set_status(&mut self, next: JobStatus) -> Result<()> {
        if next.is_terminal() {
            return Err(CausalError::InternalConsistency(format!(
                "terminal status {next} requires a payload"
            )));
        }
        self.check_transition(next)?;

        self.status = next;
        self.commit(None, None).await;
        Ok(())
    }

    /// Enter `finished` and emit the terminal event with the result
    pub async fn finish(&mut self, result: Arc<JobResult>) -> Result<()> {
        self.check_transition(JobStatus::Finished)?;

        self.status = JobStatus::Finished;
        self.result = Some(Arc::clone(&result));
        self.commit(Some(result), None).await;
        tracing::info!(job_id = %self.job_id, total = self.total, "Job finished");
        Ok(())
    }

    /// Enter `failed` and emit the terminal event with the reason
    ///
    /// Does nothing if the job already reached a terminal status.
    pub async fn fail(&mut self, err: &CausalError) {
        if self.status.is_terminal() {
            tracing::warn!(
                job_id = %self.job_id,
                status = %self.status,
                error = %err,
                "Ignoring failure of a terminal job"
            );
            return;
        }

        tracing::error!(
            job_id = %self.job_id,
            kind = ?err.kind(),
            internal = err.is_internal(),
            error = %err,
            "Job failed"
        );
        let failure = JobFailure::from(err);
        self.status = JobStatus::Failed;
        self.failure = Some(failure.clone());
        self.commit(None, Some(failure)).await;
    }

    /// Write and emit the terminal state again
    ///
    /// A terminal commit cut short between the store write and the emit
    /// leaves the record or the subscribers behind; this repairs both.
    /// Returns `false` while the job is still live.
    pub async fn recommit_terminal(&self) -> bool {
        if !self.status.is_terminal() {
            return false;
        }
        self.commit(self.result.clone(), self.failure.clone()).await;
        true
    }

    fn check_transition(&self, next: JobStatus) -> Result<()> {
        let allowed = self.status.can_transition_to(next)
            && match (self.status, next) {
                (JobStatus::CauseEffect, JobStatus::CreateClusters) => self.cluster_requested,
                (JobStatus::CauseEffect, JobStatus::Finished) => !self.cluster_requested,
                _ => true,
            };

        if allowed {
            Ok(())
        } else {
            Err(CausalError::InternalConsistency(format!(
                "invalid job transition {} -> {next} (clustering: {})",
                self.status, self.cluster_requested
            )))
        }
    }

    /// Persist the current fields, then emit them
    async fn commit(&self, result: Option<Arc<JobResult>>, failure: Option<JobFailure>) {
        let (status, progress, total) = (self.status, self.progress, self.total);
        let terminal = status.is_terminal();
        let stored_result = result.clone();
        let stored_failure = failure.clone();

        let updated = self
            .store
            .update(self.job_id, move |job| {
                job.status = status;
                job.progress = progress;
                job.total = total;
                if terminal {
                    job.result = stored_result;
                    job.failure = stored_failure;
                    job.completed_at = Some(Utc::now());
                }
            })
            .await;
        if updated.is_none() {
            tracing::warn!(job_id = %self.job_id, "Job record missing, event not persisted");
        }

        tracing::debug!(job_id = %self.job_id, %status, progress, total, "Job progress");
        self.sink.emit(JobEvent {
            job_id: self.job_id,
            status,
            progress,
            total,
            result,
            failure,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
