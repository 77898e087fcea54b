//! Job service
//!
//! Facade shared by the API handlers and the worker pool: submission with
//! validation, status snapshots, deletion, progress subscriptions, the
//! clustering-only entry point, and execution of a claimed job.
//!
//! Author: hephaex@gmail.com

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use causegraph_core::{
    ArtifactSink, CausalError, ClusterParams, GraphRow, Job, JobRequest, JobStatus, RecordSource,
    Result, Row, TopicSummary, WorkerConfig,
};

use crate::events::{Subscription, SubscriptionRegistry};
use crate::orchestrator::{Deadline, JobOrchestrator, JobOutput};
use crate::queue::JobQueue;
use crate::store::JobStore;
use crate::tracker::JobProgressTracker;

/// Receipt of an accepted submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub job_id: Uuid,
    /// Jobs ahead of this one in the queue
    pub queue_position: usize,
}

pub struct JobService {
    store: JobStore,
    queue: Arc<JobQueue>,
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn RecordSource>,
    artifacts: Arc<dyn ArtifactSink>,
    orchestrator: Arc<JobOrchestrator>,
    job_timeout: Duration,
    max_rows: usize,
}

impl JobService {
    pub fn new(
        orchestrator: JobOrchestrator,
        source: Arc<dyn RecordSource>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store: JobStore::new(config.job_ttl()),
            queue: Arc::new(JobQueue::new()),
            registry: Arc::new(SubscriptionRegistry::new()),
            source,
            artifacts: orchestrator.artifacts(),
            orchestrator: Arc::new(orchestrator),
            job_timeout: config.job_timeout(),
            max_rows: config.max_rows,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn artifacts(&self) -> &dyn ArtifactSink {
        self.artifacts.as_ref()
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    // ------------------------------------------------------------------------
    // Submission surface
    // ------------------------------------------------------------------------

    /// Validate and queue a job
    ///
    /// Unknown sources and missing columns are rejected here, before
    /// anything is queued.
    pub async fn submit(&self, request: JobRequest) -> Result<Submission> {
        if request.column_name.trim().is_empty() {
            return Err(CausalError::Validation(
                "column_name must not be empty".to_string(),
            ));
        }

        let headers = self.source.headers(&request.source_reference).await?;
        if !headers.iter().any(|h| *h == request.column_name) {
            return Err(CausalError::Validation(format!(
                "Missing required column: {}",
                request.column_name
            )));
        }

        let job = Job::new(request, self.job_timeout);
        let job_id = job.id;
        self.store.insert(job).await;
        let queue_position = self.queue.enqueue(job_id).await;

        tracing::info!(%job_id, queue_position, "Job queued");
        Ok(Submission {
            job_id,
            queue_position,
        })
    }

    /// Current snapshot of a job
    pub async fn job(&self, job_id: Uuid) -> Result<Job> {
        self.store.require(job_id).await
    }

    pub async fn queue_position(&self, job_id: Uuid) -> Option<usize> {
        self.queue.position(job_id).await
    }

    /// Delete a queued or terminal job together with its artifact
    pub async fn delete(&self, job_id: Uuid) -> Result<()> {
        let job = self.store.require(job_id).await?;

        let withdrawn = job.status == JobStatus::Queued
            && self.queue.remove(job_id).await;
        if !withdrawn {
            // Re-read: the job may have been claimed or finished meanwhile
            let current = self.store.require(job_id).await?;
            if !current.status.is_terminal() {
                return Err(CausalError::Conflict(format!(
                    "Job {job_id} is running ({})",
                    current.status
                )));
            }
        }

        self.store.remove(job_id).await;
        self.registry.close(job_id);
        self.artifacts.remove(job_id).await?;
        tracing::info!(%job_id, "Job deleted");
        Ok(())
    }

    /// Join a job's progress room
    pub async fn subscribe(&self, job_id: Uuid) -> Result<Subscription> {
        // Subscribe first so no event falls between the check and the join
        let subscription = self.registry.subscribe(job_id);
        if !self.store.contains(job_id) {
            self.registry.unsubscribe(job_id, subscription.subscriber_id);
            return Err(CausalError::NotFound(format!("Job not found: {job_id}")));
        }
        Ok(subscription)
    }

    pub fn unsubscribe(&self, job_id: Uuid, subscriber_id: u64) -> bool {
        self.registry.unsubscribe(job_id, subscriber_id)
    }

    /// Clustering-only reconciliation of previously returned rows
    pub async fn recluster(
        &self,
        rows: &[Row],
        params: &ClusterParams,
    ) -> Result<(Vec<GraphRow>, TopicSummary)> {
        self.orchestrator.recluster(rows, params).await
    }

    /// Graph rows of a finished job as persisted
    pub async fn persisted_graph(&self, job_id: Uuid) -> Result<Vec<GraphRow>> {
        self.store.require(job_id).await?;
        self.artifacts.load(job_id).await
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Execute a claimed job to a terminal status
    ///
    /// The job's budget is enforced twice: the orchestrator checks it at
    /// every row boundary, and the whole run is wrapped in a timeout that
    /// catches a predictor or clusterer call overrunning it.
    pub async fn execute(&self, job_id: Uuid) -> Result<()> {
        let Some(job) = self.store.get(job_id).await else {
            tracing::warn!(%job_id, "Claimed job no longer exists");
            return Ok(());
        };

        let mut tracker = JobProgressTracker::new(
            job_id,
            job.request.cluster,
            self.store.clone(),
            self.registry.clone(),
        );
        let deadline = Deadline::after(job.timeout_budget());

        let outcome = tokio::time::timeout(
            deadline.budget(),
            self.run(&job, &mut tracker, deadline),
        )
        .await;

        match outcome {
            Ok(Ok(output)) => {
                tracing::info!(
                    %job_id,
                    persisted = output.persisted_rows,
                    returned = output.result.result_graph.len(),
                    artifact = %output.artifact.display(),
                    "Job completed"
                );
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) if tracker.status().is_terminal() => {
                // Deadline hit inside the terminal commit; the outcome stands
                tracing::warn!(
                    %job_id,
                    status = %tracker.status(),
                    "Deadline reached during terminal commit"
                );
                tracker.recommit_terminal().await;
                Ok(())
            }
            Err(_) => {
                let err = deadline.timeout();
                tracker.fail(&err).await;
                self.artifacts.remove(job_id).await?;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        job: &Job,
        tracker: &mut JobProgressTracker,
        deadline: Deadline,
    ) -> Result<JobOutput> {
        let dataset = match self
            .source
            .load(&job.request.source_reference, self.max_rows)
            .await
        {
            Ok(dataset) => dataset,
            Err(err) => {
                tracker.fail(&err).await;
                return Err(err);
            }
        };

        self.orchestrator
            .run(job.id, &dataset, &job.request, tracker, deadline)
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryArtifactStore, MemoryRecordSource, ScriptedPredictor, TableClusterer};
    use causegraph_core::FailureKind;

    fn config() -> WorkerConfig {
        WorkerConfig {
            pool_size: 1,
            job_timeout_secs: 60,
            max_rows: 3,
            job_ttl_secs: 3600,
        }
    }

    fn service(predictor: ScriptedPredictor) -> (JobService, Arc<MemoryArtifactStore>) {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let orchestrator = JobOrchestrator::new(
            Arc::new(predictor),
            Arc::new(TableClusterer::new(&[("rain", 0), ("floods", 1)])),
            artifacts.clone(),
        );
        let source = MemoryRecordSource::new().with_column(
            "weather.csv",
            "text",
            &["Rain causes floods", "Nothing", "More rain", "Cut off"],
        );
        (
            JobService::new(orchestrator, Arc::new(source), &config()),
            artifacts,
        )
    }

    fn predictor() -> ScriptedPredictor {
        ScriptedPredictor::new()
            .with("Rain causes floods", &[("rain", "floods")])
            .with("More rain", &[("rain", "floods")])
            .with("Cut off", &[("rain", "floods")])
    }

    fn request(column: &str) -> JobRequest {
        JobRequest {
            source_reference: "weather.csv".to_string(),
            column_name: column.to_string(),
            cluster: false,
            preprocess: false,
        }
    }

    #[tokio::test]
    async fn test_submit_reports_queue_position() {
        let (service, _) = service(predictor());

        let first = service.submit(request("text")).await.unwrap();
        let second = service.submit(request("text")).await.unwrap();

        assert_eq!(first.queue_position, 0);
        assert_eq!(second.queue_position, 1);
        assert_eq!(service.queue_position(second.job_id).await, Some(1));
        assert_eq!(service.job(first.job_id).await.unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_submit_rejects_missing_column_and_unknown_source() {
        let (service, _) = service(predictor());

        let err = service.submit(request("body")).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);

        let mut unknown = request("text");
        unknown.source_reference = "missing.csv".to_string();
        assert!(service.submit(unknown).await.is_err());
        assert!(service.queue().is_empty().await);
    }

    #[tokio::test]
    async fn test_execute_runs_to_finished_with_row_cap() {
        let (service, artifacts) = service(predictor());
        let submission = service.submit(request("text")).await.unwrap();
        let mut subscription = service.subscribe(submission.job_id).await.unwrap();

        let claimed = service.queue().claim().await;
        service.execute(claimed).await.unwrap();

        let job = service.job(submission.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Finished);
        // "Cut off" is past the row cap
        assert_eq!(job.total, 3);
        assert_eq!(artifacts.get(submission.job_id).unwrap().len(), 2);

        let mut last = None;
        while let Some(event) = subscription.recv().await {
            last = Some(event);
        }
        let last = last.unwrap();
        assert_eq!(last.status, JobStatus::Finished);
        assert_eq!(last.result.unwrap().result_graph.len(), 2);
    }

    #[tokio::test]
    async fn test_outer_timeout_fails_job() {
        let (service, artifacts) =
            service(predictor().with_delay(Duration::from_millis(1500)));
        let job = Job::new(request("text"), Duration::from_secs(1));
        let job_id = job.id;
        service.store().insert(job).await;

        let err = service.execute(job_id).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Timeout);
        let job = service.job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure.map(|f| f.kind), Some(FailureKind::Timeout));
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_delete_queued_and_finished_but_not_running() {
        let (service, artifacts) = service(predictor());

        let queued = service.submit(request("text")).await.unwrap();
        service.delete(queued.job_id).await.unwrap();
        assert!(service.job(queued.job_id).await.is_err());
        assert!(service.queue().is_empty().await);

        let finished = service.submit(request("text")).await.unwrap();
        let claimed = service.queue().claim().await;
        service.execute(claimed).await.unwrap();
        service.delete(finished.job_id).await.unwrap();
        assert!(artifacts.get(finished.job_id).is_none());

        let running = service.submit(request("text")).await.unwrap();
        service.queue().claim().await;
        service
            .store()
            .update(running.job_id, |job| job.status = JobStatus::CauseEffect)
            .await;
        let err = service.delete(running.job_id).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Conflict);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_job() {
        let (service, _) = service(predictor());
        let job_id = Uuid::new_v4();

        assert!(matches!(
            service.subscribe(job_id).await,
            Err(CausalError::NotFound(_))
        ));
        assert_eq!(service.registry().subscriber_count(job_id), 0);
    }
}
