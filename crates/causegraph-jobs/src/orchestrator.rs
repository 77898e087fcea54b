//! End-to-end job pipeline
//!
//! Rows are run through the predictor one at a time, in input order, with a
//! progress event after each. The collected rows are then assembled into the
//! graph table, either plainly or through topic reconciliation, persisted,
//! and reported in the terminal event.
//!
//! Any fault aborts the whole job: the tracker records it as `failed` and
//! the error is returned to the caller.
//!
//! Author: hephaex@gmail.com

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use causegraph_core::{
    ArtifactSink, CausalError, ClusterParams, Clusterer, Dataset, GraphRow, JobRequest,
    JobResult, JobStatus, Predictor, Result, Row, TopicSummary,
};
use causegraph_extractor::{ClusterReconciler, EntityPreprocessor, GraphBuilder};

use crate::tracker::JobProgressTracker;

/// Wall-clock budget of one job
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// `Timeout` once the budget is spent
    pub fn check(&self) -> Result<()> {
        if Instant::now() >= self.expires_at {
            Err(self.timeout())
        } else {
            Ok(())
        }
    }

    pub fn timeout(&self) -> CausalError {
        CausalError::Timeout {
            budget_secs: self.budget.as_secs(),
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct JobOutput {
    /// Payload of the terminal event
    pub result: Arc<JobResult>,

    /// Every graph row, clusterless rows included, as persisted
    pub persisted_rows: usize,

    pub artifact: PathBuf,
}

/// Drives one job from dataset to persisted graph
pub struct JobOrchestrator {
    predictor: Arc<dyn Predictor>,
    clusterer: Arc<dyn Clusterer>,
    artifacts: Arc<dyn ArtifactSink>,
    preprocessor: EntityPreprocessor,
    builder: GraphBuilder,
    reconciler: ClusterReconciler,
    cluster_params: ClusterParams,
}

impl JobOrchestrator {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        clusterer: Arc<dyn Clusterer>,
        artifacts: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            predictor,
            clusterer,
            artifacts,
            preprocessor: EntityPreprocessor::default(),
            builder: GraphBuilder::default(),
            reconciler: ClusterReconciler::default(),
            cluster_params: ClusterParams::default(),
        }
    }

    /// Clustering parameters used by submitted jobs
    pub fn with_cluster_params(mut self, params: ClusterParams) -> Self {
        self.cluster_params = params;
        self
    }

    /// Entity normalization used by both graph paths
    pub fn with_preprocessor(mut self, preprocessor: EntityPreprocessor) -> Self {
        self.builder = GraphBuilder::new(preprocessor.clone());
        self.reconciler = ClusterReconciler::new(preprocessor.clone());
        self.preprocessor = preprocessor;
        self
    }

    /// Normalization behind graph rows and topic lookups
    pub fn preprocessor(&self) -> &EntityPreprocessor {
        &self.preprocessor
    }

    pub fn artifacts(&self) -> Arc<dyn ArtifactSink> {
        Arc::clone(&self.artifacts)
    }

    pub fn cluster_params(&self) -> &ClusterParams {
        &self.cluster_params
    }

    /// Run a job over a loaded dataset
    ///
    /// On failure the tracker has already emitted the terminal `failed`
    /// event when this returns.
    pub async fn run(
        &self,
        job_id: Uuid,
        dataset: &Dataset,
        request: &JobRequest,
        tracker: &mut JobProgressTracker,
        deadline: Deadline,
    ) -> Result<JobOutput> {
        match self.execute(job_id, dataset, request, tracker, deadline).await {
            Ok(output) => Ok(output),
            Err(err) => {
                tracker.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        job_id: Uuid,
        dataset: &Dataset,
        request: &JobRequest,
        tracker: &mut JobProgressTracker,
        deadline: Deadline,
    ) -> Result<JobOutput> {
        let texts = dataset.column(&request.column_name)?;
        tracker.start(texts.len()).await?;
        tracing::info!(
            %job_id,
            rows = texts.len(),
            cluster = request.cluster,
            predictor = self.predictor.name(),
            "Extracting causal pairs"
        );

        let mut rows = Vec::with_capacity(texts.len());
        for (index, text) in texts.into_iter().enumerate() {
            deadline.check()?;
            let prediction = self
                .predictor
                .predict(&text, request.preprocess)
                .await
                .map_err(as_predictor_failure)?;
            tracing::debug!(%job_id, row = index, pairs = prediction.pairs.len(), "Row predicted");
            rows.push(Row::new(text, prediction.pairs));
            tracker.advance(index + 1).await?;
        }
        deadline.check()?;

        let contributing: Vec<Row> = rows.iter().filter(|r| r.has_pairs()).cloned().collect();
        let (graph, topics) = if request.cluster {
            tracker.set_status(JobStatus::CreateClusters).await?;
            let (graph, topics) = self
                .reconciler
                .reconcile(&contributing, self.clusterer.as_ref(), &self.cluster_params)
                .await?;
            (graph, Some(topics))
        } else {
            (self.builder.build(&contributing), None)
        };

        // Nothing is persisted once the budget is spent
        deadline.check()?;
        let artifact = self.artifacts.persist(job_id, &graph).await?;
        let persisted_rows = graph.len();

        let result_graph = if request.cluster {
            visible_rows(graph)
        } else {
            graph
        };
        let result = Arc::new(JobResult {
            result_graph,
            result_rows: rows,
            topics,
            cluster_enabled: request.cluster,
        });
        tracker.finish(Arc::clone(&result)).await?;

        Ok(JobOutput {
            result,
            persisted_rows,
            artifact,
        })
    }

    /// Re-cluster a previously returned row set
    ///
    /// Returns the full reconciled graph, clusterless rows included.
    pub async fn recluster(
        &self,
        rows: &[Row],
        params: &ClusterParams,
    ) -> Result<(Vec<GraphRow>, TopicSummary)> {
        let contributing: Vec<Row> = rows.iter().filter(|r| r.has_pairs()).cloned().collect();
        self.reconciler
            .reconcile(&contributing, self.clusterer.as_ref(), params)
            .await
    }
}

/// Rows shown to the submitter: outliers without a topic are left out
fn visible_rows(graph: Vec<GraphRow>) -> Vec<GraphRow> {
    graph.into_iter().filter(|row| !row.is_clusterless()).collect()
}

fn as_predictor_failure(err: CausalError) -> CausalError {
    match err {
        CausalError::Predictor(_) => err,
        other => CausalError::Predictor(other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
