//! causegraph Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout causegraph:
//! - Causal claim models (rows, pairs, graph rows, topics)
//! - Job lifecycle types (status machine, events, results)
//! - Common error types
//! - Capability traits for the relation predictor, topic clusterer,
//!   artifact persistence, event delivery, and dataset sources
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ClusteringConfig, ConfigError, LoggingConfig, ModelConfig, PreprocessingConfig,
    ServerConfig, StorageConfig, WorkerConfig,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for causegraph operations
#[derive(Error, Debug)]
pub enum CausalError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Could not find any entities to cluster")]
    EmptyEntitySet,

    #[error("Predictor error: {0}")]
    Predictor(String),

    #[error("Clusterer error: {0}")]
    Clusterer(String),

    #[error("Job exceeded its time budget of {budget_secs}s")]
    Timeout { budget_secs: u64 },

    #[error("Internal consistency fault: {0}")]
    InternalConsistency(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CausalError {
    /// Classify the error for terminal events and job status
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::EmptyEntitySet => FailureKind::EmptyEntitySet,
            Self::Predictor(_) => FailureKind::Predictor,
            Self::Clusterer(_) => FailureKind::Clusterer,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::InternalConsistency(_) => FailureKind::InternalConsistency,
            Self::Persistence(_) => FailureKind::Persistence,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Conflict(_) => FailureKind::Conflict,
            Self::Source(_) => FailureKind::Source,
            Self::Config(_) => FailureKind::Config,
            Self::Other(_) => FailureKind::Internal,
        }
    }

    /// True for faults that indicate a defect or infrastructure failure
    /// rather than bad user input (5xx-class).
    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::InternalConsistency
                | FailureKind::Persistence
                | FailureKind::Config
                | FailureKind::Internal
        )
    }
}

pub type Result<T> = std::result::Result<T, CausalError>;

/// Serializable classification of a job failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    EmptyEntitySet,
    Predictor,
    Clusterer,
    Timeout,
    InternalConsistency,
    Persistence,
    NotFound,
    Conflict,
    Source,
    Config,
    Internal,
}

// ============================================================================
// Causal Claim Models
// ============================================================================

/// A single cause -> effect claim extracted from text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CausalPair {
    pub cause: String,
    pub effect: String,
}

impl CausalPair {
    pub fn new(cause: impl Into<String>, effect: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
            effect: effect.into(),
        }
    }
}

/// One input record together with the pairs the predictor found in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Source text
    pub text: String,

    /// Extracted pairs, in extraction order
    pub pairs: Vec<CausalPair>,
}

impl Row {
    pub fn new(text: impl Into<String>, pairs: Vec<CausalPair>) -> Self {
        Self {
            text: text.into(),
            pairs,
        }
    }

    /// Rows without pairs contribute nothing to the graph
    pub fn has_pairs(&self) -> bool {
        !self.pairs.is_empty()
    }
}

/// Topic identifier assigned by the clusterer
pub type TopicId = i64;

/// Marker for an entity without a topic: clustering was disabled, or the
/// clusterer treated the entity as noise.
pub const CLUSTERLESS: TopicId = -1;

/// One edge of the causal graph table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRow {
    /// Dense, 0-based sequence number in emission order
    pub id: usize,

    /// Cause as extracted (surface form)
    pub cause: String,

    /// Topic of the normalized cause
    pub cause_cluster: TopicId,

    /// Effect as extracted (surface form)
    pub effect: String,

    /// Topic of the normalized effect
    pub effect_cluster: TopicId,

    /// Source text the pair was extracted from
    pub text: String,
}

impl GraphRow {
    /// True when either side carries the clusterless marker
    pub fn is_clusterless(&self) -> bool {
        self.cause_cluster == CLUSTERLESS || self.effect_cluster == CLUSTERLESS
    }
}

/// A characteristic word of a topic and its weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicWord {
    pub word: String,
    pub weight: f32,
}

impl TopicWord {
    pub fn new(word: impl Into<String>, weight: f32) -> Self {
        Self {
            word: word.into(),
            weight,
        }
    }
}

/// Top words per topic, as produced by the clusterer
pub type TopicSummary = BTreeMap<TopicId, Vec<TopicWord>>;

// ============================================================================
// Clustering Parameters
// ============================================================================

/// How many topics the clusterer should reduce to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicCountPolicy {
    /// Let the clusterer reduce topics on its own
    #[default]
    Automatic,
    /// Keep every topic the clusterer finds
    Unbounded,
    /// Reduce to a fixed number of topics
    Fixed(u32),
}

impl TopicCountPolicy {
    /// Parse the wire form: 0 = automatic, -1 = unbounded, n > 0 = fixed
    pub fn from_wire(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Automatic),
            -1 => Ok(Self::Unbounded),
            n if n > 0 => u32::try_from(n)
                .map(Self::Fixed)
                .map_err(|_| CausalError::Validation(format!("nr_topics too large: {n}"))),
            n => Err(CausalError::Validation(format!(
                "nr_topics must be -1, 0 or a positive count, got {n}"
            ))),
        }
    }

    /// Wire form of the policy
    pub fn to_wire(self) -> i64 {
        match self {
            Self::Automatic => 0,
            Self::Unbounded => -1,
            Self::Fixed(n) => i64::from(n),
        }
    }
}

/// Inclusive n-gram range used for topic representations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct NGramRange {
    min: u32,
    max: u32,
}

impl NGramRange {
    /// Create a validated range; requires `1 <= min <= max`
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min == 0 {
            return Err(CausalError::Validation(
                "n-gram range must start at 1 or above".to_string(),
            ));
        }
        if min > max {
            return Err(CausalError::Validation(format!(
                "Incorrect n-gram range: ({min}, {max})"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

impl Default for NGramRange {
    fn default() -> Self {
        Self { min: 1, max: 2 }
    }
}

impl TryFrom<(u32, u32)> for NGramRange {
    type Error = CausalError;

    fn try_from((min, max): (u32, u32)) -> Result<Self> {
        Self::new(min, max)
    }
}

impl From<NGramRange> for (u32, u32) {
    fn from(range: NGramRange) -> Self {
        (range.min, range.max)
    }
}

/// Parameters passed to the clusterer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    pub nr_topics: TopicCountPolicy,
    pub n_gram_range: NGramRange,
    pub top_n_words: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            nr_topics: TopicCountPolicy::Automatic,
            n_gram_range: NGramRange::default(),
            top_n_words: 10,
        }
    }
}

impl ClusterParams {
    /// Validate the parameters and build them
    pub fn new(
        nr_topics: TopicCountPolicy,
        n_gram_range: NGramRange,
        top_n_words: usize,
    ) -> Result<Self> {
        if top_n_words == 0 {
            return Err(CausalError::Validation(
                "top_n_words must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            nr_topics,
            n_gram_range,
            top_n_words,
        })
    }
}

// ============================================================================
// Job Models
// ============================================================================

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for a worker
    Queued,
    /// Running the relation predictor over rows
    CauseEffect,
    /// Clustering entities
    CreateClusters,
    /// Completed with a result
    Finished,
    /// Aborted with a failure
    Failed,
}

impl JobStatus {
    /// Terminal states accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the job state machine
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Queued, Self::CauseEffect) => true,
            (Self::CauseEffect, Self::CreateClusters) => true,
            (Self::CauseEffect, Self::Finished) => true,
            (Self::CreateClusters, Self::Finished) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::CauseEffect => "cause_effect",
            Self::CreateClusters => "create_clusters",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a client asked the system to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Reference to the uploaded dataset
    pub source_reference: String,

    /// Column holding the text to analyse
    pub column_name: String,

    /// Group causes/effects into topic clusters
    #[serde(default)]
    pub cluster: bool,

    /// Ask the predictor to clean text before tagging
    #[serde(default)]
    pub preprocess: bool,
}

/// A submitted unit of work and its progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: usize,
    pub total: usize,
    pub created_at: DateTime<Utc>,
    pub timeout_budget_secs: u64,
    pub request: JobRequest,

    /// Present once the job finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<std::sync::Arc<JobResult>>,

    /// Present once the job failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job
    pub fn new(request: JobRequest, timeout_budget: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            progress: 0,
            total: 0,
            created_at: Utc::now(),
            timeout_budget_secs: timeout_budget.as_secs(),
            request,
            result: None,
            failure: None,
            completed_at: None,
        }
    }

    pub fn timeout_budget(&self) -> Duration {
        Duration::from_secs(self.timeout_budget_secs)
    }
}

/// Final payload of a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Graph rows visible to the submitter
    pub result_graph: Vec<GraphRow>,

    /// Every processed row, including rows without pairs
    pub result_rows: Vec<Row>,

    /// Topic summary when clustering ran
    pub topics: Option<TopicSummary>,

    pub cluster_enabled: bool,
}

/// Reason a job failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&CausalError> for JobFailure {
    fn from(err: &CausalError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Status message delivered on a job's progress channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: usize,
    pub total: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<std::sync::Arc<JobResult>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
}

impl JobEvent {
    /// Whether this is the last event the job will emit
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ============================================================================
// Capability Models
// ============================================================================

/// Output of the relation predictor for one text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub pairs: Vec<CausalPair>,

    /// Detected language, empty when undetected
    #[serde(default)]
    pub language: String,
}

/// Output of one clusterer fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterFit {
    /// One topic per input entity, aligned by position
    pub topic_ids: Vec<TopicId>,
    pub summary: TopicSummary,
}

/// Tabular dataset loaded from a source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl Dataset {
    /// Values of one column in record order; missing cells become ""
    pub fn column(&self, name: &str) -> Result<Vec<String>> {
        let index = self
            .headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| CausalError::Validation(format!("Missing required column: {name}")))?;

        Ok(self
            .records
            .iter()
            .map(|record| record.get(index).cloned().unwrap_or_default())
            .collect())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Relation tagging model: text -> cause/effect pairs
#[async_trait::async_trait]
pub trait Predictor: Send + Sync {
    /// Extract pairs from one text; long texts are segmented by the predictor
    async fn predict(&self, text: &str, preprocess: bool) -> Result<Prediction>;

    /// Get predictor name for logging
    fn name(&self) -> &str;
}

/// Topic model: entity strings -> topic per entity
#[async_trait::async_trait]
pub trait Clusterer: Send + Sync {
    async fn fit(&self, entities: &[String], params: &ClusterParams) -> Result<ClusterFit>;

    /// Get clusterer name for logging
    fn name(&self) -> &str;
}

/// Durable store for finished graph tables
#[async_trait::async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist the graph rows of a job, returning where they were written
    async fn persist(&self, job_id: Uuid, rows: &[GraphRow]) -> Result<PathBuf>;

    /// Read the persisted graph rows back
    async fn load(&self, job_id: Uuid) -> Result<Vec<GraphRow>>;

    /// Raw artifact bytes for download
    async fn read_raw(&self, job_id: Uuid) -> Result<Vec<u8>>;

    /// Remove the artifact; removing a missing artifact is not an error
    async fn remove(&self, job_id: Uuid) -> Result<()>;
}

/// Receiver of job status events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: JobEvent);
}

impl<F> EventSink for F
where
    F: Fn(JobEvent) + Send + Sync,
{
    fn emit(&self, event: JobEvent) {
        self(event)
    }
}

/// Where submitted datasets come from
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Column names of a dataset, used to validate submissions
    async fn headers(&self, reference: &str) -> Result<Vec<String>>;

    /// Load at most `max_rows` records of a dataset
    async fn load(&self, reference: &str, max_rows: usize) -> Result<Dataset>;
}

// ============================================================================
// Tests
// ============================================================================
