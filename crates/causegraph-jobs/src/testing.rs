//! In-process stand-ins for the model and storage capabilities
//!
//! Used by unit tests here and, through the `test-utils` feature, by the
//! API crate's integration tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use causegraph_core::{
    ArtifactSink, CausalError, CausalPair, ClusterFit, ClusterParams, Clusterer, Dataset,
    GraphRow, Prediction, Predictor, RecordSource, Result, TopicId, TopicSummary, TopicWord,
    CLUSTERLESS,
};

use crate::artifact::CsvArtifactStore;

/// Predictor answering from a fixed text -> pairs script
///
/// Texts missing from the script yield no pairs.
#[derive(Debug, Default)]
pub struct ScriptedPredictor {
    script: HashMap<String, Vec<CausalPair>>,
    fail_on: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `text` with `pairs`
    pub fn with(mut self, text: &str, pairs: &[(&str, &str)]) -> Self {
        self.script.insert(
            text.to_string(),
            pairs.iter().map(|(c, e)| CausalPair::new(*c, *e)).collect(),
        );
        self
    }

    /// Fail with a predictor error when asked about `text`
    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    /// Sleep before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of predict calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Predictor for ScriptedPredictor {
    async fn predict(&self, text: &str, _preprocess: bool) -> Result<Prediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.as_deref() == Some(text) {
            return Err(CausalError::Predictor(format!("scripted failure on {text:?}")));
        }

        Ok(Prediction {
            pairs: self.script.get(text).cloned().unwrap_or_default(),
            language: "en".to_string(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Clusterer assigning topics from a fixed table
///
/// Entities missing from the table are outliers and get [`CLUSTERLESS`].
#[derive(Debug, Default)]
pub struct TableClusterer {
    table: HashMap<String, TopicId>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl TableClusterer {
    pub fn new(entries: &[(&str, TopicId)]) -> Self {
        Self {
            table: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Entity lists received by each fit call
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Clusterer for TableClusterer {
    async fn fit(&self, entities: &[String], params: &ClusterParams) -> Result<ClusterFit> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entities.to_vec());

        let topic_ids = entities
            .iter()
            .map(|e| self.table.get(e).copied().unwrap_or(CLUSTERLESS))
            .collect();

        let mut summary = TopicSummary::new();
        for entity in entities {
            if let Some(&topic) = self.table.get(entity) {
                let words = summary.entry(topic).or_default();
                if words.len() < params.top_n_words {
                    words.push(TopicWord::new(entity.clone(), 1.0));
                }
            }
        }

        Ok(ClusterFit { topic_ids, summary })
    }

    fn name(&self) -> &str {
        "table"
    }
}

/// Artifact sink keeping graph tables in memory
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<Uuid, Vec<GraphRow>>>,
    failing: bool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn get(&self, job_id: Uuid) -> Option<Vec<GraphRow>> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactStore {
    async fn persist(&self, job_id: Uuid, rows: &[GraphRow]) -> Result<PathBuf> {
        if self.failing {
            return Err(CausalError::Persistence("disk full".to_string()));
        }
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, rows.to_vec());
        Ok(PathBuf::from(format!("memory://{job_id}.csv")))
    }

    async fn load(&self, job_id: Uuid) -> Result<Vec<GraphRow>> {
        self.get(job_id)
            .ok_or_else(|| CausalError::NotFound(format!("No artifact for job {job_id}")))
    }

    async fn read_raw(&self, job_id: Uuid) -> Result<Vec<u8>> {
        CsvArtifactStore::encode(&self.load(job_id).await?)
    }

    async fn remove(&self, job_id: Uuid) -> Result<()> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
        Ok(())
    }
}

/// Record source serving in-memory datasets
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    datasets: HashMap<String, Dataset>,
}

impl MemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single-column dataset
    pub fn with_column(mut self, reference: &str, column: &str, values: &[&str]) -> Self {
        self.datasets.insert(
            reference.to_string(),
            Dataset {
                headers: vec![column.to_string()],
                records: values.iter().map(|v| vec![v.to_string()]).collect(),
            },
        );
        self
    }

    pub fn with_dataset(mut self, reference: &str, dataset: Dataset) -> Self {
        self.datasets.insert(reference.to_string(), dataset);
        self
    }

    fn dataset(&self, reference: &str) -> Result<&Dataset> {
        self.datasets
            .get(reference)
            .ok_or_else(|| CausalError::Validation(format!("Unknown source: {reference}")))
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn headers(&self, reference: &str) -> Result<Vec<String>> {
        Ok(self.dataset(reference)?.headers.clone())
    }

    async fn load(&self, reference: &str, max_rows: usize) -> Result<Dataset> {
        let dataset = self.dataset(reference)?;
        Ok(Dataset {
            headers: dataset.headers.clone(),
            records: dataset.records.iter().take(max_rows).cloned().collect(),
        })
    }
}
