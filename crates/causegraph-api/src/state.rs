//! Application state management
//!
//! Author: hephaex@gmail.com

use causegraph_core::config::AppConfig;
use causegraph_core::Result;
use causegraph_extractor::EntityPreprocessor;
use causegraph_jobs::{CsvArtifactStore, CsvRecordSource, JobOrchestrator, JobService};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Request statistics for one normalized endpoint
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EndpointMetrics {
    pub requests: u64,
    pub total_latency_us: u64,
    pub status_counts: HashMap<u16, u64>,
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Job submission, tracking and execution
    pub service: Arc<JobService>,
    /// Normalization used for network views
    pub preprocessor: EntityPreprocessor,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Per-endpoint request statistics
    pub metrics: RwLock<HashMap<String, EndpointMetrics>>,
}

impl AppState {
    /// Create application state around an existing job service
    pub fn new(config: AppConfig, service: Arc<JobService>) -> Self {
        let preprocessor = service.orchestrator().preprocessor().clone();
        Self {
            config,
            service,
            preprocessor,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Wire the model clients, storage and job service from config
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let (predictor, clusterer) = causegraph_inference::create_model_clients(&config.models)?;
        let cluster_params = config.clustering.params()?;

        let artifacts = Arc::new(CsvArtifactStore::new(&config.storage.download_dir));
        let source = Arc::new(CsvRecordSource::new(&config.storage.upload_dir));
        let orchestrator = JobOrchestrator::new(predictor, clusterer, artifacts)
            .with_cluster_params(cluster_params)
            .with_preprocessor(EntityPreprocessor::from_config(&config.preprocessing));
        let service = Arc::new(JobService::new(orchestrator, source, &config.worker));

        Ok(Self::new(config, service))
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record one finished request
    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.increment_requests();
        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry(endpoint).or_default();
        entry.requests += 1;
        entry.total_latency_us += latency_us;
        *entry.status_counts.entry(status).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_wires_service() {
        let state = AppState::from_config(AppConfig::default()).unwrap();
        assert_eq!(state.get_request_count(), 0);
        assert_eq!(
            state.service.orchestrator().cluster_params(),
            &causegraph_core::ClusterParams::default()
        );
    }

    #[test]
    fn test_from_config_shares_preprocessor() {
        let mut config = AppConfig::default();
        config.preprocessing.lemmatize = true;
        config.preprocessing.remove_stop_words = false;

        let state = AppState::from_config(config).unwrap();
        let options = state.preprocessor.options();
        assert!(options.lemmatize);
        assert!(!options.remove_stop_words);
        assert_eq!(state.service.orchestrator().preprocessor().options(), options);
        assert_eq!(state.preprocessor.normalize("The floods"), "the flood");
    }

    #[tokio::test]
    async fn test_record_request() {
        let state = AppState::from_config(AppConfig::default()).unwrap();
        state.record_request("/health".to_string(), 200, 120).await;
        state.record_request("/health".to_string(), 503, 80).await;

        let metrics = state.metrics.read().await;
        let health = &metrics["/health"];
        assert_eq!(health.requests, 2);
        assert_eq!(health.total_latency_us, 200);
        assert_eq!(health.status_counts[&503], 1);
        assert_eq!(state.get_request_count(), 2);
    }
}
