//! causegraph Inference - Model-serving clients
//!
//! HTTP implementations of the two model capabilities:
//! - [`HttpPredictor`]: relation tagging, text -> cause/effect pairs
//! - [`HttpClusterer`]: topic modelling, entities -> topic per entity
//!
//! Author: hephaex@gmail.com

pub mod clusterer;
pub mod predictor;

pub use clusterer::HttpClusterer;
pub use predictor::HttpPredictor;

use std::sync::Arc;
use std::time::Duration;

use causegraph_core::{CausalError, Clusterer, ModelConfig, Predictor, Result};
use reqwest::Client;

/// Shared HTTP client with the configured request timeout
pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CausalError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Join a base URL and an endpoint path
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Create both model clients from config
pub fn create_model_clients(
    config: &ModelConfig,
) -> Result<(Arc<dyn Predictor>, Arc<dyn Clusterer>)> {
    let predictor = HttpPredictor::from_config(config)?;
    let clusterer = HttpClusterer::from_config(config)?;
    tracing::info!(
        predictor = %config.predictor_url,
        clusterer = %config.clusterer_url,
        "Model clients configured"
    );
    Ok((Arc::new(predictor), Arc::new(clusterer)))
}
