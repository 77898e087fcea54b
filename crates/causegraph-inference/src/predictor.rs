//! Relation predictor client
//!
//! `POST {predictor_url}/predict` with `{"text", "preprocess"}`; the server
//! answers `{"pairs": [{"cause", "effect"}], "language"}`. Long texts are
//! segmented server-side.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use causegraph_core::{CausalError, CausalPair, ModelConfig, Prediction, Predictor, Result};

use crate::{endpoint, http_client};

/// Predictor backed by a model-serving endpoint
pub struct HttpPredictor {
    client: Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
    preprocess: bool,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    pairs: Vec<CausalPair>,
    #[serde(default)]
    language: Option<String>,
}

impl From<PredictResponse> for Prediction {
    fn from(response: PredictResponse) -> Self {
        Self {
            pairs: response.pairs,
            language: response.language.unwrap_or_default(),
        }
    }
}

impl HttpPredictor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: endpoint(base_url, "predict"),
        })
    }

    /// Create from config
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Self::new(&config.predictor_url, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, text: &str, preprocess: bool) -> Result<Prediction> {
        // Nothing to tag; skip the round trip
        if text.trim().is_empty() {
            return Ok(Prediction::default());
        }

        let response = self
            .client
            .post(&self.url)
            .json(&PredictRequest { text, preprocess })
            .send()
            .await
            .map_err(|e| CausalError::Predictor(format!("Predict request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CausalError::Predictor(format!(
                "Predictor returned {status}: {error_text}"
            )));
        }

        let result: PredictResponse = response
            .json()
            .await
            .map_err(|e| CausalError::Predictor(format!("Failed to parse prediction: {e}")))?;

        Ok(result.into())
    }

    fn name(&self) -> &str {
        "http-predictor"
    }
}
