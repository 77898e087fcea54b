//! Topic clusterer client
//!
//! `POST {clusterer_url}/fit` with the entity list and clustering
//! parameters. `nr_topics` travels as `"auto"`, `null` (no reduction) or a
//! positive count. The server answers with one topic id per entity and the
//! top words per topic as `[word, weight]` pairs.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use causegraph_core::{
    CausalError, ClusterFit, ClusterParams, Clusterer, ModelConfig, Result, TopicCountPolicy,
    TopicId, TopicSummary, TopicWord,
};

use crate::{endpoint, http_client};

/// Clusterer backed by a model-serving endpoint
pub struct HttpClusterer {
    client: Client,
    url: String,
}

/// `nr_topics` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
enum NrTopics {
    Auto(&'static str),
    Unbounded(Option<u32>),
    Fixed(u32),
}

impl From<TopicCountPolicy> for NrTopics {
    fn from(policy: TopicCountPolicy) -> Self {
        match policy {
            TopicCountPolicy::Automatic => Self::Auto("auto"),
            TopicCountPolicy::Unbounded => Self::Unbounded(None),
            TopicCountPolicy::Fixed(n) => Self::Fixed(n),
        }
    }
}

#[derive(Debug, Serialize)]
struct FitRequest<'a> {
    entities: &'a [String],
    nr_topics: NrTopics,
    n_gram_range: (u32, u32),
    top_n_words: usize,
}

#[derive(Debug, Deserialize)]
struct FitResponse {
    topic_ids: Vec<TopicId>,
    #[serde(default)]
    topics: BTreeMap<TopicId, Vec<(String, f32)>>,
}

impl FitResponse {
    /// Check alignment with the request and convert
    fn into_fit(self, expected: usize) -> Result<ClusterFit> {
        if self.topic_ids.len() != expected {
            return Err(CausalError::InternalConsistency(format!(
                "clusterer returned {} topic ids for {expected} entities",
                self.topic_ids.len()
            )));
        }

        let summary: TopicSummary = self
            .topics
            .into_iter()
            .map(|(topic, words)| {
                let words = words
                    .into_iter()
                    .map(|(word, weight)| TopicWord::new(word, weight))
                    .collect();
                (topic, words)
            })
            .collect();

        Ok(ClusterFit {
            topic_ids: self.topic_ids,
            summary,
        })
    }
}

impl HttpClusterer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            url: endpoint(base_url, "fit"),
        })
    }

    /// Create from config
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Self::new(&config.clusterer_url, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl Clusterer for HttpClusterer {
    async fn fit(&self, entities: &[String], params: &ClusterParams) -> Result<ClusterFit> {
        let request = FitRequest {
            entities,
            nr_topics: params.nr_topics.into(),
            n_gram_range: params.n_gram_range.into(),
            top_n_words: params.top_n_words,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CausalError::Clusterer(format!("Fit request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(CausalError::Clusterer(format!(
                "Clusterer returned {status}: {error_text}"
            )));
        }

        let result: FitResponse = response
            .json()
            .await
            .map_err(|e| CausalError::Clusterer(format!("Failed to parse fit response: {e}")))?;

        let fit = result.into_fit(entities.len())?;
        tracing::debug!(
            entities = entities.len(),
            topics = fit.summary.len(),
            "Clusterer fit complete"
        );
        Ok(fit)
    }

    fn name(&self) -> &str {
        "http-clusterer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causegraph_core::NGramRange;

    fn request_json(policy: TopicCountPolicy) -> serde_json::Value {
        let entities = vec!["rain".to_string(), "floods".to_string()];
        let params = ClusterParams::new(policy, NGramRange::new(1, 3).unwrap(), 5).unwrap();
        serde_json::to_value(FitRequest {
            entities: &entities,
            nr_topics: params.nr_topics.into(),
            n_gram_range: params.n_gram_range.into(),
            top_n_words: params.top_n_words,
        })
        .unwrap()
    }

    #[test]
    fn test_nr_topics_wire_values() {
        assert_eq!(request_json(TopicCountPolicy::Automatic)["nr_topics"], "auto");
        assert!(request_json(TopicCountPolicy::Unbounded)["nr_topics"].is_null());
        assert_eq!(request_json(TopicCountPolicy::Fixed(12))["nr_topics"], 12);
    }

    #[test]
    fn test_request_shape() {
        let json = request_json(TopicCountPolicy::Automatic);
        assert_eq!(json["entities"], serde_json::json!(["rain", "floods"]));
        assert_eq!(json["n_gram_range"], serde_json::json!([1, 3]));
        assert_eq!(json["top_n_words"], 5);
    }

    #[test]
    fn test_response_conversion() {
        let response: FitResponse = serde_json::from_str(
            r#"{"topic_ids": [0, -1], "topics": {"0": [["rain", 0.42], ["storm", 0.2]]}}"#,
        )
        .unwrap();

        let fit = response.into_fit(2).unwrap();
        assert_eq!(fit.topic_ids, vec![0, -1]);
        assert_eq!(fit.summary[&0][0], TopicWord::new("rain", 0.42));
    }

    #[test]
    fn test_misaligned_response_is_internal_fault() {
        let response: FitResponse = serde_json::from_str(r#"{"topic_ids": [0]}"#).unwrap();
        let err = response.into_fit(2).unwrap_err();
        assert!(matches!(err, CausalError::InternalConsistency(_)));
    }
}
