//! Clustering-only reconciliation handler
//!
//! Re-clusters a row set returned by an earlier job with new parameters.
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, Json};
use causegraph_core::{ClusterParams, GraphRow, NGramRange, Row, TopicCountPolicy, TopicSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Re-clustering request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct ClusterRequest {
    /// Rows as returned in a job result (`text` plus `pairs`)
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Row>,

    /// 0 = automatic, -1 = no reduction, n > 0 = fixed topic count
    #[serde(default)]
    #[schema(example = 0, default = 0)]
    pub nr_topics: i64,

    /// Inclusive n-gram range, `[min, max]`
    #[serde(default = "default_n_gram_range")]
    #[schema(value_type = Vec<u32>, example = json!([1, 2]))]
    pub n_gram_range: [u32; 2],

    /// Words kept per topic
    #[serde(default = "default_top_n_words")]
    #[schema(example = 10, default = 10)]
    pub top_n_words: usize,
}

fn default_n_gram_range() -> [u32; 2] {
    [1, 2]
}

fn default_top_n_words() -> usize {
    10
}

impl ClusterRequest {
    fn params(&self) -> causegraph_core::Result<ClusterParams> {
        let [min, max] = self.n_gram_range;
        ClusterParams::new(
            TopicCountPolicy::from_wire(self.nr_topics)?,
            NGramRange::new(min, max)?,
            self.top_n_words,
        )
    }
}

/// Reconciled graph, outliers included
#[derive(Debug, Serialize, ToSchema)]
pub struct ClusterResponse {
    #[schema(value_type = Vec<Object>)]
    pub graph: Vec<GraphRow>,

    /// Top words per topic id
    #[schema(value_type = Object)]
    pub topics: TopicSummary,
}

/// Re-cluster previously extracted rows
#[utoipa::path(
    post,
    path = "/api/v1/cluster",
    tag = "cluster",
    request_body = ClusterRequest,
    responses(
        (status = 200, description = "Clustering complete", body = ClusterResponse),
        (status = 400, description = "Invalid clustering parameters", body = crate::error::ApiError),
        (status = 422, description = "No entities to cluster", body = crate::error::ApiError),
        (status = 502, description = "Clusterer failed", body = crate::error::ApiError)
    )
)]
pub async fn cluster_rows(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClusterRequest>,
) -> Result<Json<ClusterResponse>, AppError> {
    // Rejected before any clustering work starts
    let params = req.params()?;

    let (graph, topics) = state.service.recluster(&req.rows, &params).await?;
    tracing::info!(
        rows = req.rows.len(),
        graph_rows = graph.len(),
        topics = topics.len(),
        "Rows re-clustered"
    );

    Ok(Json(ClusterResponse { graph, topics }))
}
