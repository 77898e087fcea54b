//! Causal network handlers
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use causegraph_core::JobStatus;
use causegraph_extractor::{CausalNetwork, NetworkEdge, NetworkNode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Query parameters for the network view
#[derive(Debug, Deserialize, IntoParams)]
pub struct NetworkQuery {
    /// Focus node, `topic:<id>` or `entity:<normalized text>`
    #[param(example = "topic:0")]
    pub node: Option<String>,
}

/// A neighbour of the focus node
#[derive(Debug, Serialize, ToSchema)]
pub struct Neighbour {
    #[schema(value_type = Object)]
    pub node: NetworkNode,
    /// Supporting graph rows
    pub weight: usize,
}

/// Causes and effects of the focus node
#[derive(Debug, Serialize, ToSchema)]
pub struct FocusInfo {
    #[schema(value_type = Object)]
    pub node: NetworkNode,
    pub causes: Vec<Neighbour>,
    pub effects: Vec<Neighbour>,
}

/// Collapsed network of a finished job
#[derive(Debug, Serialize, ToSchema)]
pub struct NetworkResponse {
    pub job_id: Uuid,
    #[schema(value_type = Vec<Object>)]
    pub nodes: Vec<NetworkNode>,
    /// Heaviest first
    #[schema(value_type = Vec<Object>)]
    pub edges: Vec<NetworkEdge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<FocusInfo>,
}

fn parse_node(raw: &str) -> Result<NetworkNode, AppError> {
    match raw.split_once(':') {
        Some(("topic", id)) => id
            .parse()
            .map(NetworkNode::Topic)
            .map_err(|_| AppError::BadRequest(format!("Invalid topic id: {id}"))),
        Some(("entity", key)) if !key.is_empty() => Ok(NetworkNode::Entity(key.to_string())),
        _ => Err(AppError::BadRequest(format!(
            "Invalid node {raw:?}, expected topic:<id> or entity:<text>"
        ))),
    }
}

fn neighbours(list: Vec<(NetworkNode, usize)>) -> Vec<Neighbour> {
    list.into_iter()
        .map(|(node, weight)| Neighbour { node, weight })
        .collect()
}

/// Get the collapsed causal network of a finished job
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/network",
    tag = "jobs",
    params(
        ("id" = Uuid, Path, description = "Job ID"),
        NetworkQuery
    ),
    responses(
        (status = 200, description = "Network view", body = NetworkResponse),
        (status = 404, description = "Job not found", body = crate::error::ApiError),
        (status = 409, description = "Job has not finished", body = crate::error::ApiError)
    )
)]
pub async fn get_network(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<NetworkQuery>,
) -> Result<Json<NetworkResponse>, AppError> {
    let focus_node = params.node.as_deref().map(parse_node).transpose()?;

    let job = state.service.job(id).await?;
    if job.status != JobStatus::Finished {
        return Err(AppError::Conflict(format!(
            "Job {id} has not finished ({})",
            job.status
        )));
    }

    let rows = state.service.persisted_graph(id).await?;
    let network = CausalNetwork::from_rows(&rows, &state.preprocessor);

    let focus = focus_node.map(|node| FocusInfo {
        causes: neighbours(network.causes_of(&node)),
        effects: neighbours(network.effects_of(&node)),
        node,
    });

    Ok(Json(NetworkResponse {
        job_id: id,
        nodes: network.nodes(),
        edges: network.edges(),
        focus,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node() {
        assert_eq!(parse_node("topic:3").unwrap(), NetworkNode::Topic(3));
        assert_eq!(parse_node("topic:-1").unwrap(), NetworkNode::Topic(-1));
        assert_eq!(
            parse_node("entity:heavy rain").unwrap(),
            NetworkNode::Entity("heavy rain".to_string())
        );
        assert!(parse_node("topic:x").is_err());
        assert!(parse_node("entity:").is_err());
        assert!(parse_node("rain").is_err());
    }
}
