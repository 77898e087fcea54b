//! Collapsed causal network
//!
//! Folds the graph table into a weighted directed graph: one node per
//! topic (or per normalized entity when a side has no topic), one edge per
//! distinct (cause node, effect node) with the number of supporting rows.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use causegraph_core::{GraphRow, TopicId, CLUSTERLESS};

use crate::preprocess::EntityPreprocessor;

/// Node of the collapsed network
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum NetworkNode {
    /// A topic cluster
    Topic(TopicId),
    /// An unclustered entity, keyed by its normalized form
    Entity(String),
}

impl std::fmt::Display for NetworkNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic(id) => write!(f, "topic:{id}"),
            Self::Entity(key) => write!(f, "entity:{key}"),
        }
    }
}

/// Edge support: graph rows backing a collapsed edge
#[derive(Debug, Clone, Default)]
struct Support {
    row_ids: Vec<usize>,
}

/// Serializable collapsed edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub from: NetworkNode,
    pub to: NetworkNode,
    /// Number of graph rows supporting this edge
    pub weight: usize,
    /// Ids of the supporting graph rows
    pub row_ids: Vec<usize>,
}

/// Weighted directed view over a graph table
#[derive(Debug, Default)]
pub struct CausalNetwork {
    graph: DiGraph<NetworkNode, Support>,
    nodes: HashMap<NetworkNode, NodeIndex>,
}

impl CausalNetwork {
    /// Build the network from graph rows
    pub fn from_rows(rows: &[GraphRow], preprocessor: &EntityPreprocessor) -> Self {
        let mut network = Self::default();

        for row in rows {
            let from = network.node(node_for(row.cause_cluster, &row.cause, preprocessor));
            let to = network.node(node_for(row.effect_cluster, &row.effect, preprocessor));

            match network.graph.find_edge(from, to) {
                Some(edge) => network.graph[edge].row_ids.push(row.id),
                None => {
                    network.graph.add_edge(
                        from,
                        to,
                        Support {
                            row_ids: vec![row.id],
                        },
                    );
                }
            }
        }

        network
    }

    fn node(&mut self, node: NetworkNode) -> NodeIndex {
        if let Some(&index) = self.nodes.get(&node) {
            return index;
        }
        let index = self.graph.add_node(node.clone());
        self.nodes.insert(node, index);
        index
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All nodes, sorted
    pub fn nodes(&self) -> Vec<NetworkNode> {
        let mut nodes: Vec<_> = self.nodes.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// All collapsed edges, heaviest first
    pub fn edges(&self) -> Vec<NetworkEdge> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|edge| NetworkEdge {
                from: self.graph[edge.source()].clone(),
                to: self.graph[edge.target()].clone(),
                weight: edge.weight().row_ids.len(),
                row_ids: edge.weight().row_ids.clone(),
            })
            .collect();
        edges.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then_with(|| a.from.cmp(&b.from))
                .then_with(|| a.to.cmp(&b.to))
        });
        edges
    }

    /// Nodes caused by `node`, with edge weights
    pub fn effects_of(&self, node: &NetworkNode) -> Vec<(NetworkNode, usize)> {
        self.neighbours(node, Direction::Outgoing)
    }

    /// Nodes causing `node`, with edge weights
    pub fn causes_of(&self, node: &NetworkNode) -> Vec<(NetworkNode, usize)> {
        self.neighbours(node, Direction::Incoming)
    }

    fn neighbours(&self, node: &NetworkNode, direction: Direction) -> Vec<(NetworkNode, usize)> {
        let Some(&index) = self.nodes.get(node) else {
            return Vec::new();
        };

        let mut result: Vec<_> = self
            .graph
            .edges_directed(index, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (self.graph[other].clone(), edge.weight().row_ids.len())
            })
            .collect();
        result.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        result
    }
}

fn node_for(cluster: TopicId, entity: &str, preprocessor: &EntityPreprocessor) -> NetworkNode {
    if cluster == CLUSTERLESS {
        NetworkNode::Entity(preprocessor.normalize(entity))
    } else {
        NetworkNode::Topic(cluster)
    }
}
