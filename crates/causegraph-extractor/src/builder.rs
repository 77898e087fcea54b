//! Plain causal graph assembly
//!
//! Flattens rows into graph rows without clustering. Every surviving pair
//! becomes one graph row carrying the clusterless marker.

use causegraph_core::{GraphRow, Row, CLUSTERLESS};

use crate::preprocess::EntityPreprocessor;

/// Builds the unclustered graph table
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    preprocessor: EntityPreprocessor,
}

impl GraphBuilder {
    pub fn new(preprocessor: EntityPreprocessor) -> Self {
        Self { preprocessor }
    }

    /// Emit one graph row per usable pair, row-major then pair-minor.
    ///
    /// Identical pairs from different rows are kept separately, each with
    /// its own source text.
    pub fn build(&self, rows: &[Row]) -> Vec<GraphRow> {
        let mut graph = Vec::new();

        for row in rows {
            for pair in &row.pairs {
                if self.preprocessor.is_unusable(&pair.cause)
                    || self.preprocessor.is_unusable(&pair.effect)
                {
                    continue;
                }

                graph.push(GraphRow {
                    id: graph.len(),
                    cause: pair.cause.clone(),
                    cause_cluster: CLUSTERLESS,
                    effect: pair.effect.clone(),
                    effect_cluster: CLUSTERLESS,
                    text: row.text.clone(),
                });
            }
        }

        tracing::debug!(rows = rows.len(), graph_rows = graph.len(), "Built causal graph");
        graph
    }
}
