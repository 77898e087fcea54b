//! Topic reconciliation
//!
//! Clusters the deduplicated set of normalized entities once, then
//! projects each entity's topic back onto every (cause, effect)
//! occurrence. Topic assignment is per entity string, not per role: an
//! entity seen as both cause and effect gets the same topic everywhere.

use std::collections::{HashMap, HashSet};

use causegraph_core::{
    CausalError, ClusterParams, Clusterer, GraphRow, Result, Row, TopicId, TopicSummary,
};

use crate::preprocess::EntityPreprocessor;

/// Normalized entity -> topic id, valid for one reconciliation only
#[derive(Debug, Default)]
struct ClusterIndex {
    topics: HashMap<String, TopicId>,
}

impl ClusterIndex {
    fn build(entities: &[String], topic_ids: &[TopicId]) -> Result<Self> {
        if entities.len() != topic_ids.len() {
            return Err(CausalError::InternalConsistency(format!(
                "clusterer returned {} topic ids for {} entities",
                topic_ids.len(),
                entities.len()
            )));
        }

        let topics = entities
            .iter()
            .cloned()
            .zip(topic_ids.iter().copied())
            .collect();
        Ok(Self { topics })
    }

    fn lookup(&self, entity: &str) -> Result<TopicId> {
        self.topics.get(entity).copied().ok_or_else(|| {
            CausalError::InternalConsistency(format!(
                "normalized entity {entity:?} missing from cluster index"
            ))
        })
    }
}

/// Runs clustering and reprojects topics onto graph rows
#[derive(Debug, Clone, Default)]
pub struct ClusterReconciler {
    preprocessor: EntityPreprocessor,
}

impl ClusterReconciler {
    pub fn new(preprocessor: EntityPreprocessor) -> Self {
        Self { preprocessor }
    }

    /// Distinct normalized entities in first-seen order
    pub fn entity_set(&self, rows: &[Row]) -> Vec<String> {
        let mut raw_seen = HashSet::new();
        let mut normalized_seen = HashSet::new();
        let mut entities = Vec::new();

        let raw_entities = rows
            .iter()
            .flat_map(|row| &row.pairs)
            .flat_map(|pair| [pair.cause.as_str(), pair.effect.as_str()]);

        for raw in raw_entities {
            if !raw_seen.insert(raw) {
                continue;
            }
            let normalized = self.preprocessor.normalize(raw);
            if normalized.is_empty() {
                continue;
            }
            if normalized_seen.insert(normalized.clone()) {
                entities.push(normalized);
            }
        }

        entities
    }

    /// Cluster every entity and emit graph rows carrying topic ids.
    ///
    /// Fails with [`CausalError::EmptyEntitySet`] when no entity survives
    /// normalization.
    pub async fn reconcile(
        &self,
        rows: &[Row],
        clusterer: &dyn Clusterer,
        params: &ClusterParams,
    ) -> Result<(Vec<GraphRow>, TopicSummary)> {
        let entities = self.entity_set(rows);
        if entities.is_empty() {
            return Err(CausalError::EmptyEntitySet);
        }

        tracing::info!(
            entities = entities.len(),
            clusterer = clusterer.name(),
            "Clustering entities"
        );
        let fit = clusterer.fit(&entities, params).await?;
        let index = ClusterIndex::build(&entities, &fit.topic_ids)?;

        let mut graph = Vec::new();
        for row in rows {
            for pair in &row.pairs {
                let cause = self.preprocessor.normalize(&pair.cause);
                let effect = self.preprocessor.normalize(&pair.effect);
                if cause.is_empty() || effect.is_empty() {
                    continue;
                }

                graph.push(GraphRow {
                    id: graph.len(),
                    cause: pair.cause.clone(),
                    cause_cluster: index.lookup(&cause)?,
                    effect: pair.effect.clone(),
                    effect_cluster: index.lookup(&effect)?,
                    text: row.text.clone(),
                });
            }
        }

        tracing::debug!(
            graph_rows = graph.len(),
            topics = fit.summary.len(),
            "Reconciled topics onto graph rows"
        );
        Ok((graph, fit.summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use causegraph_core::{CausalPair, ClusterFit, TopicWord, CLUSTERLESS};
    use std::sync::Mutex;

    /// Assigns topics from a fixed table; unknown entities become outliers
    struct TableClusterer {
        table: HashMap<String, TopicId>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl TableClusterer {
        fn new(entries: &[(&str, TopicId)]) -> Self {
            Self {
                table: entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Clusterer for TableClusterer {
        async fn fit(&self, entities: &[String], _params: &ClusterParams) -> Result<ClusterFit> {
            self.calls.lock().unwrap().push(entities.to_vec());
            let topic_ids = entities
                .iter()
                .map(|e| self.table.get(e).copied().unwrap_or(CLUSTERLESS))
                .collect();
            let mut summary = TopicSummary::new();
            for (word, topic) in &self.table {
                summary
                    .entry(*topic)
                    .or_default()
                    .push(TopicWord::new(word.clone(), 1.0));
            }
            Ok(ClusterFit { topic_ids, summary })
        }

        fn name(&self) -> &str {
            "table"
        }
    }

    /// Drops the last topic id to break alignment
    struct ShortClusterer;

    #[async_trait]
    impl Clusterer for ShortClusterer {
        async fn fit(&self, entities: &[String], _params: &ClusterParams) -> Result<ClusterFit> {
            Ok(ClusterFit {
                topic_ids: vec![0; entities.len().saturating_sub(1)],
                summary: TopicSummary::new(),
            })
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    fn row(text: &str, pairs: &[(&str, &str)]) -> Row {
        Row::new(
            text,
            pairs
                .iter()
                .map(|(c, e)| CausalPair::new(*c, *e))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_same_entity_gets_same_topic() {
        let rows = vec![
            row("Rain causes floods", &[("rain", "flood")]),
            row("Rain again", &[("rain", "flood")]),
        ];
        let clusterer = TableClusterer::new(&[("rain", 0), ("flood", 1)]);

        let (graph, topics) = ClusterReconciler::default()
            .reconcile(&rows, &clusterer, &ClusterParams::default())
            .await
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph[0].cause_cluster, 0);
        assert_eq!(graph[1].cause_cluster, 0);
        assert_eq!(graph[0].effect_cluster, 1);
        assert_eq!(graph.iter().map(|r| r.id).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(topics.len(), 2);
    }

    #[tokio::test]
    async fn test_clusterer_called_once_with_deduplicated_entities() {
        let rows = vec![
            row("a", &[("Rain", "the flood"), ("rain!", "drought")]),
            row("b", &[("flood", "rain")]),
        ];
        let clusterer = TableClusterer::new(&[("rain", 0), ("flood", 1), ("drought", 2)]);

        ClusterReconciler::default()
            .reconcile(&rows, &clusterer, &ClusterParams::default())
            .await
            .unwrap();

        let calls = clusterer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["rain", "flood", "drought"]);
    }

    #[tokio::test]
    async fn test_entity_in_both_roles_maps_to_one_topic() {
        let rows = vec![
            row("a", &[("rain", "flood")]),
            row("b", &[("flood", "damage")]),
        ];
        let clusterer = TableClusterer::new(&[("rain", 0), ("flood", 1), ("damage", 2)]);

        let (graph, _) = ClusterReconciler::default()
            .reconcile(&rows, &clusterer, &ClusterParams::default())
            .await
            .unwrap();

        assert_eq!(graph[0].effect_cluster, graph[1].cause_cluster);
    }

    #[tokio::test]
    async fn test_empty_entity_set() {
        let rows = vec![
            row("a", &[("the", "of")]),
            row("b", &[("...", "it")]),
            row("c", &[]),
        ];
        let clusterer = TableClusterer::new(&[]);

        let result = ClusterReconciler::default()
            .reconcile(&rows, &clusterer, &ClusterParams::default())
            .await;

        assert!(matches!(result, Err(CausalError::EmptyEntitySet)));
        assert!(clusterer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pairs_with_empty_side_are_skipped() {
        let rows = vec![row("a", &[("rain", "it"), ("rain", "flood")])];
        let clusterer = TableClusterer::new(&[("rain", 0), ("flood", 1)]);

        let (graph, _) = ClusterReconciler::default()
            .reconcile(&rows, &clusterer, &ClusterParams::default())
            .await
            .unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph[0].id, 0);
        assert_eq!(graph[0].effect, "flood");
    }

    #[tokio::test]
    async fn test_outliers_keep_clusterless_marker() {
        let rows = vec![row("a", &[("rain", "flood"), ("noise", "flood")])];
        let clusterer = TableClusterer::new(&[("rain", 0), ("flood", 1)]);

        let (graph, _) = ClusterReconciler::default()
            .reconcile(&rows, &clusterer, &ClusterParams::default())
            .await
            .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph[1].cause_cluster, CLUSTERLESS);
        assert!(graph[1].is_clusterless());
    }

    #[tokio::test]
    async fn test_misaligned_clusterer_output_is_internal_fault() {
        let rows = vec![row("a", &[("rain", "flood")])];

        let result = ClusterReconciler::default()
            .reconcile(&rows, &ShortClusterer, &ClusterParams::default())
            .await;

        match result {
            Err(err @ CausalError::InternalConsistency(_)) => assert!(err.is_internal()),
            other => panic!("expected internal consistency fault, got {other:?}"),
        }
    }
}
