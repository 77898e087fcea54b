//! causegraph Extractor - Causal graph assembly pipeline
//!
//! Turns predictor output (rows of cause/effect pairs) into a flat
//! causal graph table:
//! - Entity normalization into canonical clustering keys
//! - Plain graph assembly with clusterless markers
//! - Topic reconciliation of deduplicated entities back onto every pair
//! - A collapsed, queryable network view of the result

pub mod builder;
pub mod network;
pub mod preprocess;
pub mod reconcile;

pub use builder::GraphBuilder;
pub use network::{CausalNetwork, NetworkEdge, NetworkNode};
pub use preprocess::{EntityPreprocessor, PreprocessOptions};
pub use reconcile::ClusterReconciler;
