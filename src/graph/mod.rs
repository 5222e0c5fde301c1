//! Knowledge graph: content-addressed nodes linked by text similarity.
//!
//! - **Nodes** carry a concept label and a structured payload; their id is a
//!   hash of both, so inserting the same fact twice is an upsert.
//! - **Edges** are created on insert for every pair whose similarity clears
//!   the connection threshold, bucketed into `equivalent`,
//!   `strongly_related`, `related` and `weakly_related`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use evolving_knowledge::graph::{JaccardScorer, KnowledgeGraph, KnowledgeNode, LinkOptions};
//!
//! let mut graph = KnowledgeGraph::new();
//! let plan = graph.plan_insert(node, &JaccardScorer, &options, Utc::now());
//! graph.apply(plan);
//! ```

mod similarity;
mod store;
mod types;

pub use similarity::{jaccard, tokenize, JaccardScorer, SimilarityScorer};
pub use store::{InsertPlan, KnowledgeGraph, LinkOptions};
pub use types::{
    canonical_json, clamp_unit, value_repr, ConnectionType, EdgeKey, KnowledgeEdge,
    KnowledgeInput, KnowledgeNode, KnowledgeType, NodeId, Payload, SEMANTIC_SIMILARITY,
};
