//! # evolving-knowledge
//!
//! A self-organizing knowledge graph. Facts go in as concept/content records;
//! the store links them by text similarity, merges conflicting updates to the
//! same concept, decays and archives what stops being used, and feeds
//! insights synthesized from clusters of related facts back into itself.
//!
//! ## Core Components
//!
//! - **Graph**: content-addressed nodes, similarity edges, Jaccard scoring
//! - **Evolution**: conflict resolution, clustering, insight synthesis,
//!   forgetting-curve decay and parameter tuning
//! - **Storage**: SQLite record store with transactional write batches
//! - **Engine**: the single-writer core tying the above together
//! - **Facade**: async handle for host applications
//!
//! ## Example
//!
//! ```rust,ignore
//! use evolving_knowledge::{EvolvingKnowledge, KnowledgeConfig};
//! use serde_json::json;
//!
//! let knowledge = EvolvingKnowledge::open(KnowledgeConfig::default())?;
//! knowledge.integrate_json(json!({
//!     "concept": "deep_learning",
//!     "content": {"definition": "neural networks with many layers"},
//!     "confidence": 0.8,
//!     "type": "research"
//! })).await;
//!
//! let report = knowledge.evolve_understanding().await?;
//! println!("{} new insights", report.new_insights.len());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod evolution;
pub mod facade;
pub mod graph;
pub mod storage;

// Re-exports for convenience
pub use config::{ArchivePolicy, KnowledgeConfig};
pub use engine::{
    EvolutionMetrics, EvolutionReport, IntegrationOutcome, KnowledgeEngine, KnowledgeStatus,
};
pub use error::{Error, Result};
pub use evolution::{
    CancelFlag, Conflict, DecayReport, ForgettingEvent, Insight, InsightType, LearningParameters,
    MemoryUsageRecord,
};
#[cfg(feature = "tokio-runtime")]
pub use facade::MaintenanceHandle;
pub use facade::EvolvingKnowledge;
pub use graph::{
    ConnectionType, KnowledgeEdge, KnowledgeInput, KnowledgeNode, KnowledgeType, NodeId, Payload,
};
pub use storage::{KnowledgeStore, SqliteKnowledgeStore, StoreSnapshot, WriteBatch};
