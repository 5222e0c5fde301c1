//! Durable record store for the knowledge graph.
//!
//! The engine keeps its working state in memory and writes every mutation
//! through a [`KnowledgeStore`] as a [`WriteBatch`]. A batch is committed
//! atomically; the in-memory state is only updated after the commit
//! succeeds, so a failed write leaves readers on the previous state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use evolving_knowledge::storage::{KnowledgeStore, SqliteKnowledgeStore, WriteBatch};
//!
//! let store = SqliteKnowledgeStore::in_memory()?;
//! store.commit(&WriteBatch::new().with_node(node))?;
//! let snapshot = store.load_snapshot()?;
//! ```

mod schema;
mod sqlite;

pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use sqlite::SqliteKnowledgeStore;

use crate::error::Result;
use crate::evolution::{ForgettingEvent, LearningParameters, MemoryUsageRecord};
use crate::graph::{EdgeKey, KnowledgeEdge, KnowledgeNode, NodeId};

/// A set of upserts and deletions applied in one transaction.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub nodes: Vec<KnowledgeNode>,
    pub edges: Vec<KnowledgeEdge>,
    pub removed_edges: Vec<EdgeKey>,
    pub usage: Vec<MemoryUsageRecord>,
    pub forgetting_events: Vec<ForgettingEvent>,
    pub parameters: Option<LearningParameters>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: KnowledgeNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_usage(mut self, record: MemoryUsageRecord) -> Self {
        self.usage.push(record);
        self
    }

    pub fn with_forgetting_event(mut self, event: ForgettingEvent) -> Self {
        self.forgetting_events.push(event);
        self
    }

    pub fn with_parameters(mut self, parameters: LearningParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.removed_edges.is_empty()
            && self.usage.is_empty()
            && self.forgetting_events.is_empty()
            && self.parameters.is_none()
    }
}

/// Everything needed to rebuild the engine's in-memory state.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub nodes: Vec<KnowledgeNode>,
    pub edges: Vec<KnowledgeEdge>,
    pub usage: Vec<MemoryUsageRecord>,
    /// `None` when no tuning has been persisted yet
    pub parameters: Option<LearningParameters>,
}

/// Durable, key-addressable record store.
///
/// Every write is an idempotent upsert by primary key: nodes by id, edges by
/// (source, target), usage records by node id and forgetting events by
/// (node id, forgotten_at).
pub trait KnowledgeStore: Send + Sync {
    /// Load all persisted state.
    fn load_snapshot(&self) -> Result<StoreSnapshot>;

    /// Apply a batch atomically.
    fn commit(&self, batch: &WriteBatch) -> Result<()>;

    /// Audit trail for a node, oldest first.
    fn forgetting_events(&self, node_id: &NodeId) -> Result<Vec<ForgettingEvent>>;
}
