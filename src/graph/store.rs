//! In-memory knowledge graph: nodes, similarity edges and an undirected
//! adjacency index.
//!
//! Inserts are split into a planning step (`plan_insert`, read-only) and an
//! application step (`apply`). The engine persists a plan before applying it,
//! so readers never observe a node whose edges are still being created.

use crate::graph::similarity::SimilarityScorer;
use crate::graph::types::*;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Limits and filters for the similarity scan performed on insert.
#[derive(Debug, Clone)]
pub struct LinkOptions<'a> {
    /// Minimum score for an edge to exist
    pub connection_threshold: f64,
    /// Maximum number of existing nodes compared per insert
    pub max_candidates: usize,
    /// Nodes that neither gain nor keep similarity edges
    pub excluded: &'a HashSet<NodeId>,
}

/// Changes an insert will make to the graph.
#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub node: KnowledgeNode,
    /// Whether a node with this id already exists
    pub replaces: bool,
    pub created_edges: Vec<KnowledgeEdge>,
    pub updated_edges: Vec<KnowledgeEdge>,
    pub removed_edges: Vec<EdgeKey>,
}

impl InsertPlan {
    /// All edges to upsert.
    pub fn edge_upserts(&self) -> impl Iterator<Item = &KnowledgeEdge> {
        self.created_edges.iter().chain(self.updated_edges.iter())
    }
}

/// Graph of knowledge nodes linked by similarity.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<NodeId, KnowledgeNode>,
    edges: BTreeMap<EdgeKey, KnowledgeEdge>,
    adjacency: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from persisted records. Edges with a missing endpoint
    /// are dropped.
    pub fn from_parts(
        nodes: impl IntoIterator<Item = KnowledgeNode>,
        edges: impl IntoIterator<Item = KnowledgeEdge>,
    ) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            if graph.contains(&edge.source) && graph.contains(&edge.target) {
                graph.put_edge(edge);
            } else {
                tracing::warn!(
                    source = %edge.source,
                    target = %edge.target,
                    "dropping edge with missing endpoint"
                );
            }
        }
        graph
    }

    // ==================== Reads ====================

    pub fn get(&self, id: &NodeId) -> Option<&KnowledgeNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &KnowledgeNode> {
        self.nodes.values()
    }

    /// Edges in (source, target) order.
    pub fn edges(&self) -> impl Iterator<Item = &KnowledgeEdge> {
        self.edges.values()
    }

    /// The directed edge `source -> target`.
    pub fn edge(&self, source: &NodeId, target: &NodeId) -> Option<&KnowledgeEdge> {
        self.edges.get(&(source.clone(), target.clone()))
    }

    /// The edge joining two nodes in either direction.
    pub fn edge_between(&self, a: &NodeId, b: &NodeId) -> Option<&KnowledgeEdge> {
        self.edge(a, b).or_else(|| self.edge(b, a))
    }

    /// Ids of nodes sharing an edge with `id`, in either direction.
    pub fn neighbor_ids(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.adjacency.get(id).into_iter().flatten()
    }

    /// Nodes sharing an edge with `id`.
    pub fn neighbors(&self, id: &NodeId) -> Vec<&KnowledgeNode> {
        self.neighbor_ids(id)
            .filter_map(|n| self.nodes.get(n))
            .collect()
    }

    /// Edges incident to `id`.
    pub fn edges_of(&self, id: &NodeId) -> Vec<&KnowledgeEdge> {
        self.neighbor_ids(id)
            .filter_map(|n| self.edge_between(id, n))
            .collect()
    }

    // ==================== Inserts ====================

    /// Work out how inserting `node` changes the graph, without mutating it.
    ///
    /// Every candidate node is scored against `node`. Pairs at or above the
    /// connection threshold get an edge: an existing edge between the pair
    /// is re-scored in whichever direction it already runs, otherwise a new
    /// `node -> candidate` edge is created. Existing similarity edges whose
    /// pair now scores below the threshold are removed.
    pub fn plan_insert(
        &self,
        node: KnowledgeNode,
        scorer: &dyn SimilarityScorer,
        options: &LinkOptions<'_>,
        now: DateTime<Utc>,
    ) -> InsertPlan {
        let replaces = self.contains(&node.id);
        let mut plan = InsertPlan {
            node,
            replaces,
            created_edges: Vec::new(),
            updated_edges: Vec::new(),
            removed_edges: Vec::new(),
        };

        if options.excluded.contains(&plan.node.id) {
            plan.removed_edges = self
                .edges_of(&plan.node.id)
                .into_iter()
                .map(KnowledgeEdge::key)
                .collect();
            return plan;
        }

        let text = plan.node.content_text();
        for candidate in self.scan_candidates(&plan.node.id, options) {
            let score = scorer.score(
                &plan.node.concept,
                &text,
                &candidate.concept,
                &candidate.content_text(),
            );
            let existing = self.edge_between(&plan.node.id, &candidate.id);

            if score >= options.connection_threshold {
                match existing {
                    Some(edge) => {
                        let mut edge = edge.clone();
                        edge.reinforce(score, now);
                        plan.updated_edges.push(edge);
                    }
                    None => plan.created_edges.push(KnowledgeEdge::similarity(
                        plan.node.id.clone(),
                        candidate.id.clone(),
                        score,
                        now,
                    )),
                }
            } else if let Some(edge) = existing {
                if edge.evidence == SEMANTIC_SIMILARITY {
                    plan.removed_edges.push(edge.key());
                }
            }
        }

        plan
    }

    /// Nodes compared against an incoming node: everything except the node
    /// itself and excluded ids, most recently accessed first when the graph
    /// exceeds the scan bound.
    fn scan_candidates(&self, id: &NodeId, options: &LinkOptions<'_>) -> Vec<&KnowledgeNode> {
        let mut candidates: Vec<&KnowledgeNode> = self
            .nodes
            .values()
            .filter(|n| &n.id != id && !options.excluded.contains(&n.id))
            .collect();

        if candidates.len() > options.max_candidates {
            tracing::debug!(
                total = candidates.len(),
                bound = options.max_candidates,
                "similarity scan truncated"
            );
            candidates.sort_by(|a, b| {
                b.last_accessed_at
                    .cmp(&a.last_accessed_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            candidates.truncate(options.max_candidates);
        }
        candidates
    }

    /// Apply a plan produced by `plan_insert`.
    pub fn apply(&mut self, plan: InsertPlan) {
        for key in &plan.removed_edges {
            self.remove_edge(key);
        }
        self.nodes.insert(plan.node.id.clone(), plan.node);
        for edge in plan.created_edges.into_iter().chain(plan.updated_edges) {
            self.put_edge(edge);
        }
    }

    /// Replace a node's record without touching its edges.
    pub fn replace_node(&mut self, node: KnowledgeNode) -> bool {
        if !self.contains(&node.id) {
            return false;
        }
        self.nodes.insert(node.id.clone(), node);
        true
    }

    fn put_edge(&mut self, edge: KnowledgeEdge) {
        self.adjacency
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.target.clone());
        self.adjacency
            .entry(edge.target.clone())
            .or_default()
            .insert(edge.source.clone());
        self.edges.insert(edge.key(), edge);
    }

    fn remove_edge(&mut self, key: &EdgeKey) {
        if self.edges.remove(key).is_none() {
            return;
        }
        let (source, target) = key;
        // The reverse edge may still join the pair.
        if self.edge(target, source).is_some() {
            return;
        }
        if let Some(set) = self.adjacency.get_mut(source) {
            set.remove(target);
        }
        if let Some(set) = self.adjacency.get_mut(target) {
            set.remove(source);
        }
    }
}
