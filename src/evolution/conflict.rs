//! Conflict detection and heuristic resolution between facts about the
//! same concept.
//!
//! Resolution is local and never rejects an insert: an incoming record that
//! is no more confident than an existing one is merged into that node's
//! content, and each conflicting key keeps the existing value only when the
//! existing node beats the incoming one by more than the near-tie margin.

use std::collections::BTreeMap;

use crate::evolution::types::Conflict;
use crate::graph::{value_repr, KnowledgeGraph, KnowledgeNode};

/// Confidence deficit within which the incoming value still wins.
pub const NEAR_TIE_MARGIN: f64 = 0.2;

/// Detects and merges competing writes.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    near_tie_margin: f64,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self {
            near_tie_margin: NEAR_TIE_MARGIN,
        }
    }
}

impl ConflictResolver {
    pub fn new(near_tie_margin: f64) -> Self {
        Self { near_tie_margin }
    }

    /// Every key shared between `new_node` and an existing node with the same
    /// concept whose values render differently.
    pub fn detect_conflicts(&self, graph: &KnowledgeGraph, new_node: &KnowledgeNode) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for existing in graph.nodes().filter(|n| n.concept == new_node.concept) {
            for (key, new_value) in &new_node.content {
                let Some(existing_value) = existing.content.get(key) else {
                    continue;
                };
                if value_repr(existing_value) != value_repr(new_value) {
                    conflicts.push(Conflict {
                        existing_id: existing.id.clone(),
                        key: key.clone(),
                        existing_content: existing_value.clone(),
                        new_content: new_value.clone(),
                        confidence_diff: new_node.confidence - existing.confidence,
                    });
                }
            }
        }

        conflicts
    }

    /// Merge `conflicts` into `new_node`, re-deriving its id from the
    /// resolved content.
    ///
    /// The conflict with the lowest `confidence_diff` names the deciding
    /// existing node. When that diff is positive the incoming content wins
    /// outright. Otherwise the merge starts from the deciding node's content
    /// and overlays the incoming keys: a key the existing node lacks is
    /// added, and a conflicting key keeps the incoming value only when its
    /// own decisive diff is above `-near_tie_margin`. When an existing value
    /// is kept the resolved confidence is raised to that node's confidence.
    pub fn resolve(
        &self,
        graph: &KnowledgeGraph,
        conflicts: &[Conflict],
        new_node: KnowledgeNode,
    ) -> KnowledgeNode {
        let Some(decider) = conflicts
            .iter()
            .min_by(|a, b| a.confidence_diff.total_cmp(&b.confidence_diff))
        else {
            return new_node;
        };
        if decider.confidence_diff > 0.0 {
            return new_node;
        }

        let mut decisive: BTreeMap<&str, &Conflict> = BTreeMap::new();
        for conflict in conflicts {
            decisive
                .entry(conflict.key.as_str())
                .and_modify(|current| {
                    if conflict.confidence_diff < current.confidence_diff {
                        *current = conflict;
                    }
                })
                .or_insert(conflict);
        }

        let mut resolved = new_node;
        let mut content = graph
            .get(&decider.existing_id)
            .map(|existing| existing.content.clone())
            .unwrap_or_default();
        let mut confidence = resolved.confidence;

        for (key, new_value) in &resolved.content {
            match decisive.get(key.as_str()) {
                Some(conflict) if conflict.confidence_diff <= -self.near_tie_margin => {
                    content.insert(key.clone(), conflict.existing_content.clone());
                    confidence = confidence.max(resolved.confidence - conflict.confidence_diff);
                }
                _ => {
                    content.insert(key.clone(), new_value.clone());
                }
            }
        }

        resolved.set_content(content);
        resolved.confidence = confidence.clamp(0.0, 1.0);
        resolved
    }
}
