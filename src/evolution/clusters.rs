//! Weakly-connected component detection over the edge set.

use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::graph::{KnowledgeGraph, NodeId};

/// Smallest component reported as a cluster.
pub const MIN_CLUSTER_SIZE: usize = 2;

/// Finds groups of nodes joined directly or transitively by edges.
#[derive(Debug, Clone, Default)]
pub struct ClusterDetector;

impl ClusterDetector {
    pub fn new() -> Self {
        Self
    }

    /// Components of size >= 2, ignoring edge direction.
    ///
    /// Members are sorted by id and clusters by their first member, so the
    /// result depends only on the edge set. Nodes in `excluded` are treated
    /// as absent.
    pub fn clusters(&self, graph: &KnowledgeGraph, excluded: &HashSet<NodeId>) -> Vec<Vec<NodeId>> {
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut clusters = Vec::new();

        for start in graph.nodes().map(|n| &n.id) {
            if excluded.contains(start) || !visited.insert(start) {
                continue;
            }

            let mut component: BTreeSet<NodeId> = BTreeSet::new();
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                component.insert(current.clone());
                for next in graph.neighbor_ids(current) {
                    if !excluded.contains(next) && visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }

            if component.len() >= MIN_CLUSTER_SIZE {
                clusters.push(component.into_iter().collect());
            }
        }

        clusters
    }
}
