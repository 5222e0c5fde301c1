//! Insight synthesis: turns clusters into candidate knowledge and gates it
//! before it is fed back into the graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashSet};

use crate::evolution::types::{Insight, InsightType};
use crate::graph::{KnowledgeGraph, KnowledgeNode, KnowledgeType, NodeId, Payload};

/// Configuration for insight synthesis and validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Candidates below this confidence are dropped
    pub min_confidence: f64,
    /// Smallest same-typed cluster reported as a specialization
    pub specialization_min_size: usize,
    pub specialization_confidence: f64,
    /// Edge strength a pair must exceed to count as strongly connected
    pub strong_connection_threshold: f64,
    pub strong_connection_confidence: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            specialization_min_size: 3,
            specialization_confidence: 0.7,
            strong_connection_threshold: 0.7,
            strong_connection_confidence: 0.8,
        }
    }
}

/// Why a candidate insight was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    LowConfidence,
    NoSources,
    EmptyDescription,
    Duplicate,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowConfidence => write!(f, "low_confidence"),
            Self::NoSources => write!(f, "no_sources"),
            Self::EmptyDescription => write!(f, "empty_description"),
            Self::Duplicate => write!(f, "duplicate"),
        }
    }
}

/// Generates and validates insights.
#[derive(Debug, Clone, Default)]
pub struct InsightSynthesizer {
    config: InsightConfig,
}

impl InsightSynthesizer {
    pub fn new(config: InsightConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    /// Candidate insights for every cluster, in cluster order.
    pub fn synthesize(&self, graph: &KnowledgeGraph, clusters: &[Vec<NodeId>]) -> Vec<Insight> {
        let mut candidates = Vec::new();
        for cluster in clusters {
            if let Some(insight) = self.specialization(graph, cluster) {
                candidates.push(insight);
            }
            candidates.extend(self.strong_connections(graph, cluster));
        }
        candidates
    }

    /// All members share one knowledge type and the cluster is large enough.
    fn specialization(&self, graph: &KnowledgeGraph, cluster: &[NodeId]) -> Option<Insight> {
        if cluster.len() < self.config.specialization_min_size {
            return None;
        }
        let members: Vec<&KnowledgeNode> = cluster.iter().filter_map(|id| graph.get(id)).collect();
        if members.len() != cluster.len() {
            return None;
        }

        let knowledge_type = members[0].knowledge_type;
        if members.iter().any(|n| n.knowledge_type != knowledge_type) {
            return None;
        }

        let concepts: BTreeSet<&str> = members.iter().map(|n| n.concept.as_str()).collect();
        Some(Insight {
            insight_type: InsightType::SpecializationPattern,
            description: format!(
                "Specialization area in {} knowledge across {} concepts: {}",
                knowledge_type,
                concepts.len(),
                concepts.into_iter().collect::<Vec<_>>().join(", ")
            ),
            confidence: self.config.specialization_confidence,
            sources: cluster.to_vec(),
            node_id: None,
        })
    }

    /// One insight per intra-cluster edge stronger than the threshold.
    fn strong_connections(&self, graph: &KnowledgeGraph, cluster: &[NodeId]) -> Vec<Insight> {
        let members: HashSet<&NodeId> = cluster.iter().collect();
        let mut insights = Vec::new();

        for id in cluster {
            for edge in graph.edges_of(id) {
                let Some(other) = edge.other(id) else {
                    continue;
                };
                // Visit each pair once, from its lower id.
                if other <= id || !members.contains(other) {
                    continue;
                }
                if edge.strength <= self.config.strong_connection_threshold {
                    continue;
                }
                let (Some(a), Some(b)) = (graph.get(id), graph.get(other)) else {
                    continue;
                };
                insights.push(Insight {
                    insight_type: InsightType::StrongConnection,
                    description: format!(
                        "Strong connection between '{}' and '{}' ({})",
                        a.concept, b.concept, edge.connection_type
                    ),
                    confidence: self.config.strong_connection_confidence,
                    sources: vec![id.clone(), other.clone()],
                    node_id: None,
                });
            }
        }

        insights
    }

    /// Gate a candidate against the thresholds and the set of descriptions
    /// already present in the graph.
    pub fn validate(&self, insight: &Insight, known: &HashSet<String>) -> Result<(), Rejection> {
        if insight.confidence < self.config.min_confidence {
            return Err(Rejection::LowConfidence);
        }
        if insight.sources.is_empty() {
            return Err(Rejection::NoSources);
        }
        if insight.description.trim().is_empty() {
            return Err(Rejection::EmptyDescription);
        }
        if known.contains(&insight.description) {
            return Err(Rejection::Duplicate);
        }
        Ok(())
    }

    /// Descriptions of every insight-typed node in the graph.
    pub fn known_descriptions(graph: &KnowledgeGraph) -> HashSet<String> {
        graph
            .nodes()
            .filter(|n| n.knowledge_type == KnowledgeType::Insight)
            .filter_map(|n| n.description().map(str::to_string))
            .collect()
    }

    /// The node an accepted insight is stored as.
    pub fn to_node(insight: &Insight, now: DateTime<Utc>) -> KnowledgeNode {
        let mut content = Payload::new();
        content.insert("description".into(), Value::String(insight.description.clone()));
        content.insert("pattern_type".into(), json!(insight.insight_type.as_str()));

        let sources: Vec<Value> = insight
            .sources
            .iter()
            .map(|id| Value::String(id.to_string()))
            .collect();

        KnowledgeNode::new(insight.insight_type.as_str(), content)
            .with_confidence(insight.confidence)
            .with_type(KnowledgeType::Insight)
            .with_timestamps(now)
            .with_metadata("sources", Value::Array(sources))
            .with_metadata("synthesized", true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::clusters::ClusterDetector;
    use crate::graph::{JaccardScorer, LinkOptions};
    use pretty_assertions::assert_eq;

    fn build(nodes: Vec<KnowledgeNode>) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        let none = HashSet::new();
        let options = LinkOptions {
            connection_threshold: 0.3,
            max_candidates: 100,
            excluded: &none,
        };
        for node in nodes {
            let plan = graph.plan_insert(node, &JaccardScorer, &options, Utc::now());
            graph.apply(plan);
        }
        graph
    }

    fn node(concept: &str, text: &str, kind: KnowledgeType) -> KnowledgeNode {
        KnowledgeNode::new(concept, json!({ "text": text }).as_object().cloned().unwrap())
            .with_type(kind)
    }

    #[test]
    fn test_specialization_requires_shared_type_and_size() {
        let graph = build(vec![
            node("a", "red green blue", KnowledgeType::Research),
            node("b", "red green blue", KnowledgeType::Research),
            node("c", "red green blue", KnowledgeType::Research),
        ]);
        let clusters = ClusterDetector::new().clusters(&graph, &HashSet::new());
        let synth = InsightSynthesizer::default();
        let candidates = synth.synthesize(&graph, &clusters);

        let specs: Vec<&Insight> = candidates
            .iter()
            .filter(|i| i.insight_type == InsightType::SpecializationPattern)
            .collect();
        assert_eq!(specs.len(), 1);
        assert_eq!(
            specs[0].description,
            "Specialization area in research knowledge across 3 concepts: a, b, c"
        );
        assert_eq!(specs[0].sources.len(), 3);
        assert_eq!(specs[0].confidence, 0.7);
    }

    #[test]
    fn test_mixed_types_yield_no_specialization() {
        let graph = build(vec![
            node("a", "red green blue", KnowledgeType::Research),
            node("b", "red green blue", KnowledgeType::General),
            node("c", "red green blue", KnowledgeType::Research),
        ]);
        let clusters = ClusterDetector::new().clusters(&graph, &HashSet::new());
        let candidates = InsightSynthesizer::default().synthesize(&graph, &clusters);

        assert!(candidates
            .iter()
            .all(|i| i.insight_type != InsightType::SpecializationPattern));
    }

    #[test]
    fn test_strong_connection_pairs() {
        // {a, text, x, y, z, w} vs {b, text, x, y, z, w} scores 5/7
        let graph = build(vec![
            node("a", "x y z w", KnowledgeType::General),
            node("b", "x y z w", KnowledgeType::General),
        ]);
        let clusters = ClusterDetector::new().clusters(&graph, &HashSet::new());
        let candidates = InsightSynthesizer::default().synthesize(&graph, &clusters);

        assert_eq!(candidates.len(), 1);
        let insight = &candidates[0];
        assert_eq!(insight.insight_type, InsightType::StrongConnection);
        assert_eq!(insight.sources.len(), 2);
        assert_eq!(insight.confidence, 0.8);
        assert!(insight.description.contains("'a'") && insight.description.contains("'b'"));
    }

    #[test]
    fn test_validation_gate() {
        let synth = InsightSynthesizer::default();
        let good = Insight {
            insight_type: InsightType::StrongConnection,
            description: "d".into(),
            confidence: 0.8,
            sources: vec![NodeId::from_raw("n")],
            node_id: None,
        };
        assert_eq!(synth.validate(&good, &HashSet::new()), Ok(()));

        let low = Insight { confidence: 0.4, ..good.clone() };
        assert_eq!(synth.validate(&low, &HashSet::new()), Err(Rejection::LowConfidence));

        let orphan = Insight { sources: vec![], ..good.clone() };
        assert_eq!(synth.validate(&orphan, &HashSet::new()), Err(Rejection::NoSources));

        let blank = Insight { description: "  ".into(), ..good.clone() };
        assert_eq!(synth.validate(&blank, &HashSet::new()), Err(Rejection::EmptyDescription));

        let known: HashSet<String> = ["d".to_string()].into_iter().collect();
        assert_eq!(synth.validate(&good, &known), Err(Rejection::Duplicate));
    }

    #[test]
    fn test_to_node_records_sources() {
        let insight = Insight {
            insight_type: InsightType::SpecializationPattern,
            description: "pattern".into(),
            confidence: 0.7,
            sources: vec![NodeId::from_raw("n1"), NodeId::from_raw("n2")],
            node_id: None,
        };
        let node = InsightSynthesizer::to_node(&insight, Utc::now());

        assert_eq!(node.knowledge_type, KnowledgeType::Insight);
        assert_eq!(node.description(), Some("pattern"));
        assert_eq!(node.sources(), insight.sources);

        let graph = build(vec![node]);
        assert!(InsightSynthesizer::known_descriptions(&graph).contains("pattern"));
    }
}
