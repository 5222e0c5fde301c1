//! Synchronous knowledge engine.
//!
//! [`KnowledgeEngine`] owns the graph, the decay manager and the learning
//! parameters, and writes every mutation through a [`KnowledgeStore`].
//! Mutations take `&mut self`, so the borrow checker (or the facade's
//! write lock) makes the engine a single writer.
//!
//! Each mutation is planned against the current state, committed as one
//! [`WriteBatch`], and only then applied in memory. A failed commit leaves
//! the engine exactly as it was.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ArchivePolicy, KnowledgeConfig};
use crate::error::{Error, Result};
use crate::evolution::{
    CancelFlag, ClusterDetector, Conflict, ConflictResolver, DecayManager, DecayReport,
    ForgettingEvent, Insight, InsightSynthesizer, LearningParameters, MemoryUsageRecord,
    ParameterAdjustment, ParameterOptimizer,
};
use crate::graph::{
    JaccardScorer, KnowledgeEdge, KnowledgeGraph, KnowledgeInput, KnowledgeNode,
    LinkOptions, NodeId, SimilarityScorer,
};
use crate::storage::{KnowledgeStore, SqliteKnowledgeStore, WriteBatch};

/// What one `integrate` call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationOutcome {
    /// Id of the stored node after conflict resolution
    pub node_id: NodeId,
    /// A node with this id already existed and was overwritten
    pub replaced: bool,
    pub conflicts: Vec<Conflict>,
    pub edges_created: usize,
    pub edges_updated: usize,
    pub edges_removed: usize,
    pub parameters: ParameterAdjustment,
}

/// Before/after figures for one evolution pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionMetrics {
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub edges_before: usize,
    pub edges_after: usize,
    pub candidates: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Accepted insights that failed to persist
    pub errors: usize,
    pub average_confidence: f64,
    pub elapsed_ms: u64,
}

/// Result of `evolve`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionReport {
    pub new_insights: Vec<Insight>,
    pub knowledge_evolution: EvolutionMetrics,
    pub clusters_analyzed: usize,
}

/// Snapshot of the store's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStatus {
    pub total_nodes: usize,
    pub total_connections: usize,
    /// Node count per knowledge type tag
    pub knowledge_types: BTreeMap<String, usize>,
    pub average_confidence: f64,
    /// `edges / (n * (n - 1))`, 0 for fewer than two nodes
    pub connectivity_density: f64,
    /// Nodes created within the configured recent window
    pub recent_additions: usize,
    pub archived_nodes: usize,
    /// Nodes at or above the current confidence threshold
    pub high_confidence_nodes: usize,
    pub parameters: LearningParameters,
}

/// Single-writer core of the knowledge store.
pub struct KnowledgeEngine {
    config: KnowledgeConfig,
    store: Arc<dyn KnowledgeStore>,
    scorer: Box<dyn SimilarityScorer>,
    graph: KnowledgeGraph,
    decay: DecayManager,
    parameters: LearningParameters,
    resolver: ConflictResolver,
    detector: ClusterDetector,
    synthesizer: InsightSynthesizer,
    optimizer: ParameterOptimizer,
}

impl std::fmt::Debug for KnowledgeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeEngine")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl KnowledgeEngine {
    /// Open the store named by `config`, in memory when no path is set.
    pub fn open(config: KnowledgeConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn KnowledgeStore> = match config.resolved_database_path() {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Arc::new(SqliteKnowledgeStore::open(&path)?)
            }
            None => Arc::new(SqliteKnowledgeStore::in_memory()?),
        };
        Self::with_store(config, store)
    }

    /// Build an engine over an existing store, restoring its persisted state.
    pub fn with_store(config: KnowledgeConfig, store: Arc<dyn KnowledgeStore>) -> Result<Self> {
        config.validate()?;
        let snapshot = store.load_snapshot()?;

        let restored = snapshot.parameters.is_some();
        let mut parameters = snapshot.parameters.unwrap_or(config.initial_parameters);
        config.parameter_bounds.apply(&mut parameters);

        let graph = KnowledgeGraph::from_parts(snapshot.nodes, snapshot.edges);
        let decay = DecayManager::from_records(config.decay.clone(), snapshot.usage);

        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            usage_records = decay.len(),
            restored_parameters = restored,
            "knowledge engine opened"
        );

        Ok(Self {
            resolver: ConflictResolver::default(),
            detector: ClusterDetector::new(),
            synthesizer: InsightSynthesizer::new(config.insight.clone()),
            optimizer: ParameterOptimizer::new(config.parameter_bounds),
            scorer: Box::new(JaccardScorer),
            store,
            graph,
            decay,
            parameters,
            config,
        })
    }

    /// Replace the similarity scorer used for future inserts.
    pub fn with_scorer(mut self, scorer: impl SimilarityScorer + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    // ==================== Reads ====================

    pub fn config(&self) -> &KnowledgeConfig {
        &self.config
    }

    pub fn parameters(&self) -> LearningParameters {
        self.parameters
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn get(&self, id: &NodeId) -> Option<&KnowledgeNode> {
        self.graph.get(id)
    }

    pub fn all_nodes(&self) -> Vec<&KnowledgeNode> {
        self.graph.nodes().collect()
    }

    pub fn neighbors(&self, id: &NodeId) -> Vec<&KnowledgeNode> {
        self.graph.neighbors(id)
    }

    pub fn edges_of(&self, id: &NodeId) -> Vec<&KnowledgeEdge> {
        self.graph.edges_of(id)
    }

    pub fn edge(&self, source: &NodeId, target: &NodeId) -> Option<&KnowledgeEdge> {
        self.graph.edge(source, target)
    }

    pub fn usage(&self, id: &NodeId) -> Option<&MemoryUsageRecord> {
        self.decay.get(id)
    }

    pub fn is_archived(&self, id: &NodeId) -> bool {
        self.decay.is_archived(id)
    }

    /// Weakly-connected components of size >= 2.
    pub fn clusters(&self) -> Vec<Vec<NodeId>> {
        self.detector.clusters(&self.graph, &self.excluded())
    }

    pub fn forgetting_events(&self, id: &NodeId) -> Result<Vec<ForgettingEvent>> {
        self.store.forgetting_events(id)
    }

    /// Nodes left out of similarity, clustering and synthesis.
    fn excluded(&self) -> HashSet<NodeId> {
        match self.config.archive_policy {
            ArchivePolicy::Retain => HashSet::new(),
            ArchivePolicy::Exclude => self.decay.archived_ids(),
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> KnowledgeStatus {
        let total_nodes = self.graph.node_count();
        let total_connections = self.graph.edge_count();
        let recent_cutoff = now - Duration::hours(self.config.recent_window_hours);

        let mut knowledge_types: BTreeMap<String, usize> = BTreeMap::new();
        let mut confidence_sum = 0.0;
        let mut recent_additions = 0;
        let mut high_confidence_nodes = 0;
        for node in self.graph.nodes() {
            *knowledge_types
                .entry(node.knowledge_type.as_str().to_string())
                .or_default() += 1;
            confidence_sum += node.confidence;
            if node.created_at >= recent_cutoff {
                recent_additions += 1;
            }
            if node.confidence >= self.parameters.confidence_threshold {
                high_confidence_nodes += 1;
            }
        }

        let average_confidence = if total_nodes == 0 {
            0.0
        } else {
            confidence_sum / total_nodes as f64
        };
        let connectivity_density = if total_nodes < 2 {
            0.0
        } else {
            total_connections as f64 / (total_nodes * (total_nodes - 1)) as f64
        };

        KnowledgeStatus {
            total_nodes,
            total_connections,
            knowledge_types,
            average_confidence,
            connectivity_density,
            recent_additions,
            archived_nodes: self.decay.archived_ids().len(),
            high_confidence_nodes,
            parameters: self.parameters,
        }
    }

    // ==================== Mutations ====================

    /// Resolve conflicts, upsert the node, link it by similarity, touch its
    /// usage record and adjust the learning parameters, all in one commit.
    pub fn integrate(&mut self, input: KnowledgeInput, now: DateTime<Utc>) -> Result<IntegrationOutcome> {
        let node = input.into_node(now);

        let conflicts = self.resolver.detect_conflicts(&self.graph, &node);
        for conflict in &conflicts {
            info!(
                concept = %node.concept,
                key = %conflict.key,
                existing_id = %conflict.existing_id,
                confidence_diff = conflict.confidence_diff,
                "knowledge conflict resolved"
            );
        }
        let mut node = self.resolver.resolve(&self.graph, &conflicts, node);

        if let Some(existing) = self.graph.get(&node.id) {
            node.created_at = existing.created_at;
            node.usage_count = existing.usage_count + 1;
        }

        let excluded = self.excluded();
        let options = LinkOptions {
            connection_threshold: self.parameters.connection_threshold,
            max_candidates: self.config.max_similarity_candidates,
            excluded: &excluded,
        };
        let plan = self.graph.plan_insert(node, self.scorer.as_ref(), &options, now);
        let usage = self
            .decay
            .plan_insert(&plan.node, self.parameters.learning_rate, now);
        let adjustment = self
            .optimizer
            .update_from_knowledge(&self.parameters, &plan.node);

        let mut batch = WriteBatch::new()
            .with_node(plan.node.clone())
            .with_usage(usage.clone());
        batch.edges.extend(plan.edge_upserts().cloned());
        batch.removed_edges.extend(plan.removed_edges.iter().cloned());
        if adjustment.changed() {
            batch.parameters = Some(adjustment.after);
        }
        self.store.commit(&batch)?;

        let outcome = IntegrationOutcome {
            node_id: plan.node.id.clone(),
            replaced: plan.replaces,
            conflicts,
            edges_created: plan.created_edges.len(),
            edges_updated: plan.updated_edges.len(),
            edges_removed: plan.removed_edges.len(),
            parameters: adjustment,
        };

        self.graph.apply(plan);
        self.decay.apply(usage);
        self.parameters = adjustment.after;

        debug!(
            node_id = %outcome.node_id,
            replaced = outcome.replaced,
            edges_created = outcome.edges_created,
            edges_updated = outcome.edges_updated,
            edges_removed = outcome.edges_removed,
            "knowledge integrated"
        );
        Ok(outcome)
    }

    /// Record an access to a node and return its updated state.
    ///
    /// Archived nodes can be accessed and stay archived.
    pub fn access(&mut self, id: &NodeId, now: DateTime<Utc>) -> Result<Option<KnowledgeNode>> {
        let Some(current) = self.graph.get(id) else {
            return Ok(None);
        };
        let mut node = current.clone();
        node.usage_count += 1;
        node.last_accessed_at = now;

        let learning_rate = self.parameters.learning_rate;
        let usage = self
            .decay
            .plan_touch(id, learning_rate, now)
            .unwrap_or_else(|| self.decay.plan_insert(&node, learning_rate, now));

        self.store.commit(
            &WriteBatch::new()
                .with_node(node.clone())
                .with_usage(usage.clone()),
        )?;
        self.graph.replace_node(node.clone());
        self.decay.apply(usage);
        Ok(Some(node))
    }

    /// One synthesis pass: detect clusters, synthesize candidates from the
    /// current graph, and insert the ones that pass validation.
    ///
    /// Inserted insights are not re-analysed in the same pass. A candidate
    /// that fails to persist is counted in `errors` and skipped.
    pub fn evolve(&mut self, now: DateTime<Utc>) -> Result<EvolutionReport> {
        let start = Instant::now();
        let mut metrics = EvolutionMetrics {
            nodes_before: self.graph.node_count(),
            edges_before: self.graph.edge_count(),
            ..EvolutionMetrics::default()
        };

        let excluded = self.excluded();
        let clusters = self.detector.clusters(&self.graph, &excluded);
        let candidates = self.synthesizer.synthesize(&self.graph, &clusters);
        metrics.candidates = candidates.len();

        let mut known = InsightSynthesizer::known_descriptions(&self.graph);
        let mut new_insights = Vec::new();

        for mut insight in candidates {
            if let Err(rejection) = self.synthesizer.validate(&insight, &known) {
                debug!(
                    insight_type = %insight.insight_type,
                    reason = %rejection,
                    "insight rejected"
                );
                metrics.rejected += 1;
                continue;
            }

            match self.insert_insight(&insight, &excluded, now) {
                Ok(id) => {
                    known.insert(insight.description.clone());
                    insight.node_id = Some(id);
                    new_insights.push(insight);
                    metrics.accepted += 1;
                }
                Err(e) => {
                    warn!(error = %e, "failed to persist insight");
                    metrics.errors += 1;
                }
            }
        }

        metrics.nodes_after = self.graph.node_count();
        metrics.edges_after = self.graph.edge_count();
        metrics.average_confidence = self.status(now).average_confidence;
        metrics.elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            clusters = clusters.len(),
            candidates = metrics.candidates,
            accepted = metrics.accepted,
            rejected = metrics.rejected,
            errors = metrics.errors,
            "evolution pass complete"
        );

        Ok(EvolutionReport {
            new_insights,
            knowledge_evolution: metrics,
            clusters_analyzed: clusters.len(),
        })
    }

    /// Store an accepted insight as a node. Insights bypass conflict
    /// resolution and do not move the learning parameters.
    fn insert_insight(
        &mut self,
        insight: &Insight,
        excluded: &HashSet<NodeId>,
        now: DateTime<Utc>,
    ) -> Result<NodeId> {
        let node = InsightSynthesizer::to_node(insight, now);
        let options = LinkOptions {
            connection_threshold: self.parameters.connection_threshold,
            max_candidates: self.config.max_similarity_candidates,
            excluded,
        };
        let plan = self.graph.plan_insert(node, self.scorer.as_ref(), &options, now);
        let usage = self
            .decay
            .plan_insert(&plan.node, self.parameters.learning_rate, now);

        let mut batch = WriteBatch::new()
            .with_node(plan.node.clone())
            .with_usage(usage.clone());
        batch.edges.extend(plan.edge_upserts().cloned());
        batch.removed_edges.extend(plan.removed_edges.iter().cloned());
        self.store.commit(&batch)?;

        let id = plan.node.id.clone();
        self.graph.apply(plan);
        self.decay.apply(usage);
        Ok(id)
    }

    /// Run a decay sweep with the current forgetting rate.
    pub fn optimize_storage(&mut self, now: DateTime<Utc>, cancel: &CancelFlag) -> DecayReport {
        self.decay.optimize_storage(
            self.store.as_ref(),
            self.parameters.forgetting_rate,
            now,
            cancel,
        )
    }

    /// Restore an archived node's usage record from its audit trail.
    pub fn recover(&mut self, id: &NodeId) -> Result<bool> {
        if !self.graph.contains(id) {
            return Err(Error::NodeNotFound(id.clone()));
        }
        self.decay.recover(self.store.as_ref(), id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::{InsightType, ARCHIVED_PRIORITY};
    use crate::graph::{ConnectionType, Payload};
    use crate::storage::StoreSnapshot;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory store whose commits can be made to fail.
    struct FlakyStore {
        inner: SqliteKnowledgeStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: SqliteKnowledgeStore::in_memory().unwrap(),
                failing: AtomicBool::new(false),
            })
        }
    }

    impl KnowledgeStore for FlakyStore {
        fn load_snapshot(&self) -> Result<StoreSnapshot> {
            self.inner.load_snapshot()
        }

        fn commit(&self, batch: &WriteBatch) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::storage("disk full"));
            }
            self.inner.commit(batch)
        }

        fn forgetting_events(&self, node_id: &NodeId) -> Result<Vec<ForgettingEvent>> {
            self.inner.forgetting_events(node_id)
        }
    }

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    fn input(concept: &str, content: Value, confidence: f64) -> KnowledgeInput {
        KnowledgeInput::new(concept, payload(content)).with_confidence(confidence)
    }

    fn engine() -> KnowledgeEngine {
        KnowledgeEngine::open(KnowledgeConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_integrate_is_idempotent() {
        let mut engine = engine();
        let now = Utc::now();
        let first = engine
            .integrate(input("rust", json!({"topic": "ownership"}), 0.8), now)
            .unwrap();
        let second = engine
            .integrate(input("rust", json!({"topic": "ownership"}), 0.8), now)
            .unwrap();

        assert_eq!(first.node_id, second.node_id);
        assert!(!first.replaced);
        assert!(second.replaced);
        assert_eq!(engine.graph().node_count(), 1);

        let node = engine.get(&first.node_id).unwrap();
        assert_eq!(node.usage_count, 1);
        assert_eq!(engine.usage(&first.node_id).unwrap().access_count, 2);
    }

    #[test]
    fn test_conflict_keeps_confident_existing_value() {
        let mut engine = engine();
        let now = Utc::now();
        let original = engine.integrate(input("X", json!({"a": 1}), 0.9), now).unwrap();
        let outcome = engine.integrate(input("X", json!({"a": 2}), 0.3), now).unwrap();

        assert_eq!(outcome.conflicts.len(), 1);
        assert!((outcome.conflicts[0].confidence_diff + 0.6).abs() < 1e-9);
        assert_eq!(outcome.node_id, original.node_id);

        let node = engine.get(&outcome.node_id).unwrap();
        assert_eq!(node.content.get("a"), Some(&json!(1)));
        assert_eq!(engine.graph().node_count(), 1);
    }

    #[test]
    fn test_edges_created_at_threshold() {
        let mut engine = engine();
        let now = Utc::now();
        // {a, b, c} vs {a, b, d, e}: 2 shared of 5 gives 0.4
        let first = engine.integrate(input("a", json!({"b": "c"}), 0.5), now).unwrap();
        let second = engine
            .integrate(input("a", json!({"b": "d e"}), 0.5), now)
            .unwrap();

        let edge = engine.edge(&second.node_id, &first.node_id).unwrap();
        assert_eq!(edge.connection_type, ConnectionType::Related);
        assert!((edge.strength - 0.4).abs() < 1e-9);
        assert_eq!(engine.neighbors(&first.node_id).len(), 1);
    }

    #[test]
    fn test_failed_commit_leaves_no_partial_state() {
        let store = FlakyStore::new();
        let mut engine = KnowledgeEngine::with_store(KnowledgeConfig::default(), store.clone()).unwrap();
        let now = Utc::now();
        engine
            .integrate(input("a", json!({"text": "red green blue"}), 0.5), now)
            .unwrap();
        let before = engine.parameters();

        store.failing.store(true, Ordering::SeqCst);
        let err = engine
            .integrate(input("b", json!({"text": "red green blue"}), 0.95), now)
            .unwrap_err();

        assert!(err.is_storage());
        assert_eq!(engine.graph().node_count(), 1);
        assert_eq!(engine.graph().edge_count(), 0);
        assert_eq!(engine.parameters(), before);
    }

    #[test]
    fn test_parameters_survive_restart() {
        let store = FlakyStore::new();
        let now = Utc::now();
        let tuned = {
            let mut engine =
                KnowledgeEngine::with_store(KnowledgeConfig::default(), store.clone()).unwrap();
            let outcome = engine
                .integrate(input("a", json!({"text": "x x x x x x x x"}), 0.95), now)
                .unwrap();
            assert!(outcome.parameters.changed());
            engine.parameters()
        };

        let reopened = KnowledgeEngine::with_store(KnowledgeConfig::default(), store).unwrap();
        assert_eq!(reopened.parameters(), tuned);
        assert_eq!(reopened.graph().node_count(), 1);
    }

    #[test]
    fn test_access_touches_usage() {
        let mut engine = engine();
        let now = Utc::now();
        let id = engine
            .integrate(input("a", json!({"text": "x"}), 0.5), now)
            .unwrap()
            .node_id;
        let later = now + Duration::hours(1);

        let node = engine.access(&id, later).unwrap().unwrap();
        assert_eq!(node.usage_count, 1);
        assert_eq!(node.last_accessed_at, later);

        let usage = engine.usage(&id).unwrap();
        assert_eq!(usage.access_count, 2);
        assert!(usage.importance_score > 0.5);

        assert!(engine.access(&NodeId::from_raw("missing"), later).unwrap().is_none());
    }

    #[test]
    fn test_evolve_single_pass_and_novelty() {
        let mut engine = engine();
        let now = Utc::now();
        for concept in ["a", "b", "c"] {
            engine
                .integrate(input(concept, json!({"text": "red green blue"}), 0.8), now)
                .unwrap();
        }

        let first = engine.evolve(now).unwrap();
        assert_eq!(first.clusters_analyzed, 1);
        assert!(first
            .new_insights
            .iter()
            .any(|i| i.insight_type == InsightType::SpecializationPattern));
        assert!(first.new_insights.iter().all(|i| i.node_id.is_some()));
        assert_eq!(
            first.knowledge_evolution.nodes_after,
            3 + first.new_insights.len()
        );

        let second = engine.evolve(now).unwrap();
        for insight in &second.new_insights {
            assert!(first
                .new_insights
                .iter()
                .all(|prior| prior.description != insight.description));
        }
    }

    #[test]
    fn test_recover_unknown_node() {
        let mut engine = engine();
        let err = engine.recover(&NodeId::from_raw("missing")).unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(_)));
    }

    #[test]
    fn test_sweep_and_recover() {
        let mut engine = engine();
        let created = Utc::now() - Duration::days(60);
        let id = engine
            .integrate(input("stale", json!({"text": "old"}), 0.2), created)
            .unwrap()
            .node_id;

        let report = engine.optimize_storage(Utc::now(), &CancelFlag::new());
        assert_eq!(report.archived, vec![id.clone()]);
        assert_eq!(engine.usage(&id).unwrap().retention_priority, ARCHIVED_PRIORITY);
        assert_eq!(engine.status(Utc::now()).archived_nodes, 1);
        assert_eq!(engine.forgetting_events(&id).unwrap().len(), 1);

        assert!(engine.recover(&id).unwrap());
        assert!(!engine.is_archived(&id));
        // Archiving never removes the node.
        assert!(engine.get(&id).is_some());
    }

    #[test]
    fn test_status_counts() {
        let mut engine = engine();
        let now = Utc::now();
        assert_eq!(engine.status(now).connectivity_density, 0.0);

        engine
            .integrate(
                input("a", json!({"text": "red green blue"}), 0.9).with_type("research"),
                now,
            )
            .unwrap();
        engine
            .integrate(
                input("b", json!({"text": "red green blue"}), 0.5).with_type("technical"),
                now - Duration::days(3),
            )
            .unwrap();

        let status = engine.status(now);
        assert_eq!(status.total_nodes, 2);
        assert_eq!(status.total_connections, 1);
        assert_eq!(status.connectivity_density, 0.5);
        assert_eq!(status.recent_additions, 1);
        assert_eq!(status.high_confidence_nodes, 1);
        assert_eq!(status.knowledge_types.get("research"), Some(&1));
        assert_eq!(status.knowledge_types.get("general"), Some(&1));
        assert!((status.average_confidence - 0.7).abs() < 1e-9);
    }
}
