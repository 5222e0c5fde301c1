//! Usage tracking and forgetting-curve eviction.
//!
//! Each node has a [`MemoryUsageRecord`] owned here, not by the graph. A sweep
//! (`optimize_storage`) decays every record and archives the weakest ones:
//!
//! 1. `importance *= (1 - forgetting_rate)^days` (0.95 per day by default)
//! 2. `importance *= exp(-days / max(access_count, 1))`
//! 3. candidates: the lowest-importance unarchived records with
//!    `importance < 0.1` and `access_count < 3`, at most 10 per sweep
//! 4. each candidate's record is snapshotted to the audit log, then its
//!    `retention_priority` is set to -1
//!
//! Archiving is a flag. Nodes are never removed from the graph, and nothing
//! un-archives a node except an explicit `recover`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::evolution::types::{ForgettingEvent, MemoryUsageRecord, ARCHIVED_PRIORITY};
use crate::graph::{KnowledgeNode, KnowledgeType, NodeId};
use crate::storage::{KnowledgeStore, WriteBatch};

/// Retention priority for ordinary nodes.
pub const DEFAULT_PRIORITY: i32 = 1;
/// Retention priority for synthesized insights.
pub const INSIGHT_PRIORITY: i32 = 2;

/// Archive criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Records below this importance are archive candidates
    pub archive_importance_threshold: f64,
    /// Records with this many accesses or more are never archived
    pub archive_max_access_count: u64,
    /// Maximum archives per sweep
    pub archive_batch_size: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            archive_importance_threshold: 0.1,
            archive_max_access_count: 3,
            archive_batch_size: 10,
        }
    }
}

/// Shared stop signal for a running sweep, checked between nodes.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one decay sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayReport {
    pub nodes_examined: usize,
    pub nodes_decayed: usize,
    pub nodes_archived: usize,
    pub archived: Vec<NodeId>,
    /// Per-node commits that failed; those nodes keep their old record
    pub errors: usize,
    /// Stopped early by a `CancelFlag`
    pub interrupted: bool,
    pub elapsed_ms: u64,
}

/// Apply the usage update and forgetting curve to a record as of `now`.
pub fn decayed(record: &MemoryUsageRecord, forgetting_rate: f64, now: DateTime<Utc>) -> MemoryUsageRecord {
    let days = record.days_since_access(now);
    let usage_factor = (1.0 - forgetting_rate).clamp(0.0, 1.0).powf(days);
    let retention = (-days / record.access_count.max(1) as f64).exp();

    let mut next = record.clone();
    next.importance_score = (record.importance_score * usage_factor * retention).clamp(0.0, 1.0);
    next
}

/// Owns per-node usage state and runs the eviction sweep.
#[derive(Debug, Clone, Default)]
pub struct DecayManager {
    config: DecayConfig,
    records: HashMap<NodeId, MemoryUsageRecord>,
}

impl DecayManager {
    pub fn new(config: DecayConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
        }
    }

    /// Rebuild from persisted records.
    pub fn from_records(config: DecayConfig, records: impl IntoIterator<Item = MemoryUsageRecord>) -> Self {
        Self {
            config,
            records: records
                .into_iter()
                .map(|r| (r.node_id.clone(), r))
                .collect(),
        }
    }

    pub fn config(&self) -> &DecayConfig {
        &self.config
    }

    pub fn get(&self, id: &NodeId) -> Option<&MemoryUsageRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &MemoryUsageRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_archived(&self, id: &NodeId) -> bool {
        self.records.get(id).is_some_and(MemoryUsageRecord::is_archived)
    }

    pub fn archived_ids(&self) -> HashSet<NodeId> {
        self.records
            .values()
            .filter(|r| r.is_archived())
            .map(|r| r.node_id.clone())
            .collect()
    }

    /// Record for a freshly inserted node, or a touch if it already has one.
    pub fn plan_insert(&self, node: &KnowledgeNode, learning_rate: f64, now: DateTime<Utc>) -> MemoryUsageRecord {
        if let Some(touched) = self.plan_touch(&node.id, learning_rate, now) {
            return touched;
        }
        let priority = if node.knowledge_type == KnowledgeType::Insight {
            INSIGHT_PRIORITY
        } else {
            DEFAULT_PRIORITY
        };
        MemoryUsageRecord::new(node.id.clone(), node.confidence, priority, now)
    }

    /// Record after one more access. Archived records stay archived.
    pub fn plan_touch(&self, id: &NodeId, learning_rate: f64, now: DateTime<Utc>) -> Option<MemoryUsageRecord> {
        let mut record = self.records.get(id)?.clone();
        record.access_count += 1;
        record.last_access = now;
        record.importance_score = (record.importance_score + learning_rate).clamp(0.0, 1.0);
        Some(record)
    }

    /// Store a record that has been committed.
    pub fn apply(&mut self, record: MemoryUsageRecord) {
        self.records.insert(record.node_id.clone(), record);
    }

    /// The weakest unarchived records eligible for archiving, lowest
    /// importance first.
    pub fn archive_candidates(&self) -> Vec<NodeId> {
        let mut candidates: Vec<&MemoryUsageRecord> = self
            .records
            .values()
            .filter(|r| {
                !r.is_archived()
                    && r.importance_score < self.config.archive_importance_threshold
                    && r.access_count < self.config.archive_max_access_count
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.importance_score
                .total_cmp(&b.importance_score)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        candidates
            .into_iter()
            .take(self.config.archive_batch_size)
            .map(|r| r.node_id.clone())
            .collect()
    }

    /// Decay every record, then archive the candidates.
    ///
    /// Each node's update is committed on its own, so a cancelled or failing
    /// sweep leaves every record either fully updated or untouched.
    pub fn optimize_storage(
        &mut self,
        store: &dyn KnowledgeStore,
        forgetting_rate: f64,
        now: DateTime<Utc>,
        cancel: &CancelFlag,
    ) -> DecayReport {
        let start = Instant::now();
        let mut report = DecayReport::default();

        let mut ids: Vec<NodeId> = self.records.keys().cloned().collect();
        ids.sort();

        for id in ids {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            let Some(current) = self.records.get(&id) else {
                continue;
            };
            report.nodes_examined += 1;

            let next = decayed(current, forgetting_rate, now);
            if next.importance_score >= current.importance_score {
                continue;
            }
            match store.commit(&WriteBatch::new().with_usage(next.clone())) {
                Ok(()) => {
                    self.apply(next);
                    report.nodes_decayed += 1;
                }
                Err(e) => {
                    warn!(node_id = %id, error = %e, "failed to persist decayed usage record");
                    report.errors += 1;
                }
            }
        }

        if !report.interrupted {
            for id in self.archive_candidates() {
                if cancel.is_cancelled() {
                    report.interrupted = true;
                    break;
                }
                match self.archive(store, &id, now) {
                    Ok(()) => {
                        report.nodes_archived += 1;
                        report.archived.push(id);
                    }
                    Err(e) => {
                        warn!(node_id = %id, error = %e, "failed to archive node");
                        report.errors += 1;
                    }
                }
            }
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            examined = report.nodes_examined,
            decayed = report.nodes_decayed,
            archived = report.nodes_archived,
            errors = report.errors,
            interrupted = report.interrupted,
            elapsed_ms = report.elapsed_ms,
            "decay sweep complete"
        );
        report
    }

    /// Snapshot the record to the audit log and flag it archived.
    fn archive(&mut self, store: &dyn KnowledgeStore, id: &NodeId, now: DateTime<Utc>) -> Result<()> {
        let Some(snapshot) = self.records.get(id).cloned() else {
            return Ok(());
        };
        let reason = format!(
            "importance {:.4} below {} with {} accesses",
            snapshot.importance_score,
            self.config.archive_importance_threshold,
            snapshot.access_count
        );

        let mut archived = snapshot.clone();
        archived.retention_priority = ARCHIVED_PRIORITY;

        let event = ForgettingEvent {
            node_id: id.clone(),
            forgotten_at: now,
            reason,
            recovery_snapshot: snapshot,
        };
        store.commit(
            &WriteBatch::new()
                .with_forgetting_event(event)
                .with_usage(archived.clone()),
        )?;
        self.apply(archived);
        info!(node_id = %id, "node archived");
        Ok(())
    }

    /// Restore an archived node's record from its latest forgetting event.
    ///
    /// Accesses made while archived are kept. Returns `false` when the node
    /// is unknown or not archived.
    pub fn recover(&mut self, store: &dyn KnowledgeStore, id: &NodeId) -> Result<bool> {
        let Some(current) = self.records.get(id).cloned() else {
            return Ok(false);
        };
        if !current.is_archived() {
            return Ok(false);
        }

        let latest = store
            .forgetting_events(id)?
            .into_iter()
            .max_by_key(|e| e.forgotten_at);

        let mut restored = match latest {
            Some(event) => event.recovery_snapshot,
            None => {
                debug!(node_id = %id, "no forgetting event on record, restoring default priority");
                current.clone()
            }
        };
        restored.access_count = restored.access_count.max(current.access_count);
        restored.last_access = restored.last_access.max(current.last_access);
        if restored.is_archived() {
            restored.retention_priority = DEFAULT_PRIORITY;
        }

        store.commit(&WriteBatch::new().with_usage(restored.clone()))?;
        self.apply(restored);
        info!(node_id = %id, "node recovered from archive");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteKnowledgeStore;
    use chrono::Duration;
    use proptest::prelude::*;

    fn record(id: &str, importance: f64, access_count: u64, days_ago: i64, now: DateTime<Utc>) -> MemoryUsageRecord {
        MemoryUsageRecord {
            node_id: NodeId::from_raw(id),
            access_count,
            last_access: now - Duration::days(days_ago),
            importance_score: importance,
            retention_priority: DEFAULT_PRIORITY,
        }
    }

    #[test]
    fn test_decay_formula() {
        let now = Utc::now();
        let r = record("n", 1.0, 2, 2, now);
        let next = decayed(&r, 0.05, now);

        let expected = 0.95f64.powf(2.0) * (-1.0f64).exp();
        assert!((next.importance_score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_no_decay_without_elapsed_time() {
        let now = Utc::now();
        let r = record("n", 0.5, 1, 0, now);
        assert_eq!(decayed(&r, 0.05, now).importance_score, 0.5);
    }

    #[test]
    fn test_frequent_access_decays_slower() {
        let now = Utc::now();
        let rare = decayed(&record("a", 1.0, 1, 5, now), 0.05, now);
        let frequent = decayed(&record("b", 1.0, 10, 5, now), 0.05, now);
        assert!(frequent.importance_score > rare.importance_score);
    }

    #[test]
    fn test_touch_keeps_archive_flag() {
        let now = Utc::now();
        let mut manager = DecayManager::default();
        let mut r = record("n", 0.05, 1, 3, now);
        r.retention_priority = ARCHIVED_PRIORITY;
        manager.apply(r);

        let touched = manager.plan_touch(&NodeId::from_raw("n"), 0.1, now).unwrap();
        assert_eq!(touched.access_count, 2);
        assert!(touched.is_archived());
        assert!((touched.importance_score - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_candidate_selection_order_and_limit() {
        let now = Utc::now();
        let mut manager = DecayManager::new(DecayConfig {
            archive_batch_size: 2,
            ..DecayConfig::default()
        });
        manager.apply(record("a", 0.05, 1, 0, now));
        manager.apply(record("b", 0.01, 1, 0, now));
        manager.apply(record("c", 0.08, 1, 0, now));
        manager.apply(record("frequent", 0.01, 3, 0, now));
        manager.apply(record("important", 0.5, 1, 0, now));

        let candidates = manager.archive_candidates();
        assert_eq!(
            candidates,
            vec![NodeId::from_raw("b"), NodeId::from_raw("a")]
        );
    }

    #[test]
    fn test_sweep_archives_and_logs() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let now = Utc::now();
        let mut manager = DecayManager::default();
        manager.apply(record("stale", 0.2, 1, 30, now));
        manager.apply(record("fresh", 0.9, 5, 0, now));

        let report = manager.optimize_storage(&store, 0.05, now, &CancelFlag::new());
        assert_eq!(report.nodes_examined, 2);
        assert_eq!(report.nodes_decayed, 1);
        assert_eq!(report.archived, vec![NodeId::from_raw("stale")]);
        assert!(manager.is_archived(&NodeId::from_raw("stale")));
        assert!(!manager.is_archived(&NodeId::from_raw("fresh")));

        let events = store.forgetting_events(&NodeId::from_raw("stale")).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].recovery_snapshot.is_archived());

        // Already-archived nodes are not archived again.
        let again = manager.optimize_storage(&store, 0.05, now, &CancelFlag::new());
        assert!(again.archived.is_empty());
    }

    #[test]
    fn test_cancelled_sweep_stops_between_nodes() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let now = Utc::now();
        let mut manager = DecayManager::default();
        manager.apply(record("a", 0.5, 1, 10, now));
        manager.apply(record("b", 0.5, 1, 10, now));

        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = manager.optimize_storage(&store, 0.05, now, &cancel);
        assert!(report.interrupted);
        assert_eq!(report.nodes_decayed, 0);
        assert_eq!(manager.get(&NodeId::from_raw("a")).unwrap().importance_score, 0.5);
    }

    #[test]
    fn test_recover_restores_snapshot() {
        let store = SqliteKnowledgeStore::in_memory().unwrap();
        let now = Utc::now();
        let mut manager = DecayManager::default();
        manager.apply(record("stale", 0.01, 1, 30, now));
        manager.optimize_storage(&store, 0.05, now, &CancelFlag::new());
        let id = NodeId::from_raw("stale");
        assert!(manager.is_archived(&id));

        assert!(manager.recover(&store, &id).unwrap());
        let restored = manager.get(&id).unwrap();
        assert_eq!(restored.retention_priority, DEFAULT_PRIORITY);
        assert!(!manager.recover(&store, &id).unwrap());
    }

    proptest! {
        #[test]
        fn successive_sweeps_never_raise_importance(
            importance in 0.0f64..=1.0,
            access_count in 0u64..20,
            hours_ago in 0i64..2_000,
            forgetting_rate in 0.0f64..0.5
        ) {
            let now = Utc::now();
            let r = MemoryUsageRecord {
                node_id: NodeId::from_raw("n"),
                access_count,
                last_access: now - Duration::hours(hours_ago),
                importance_score: importance,
                retention_priority: DEFAULT_PRIORITY,
            };
            let first = decayed(&r, forgetting_rate, now);
            let second = decayed(&first, forgetting_rate, now);
            prop_assert!(first.importance_score <= r.importance_score);
            prop_assert!(second.importance_score <= first.importance_score);
        }
    }
}
