//! Types shared by the evolution components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::{clamp_unit, NodeId};

/// `retention_priority` value marking an archived (soft-deleted) node.
pub const ARCHIVED_PRIORITY: i32 = -1;

/// Process-wide tunables, adjusted by the parameter optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningParameters {
    pub learning_rate: f64,
    pub confidence_threshold: f64,
    /// Similarity cutoff for edge creation
    pub connection_threshold: f64,
    /// Per-day importance loss used by the decay sweep
    pub forgetting_rate: f64,
}

impl Default for LearningParameters {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            confidence_threshold: 0.7,
            connection_threshold: 0.3,
            forgetting_rate: 0.05,
        }
    }
}

/// Inclusive [min, max] range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Clamps applied after every parameter adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub learning_rate: Bounds,
    pub confidence_threshold: Bounds,
    pub connection_threshold: Bounds,
    pub forgetting_rate: Bounds,
}

impl Default for ParameterBounds {
    fn default() -> Self {
        Self {
            learning_rate: Bounds::new(0.0001, 1.0),
            confidence_threshold: Bounds::new(0.1, 1.0),
            connection_threshold: Bounds::new(0.05, 0.95),
            forgetting_rate: Bounds::new(0.0, 0.5),
        }
    }
}

impl ParameterBounds {
    /// Clamp every parameter into range.
    pub fn apply(&self, params: &mut LearningParameters) {
        params.learning_rate = self.learning_rate.clamp(params.learning_rate);
        params.confidence_threshold = self.confidence_threshold.clamp(params.confidence_threshold);
        params.connection_threshold = self.connection_threshold.clamp(params.connection_threshold);
        params.forgetting_rate = self.forgetting_rate.clamp(params.forgetting_rate);
    }
}

/// Usage state the decay manager keeps for each node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsageRecord {
    pub node_id: NodeId,
    pub access_count: u64,
    pub last_access: DateTime<Utc>,
    /// Within [0, 1]; decays independently of node confidence
    pub importance_score: f64,
    /// `ARCHIVED_PRIORITY` once archived
    pub retention_priority: i32,
}

impl MemoryUsageRecord {
    pub fn new(
        node_id: NodeId,
        importance_score: f64,
        retention_priority: i32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            node_id,
            access_count: 1,
            last_access: at,
            importance_score: clamp_unit(importance_score),
            retention_priority,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.retention_priority == ARCHIVED_PRIORITY
    }

    /// Fractional days since the last access, never negative.
    pub fn days_since_access(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.last_access).num_milliseconds() as f64 / 1000.0;
        (seconds / 86_400.0).max(0.0)
    }
}

/// Audit record written when a node is archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgettingEvent {
    pub node_id: NodeId,
    pub forgotten_at: DateTime<Utc>,
    pub reason: String,
    /// Usage record as it was just before archiving
    pub recovery_snapshot: MemoryUsageRecord,
}

/// Competing values for one content key of the same concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub existing_id: NodeId,
    pub key: String,
    pub existing_content: Value,
    pub new_content: Value,
    /// `new.confidence - existing.confidence`
    pub confidence_diff: f64,
}

/// Kind of pattern an insight describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    /// A cluster whose members all share one knowledge type
    SpecializationPattern,
    /// Two cluster members joined by a strong edge
    StrongConnection,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpecializationPattern => "specialization_pattern",
            Self::StrongConnection => "strong_connection",
        }
    }
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knowledge synthesized from a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub insight_type: InsightType,
    pub description: String,
    pub confidence: f64,
    pub sources: Vec<NodeId>,
    /// Id of the stored node, once inserted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}
