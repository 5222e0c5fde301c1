//! Components that evolve the knowledge graph over time.
//!
//! - **Conflict resolution**: merges competing facts about one concept
//! - **Cluster detection**: weakly-connected components of size >= 2
//! - **Insight synthesis**: candidate knowledge derived from clusters,
//!   validated for novelty before it is fed back into the graph
//! - **Decay**: per-node usage records, forgetting curve and archiving
//! - **Parameter optimization**: learning-rate and threshold tuning driven by
//!   the complexity of incoming knowledge

mod clusters;
mod conflict;
mod decay;
mod insight;
mod optimizer;
mod types;

pub use clusters::{ClusterDetector, MIN_CLUSTER_SIZE};
pub use conflict::{ConflictResolver, NEAR_TIE_MARGIN};
pub use decay::{
    decayed, CancelFlag, DecayConfig, DecayManager, DecayReport, DEFAULT_PRIORITY,
    INSIGHT_PRIORITY,
};
pub use insight::{InsightConfig, InsightSynthesizer, Rejection};
pub use optimizer::{complexity, ParameterAdjustment, ParameterOptimizer};
pub use types::{
    Bounds, Conflict, ForgettingEvent, Insight, InsightType, LearningParameters,
    MemoryUsageRecord, ParameterBounds, ARCHIVED_PRIORITY,
};
