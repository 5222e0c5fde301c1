//! Async facade over the knowledge engine.
//!
//! [`EvolvingKnowledge`] is the boundary the host application talks to. It
//! serializes mutations behind a write lock and lets reads share a read
//! lock, so a reader never sees an insert whose edges are half created.
//! Ingestion never propagates errors: failures are logged and reported as
//! `false`.
//!
//! Evolution passes and decay sweeps commit to SQLite synchronously, so they
//! run on the blocking pool while holding the write lock.
//!
//! ## Example
//!
//! ```rust,ignore
//! use evolving_knowledge::{EvolvingKnowledge, KnowledgeConfig, KnowledgeInput};
//!
//! let knowledge = EvolvingKnowledge::open(KnowledgeConfig::default())?;
//! let ok = knowledge
//!     .integrate_new_knowledge(KnowledgeInput::new("rust", content).with_confidence(0.9))
//!     .await;
//! let report = knowledge.evolve_understanding().await?;
//! let status = knowledge.get_knowledge_status().await;
//! ```

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task;
use tracing::{error, instrument, warn};

use crate::config::KnowledgeConfig;
use crate::engine::{EvolutionReport, IntegrationOutcome, KnowledgeEngine, KnowledgeStatus};
use crate::error::{Error, Result};
use crate::evolution::{CancelFlag, DecayReport, ForgettingEvent, LearningParameters};
use crate::graph::{KnowledgeEdge, KnowledgeInput, KnowledgeNode, NodeId};
use crate::storage::KnowledgeStore;

/// Shared handle to an evolving knowledge store.
#[derive(Debug, Clone)]
pub struct EvolvingKnowledge {
    engine: Arc<RwLock<KnowledgeEngine>>,
    sweep_cancel: CancelFlag,
}

impl EvolvingKnowledge {
    /// Open the store described by `config`.
    pub fn open(config: KnowledgeConfig) -> Result<Self> {
        Ok(Self::from_engine(KnowledgeEngine::open(config)?))
    }

    /// Open over an existing store.
    pub fn with_store(config: KnowledgeConfig, store: Arc<dyn KnowledgeStore>) -> Result<Self> {
        Ok(Self::from_engine(KnowledgeEngine::with_store(config, store)?))
    }

    pub fn from_engine(engine: KnowledgeEngine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            sweep_cancel: CancelFlag::new(),
        }
    }

    // ==================== Mutations ====================

    /// Ingest one knowledge record. Returns `false` on any internal error.
    #[instrument(skip(self, knowledge), fields(concept = %knowledge.concept))]
    pub async fn integrate_new_knowledge(&self, knowledge: KnowledgeInput) -> bool {
        match self.integrate_detailed(knowledge).await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "failed to integrate knowledge");
                false
            }
        }
    }

    /// Ingest a record given as a JSON object
    /// (`{concept, content, confidence, type, metadata}`).
    pub async fn integrate_json(&self, knowledge: Value) -> bool {
        match serde_json::from_value::<KnowledgeInput>(knowledge) {
            Ok(input) => self.integrate_new_knowledge(input).await,
            Err(e) => {
                warn!(error = %e, "malformed knowledge record");
                false
            }
        }
    }

    /// Ingest one record and report what happened.
    pub async fn integrate_detailed(&self, knowledge: KnowledgeInput) -> Result<IntegrationOutcome> {
        let mut engine = self.engine.write().await;
        engine.integrate(knowledge, Utc::now())
    }

    /// Run one insight-synthesis pass.
    #[instrument(skip(self))]
    pub async fn evolve_understanding(&self) -> Result<EvolutionReport> {
        let mut engine = self.engine.clone().write_owned().await;
        task::spawn_blocking(move || engine.evolve(Utc::now()))
            .await
            .map_err(|e| Error::internal(format!("evolution task failed: {}", e)))?
    }

    /// Run a decay sweep. A `cancel_sweep` call made while it runs, or while
    /// it waits for the write lock, stops it between nodes. The flag is
    /// cleared once the sweep returns.
    #[instrument(skip(self))]
    pub async fn optimize_storage(&self) -> Result<DecayReport> {
        let mut engine = self.engine.clone().write_owned().await;
        let cancel = self.sweep_cancel.clone();
        task::spawn_blocking(move || {
            let report = engine.optimize_storage(Utc::now(), &cancel);
            cancel.reset();
            report
        })
        .await
        .map_err(|e| Error::internal(format!("decay sweep failed: {}", e)))
    }

    /// Ask a running sweep to stop.
    pub fn cancel_sweep(&self) {
        self.sweep_cancel.cancel();
    }

    /// Record an access to a node. Returns `None` for unknown nodes and on
    /// storage failure.
    #[instrument(skip(self))]
    pub async fn access_knowledge(&self, id: &NodeId) -> Option<KnowledgeNode> {
        let mut engine = self.engine.write().await;
        match engine.access(id, Utc::now()) {
            Ok(node) => node,
            Err(e) => {
                error!(error = %e, "failed to record access");
                None
            }
        }
    }

    /// Un-archive a node from its latest forgetting event.
    #[instrument(skip(self))]
    pub async fn recover_node(&self, id: &NodeId) -> Result<bool> {
        let mut engine = self.engine.write().await;
        engine.recover(id)
    }

    // ==================== Reads ====================

    pub async fn get_knowledge_status(&self) -> KnowledgeStatus {
        self.engine.read().await.status(Utc::now())
    }

    pub async fn get(&self, id: &NodeId) -> Option<KnowledgeNode> {
        self.engine.read().await.get(id).cloned()
    }

    pub async fn all_nodes(&self) -> Vec<KnowledgeNode> {
        self.engine
            .read()
            .await
            .all_nodes()
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn neighbors(&self, id: &NodeId) -> Vec<KnowledgeNode> {
        self.engine
            .read()
            .await
            .neighbors(id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn edges_of(&self, id: &NodeId) -> Vec<KnowledgeEdge> {
        self.engine
            .read()
            .await
            .edges_of(id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn edge(&self, source: &NodeId, target: &NodeId) -> Option<KnowledgeEdge> {
        self.engine.read().await.edge(source, target).cloned()
    }

    pub async fn clusters(&self) -> Vec<Vec<NodeId>> {
        self.engine.read().await.clusters()
    }

    pub async fn parameters(&self) -> LearningParameters {
        self.engine.read().await.parameters()
    }

    pub async fn is_archived(&self, id: &NodeId) -> bool {
        self.engine.read().await.is_archived(id)
    }

    pub async fn forgetting_events(&self, id: &NodeId) -> Result<Vec<ForgettingEvent>> {
        self.engine.read().await.forgetting_events(id)
    }
}

#[cfg(feature = "tokio-runtime")]
pub use maintenance::MaintenanceHandle;

#[cfg(feature = "tokio-runtime")]
mod maintenance {
    use super::EvolvingKnowledge;
    use crate::evolution::CancelFlag;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio::task::JoinHandle;
    use tokio::time::interval;
    use tracing::{debug, info, warn};

    /// Running background maintenance task.
    #[derive(Debug)]
    pub struct MaintenanceHandle {
        shutdown: watch::Sender<bool>,
        sweep_cancel: CancelFlag,
        task: JoinHandle<()>,
    }

    impl MaintenanceHandle {
        /// Stop the loop and wait for the current cycle to finish. A sweep in
        /// progress is cancelled between nodes.
        pub async fn shutdown(self) {
            self.sweep_cancel.cancel();
            let _ = self.shutdown.send(true);
            if let Err(e) = self.task.await {
                warn!(error = %e, "maintenance task ended abnormally");
            }
        }
    }

    impl EvolvingKnowledge {
        /// Run `optimize_storage` and `evolve_understanding` every
        /// `maintenance_interval_secs` until the handle is shut down.
        pub async fn spawn_maintenance(&self) -> MaintenanceHandle {
            let period = self.engine.read().await.config().maintenance_interval_secs;
            let (shutdown, mut stop) = watch::channel(false);
            let knowledge = self.clone();

            let task = tokio::spawn(async move {
                info!(interval_secs = period, "starting knowledge maintenance");
                let mut tick = interval(Duration::from_secs(period));
                // The first tick completes immediately.
                tick.tick().await;

                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            debug!("running knowledge maintenance cycle");
                            match knowledge.optimize_storage().await {
                                Ok(sweep) => info!(
                                    decayed = sweep.nodes_decayed,
                                    archived = sweep.nodes_archived,
                                    interrupted = sweep.interrupted,
                                    "maintenance sweep complete"
                                ),
                                Err(e) => warn!(error = %e, "maintenance sweep failed"),
                            }
                            match knowledge.evolve_understanding().await {
                                Ok(report) => info!(
                                    insights = report.new_insights.len(),
                                    "maintenance evolution complete"
                                ),
                                Err(e) => warn!(error = %e, "maintenance evolution failed"),
                            }
                        }
                        _ = stop.changed() => {
                            info!("knowledge maintenance stopped");
                            break;
                        }
                    }
                }
            });

            MaintenanceHandle {
                shutdown,
                sweep_cancel: self.sweep_cancel.clone(),
                task,
            }
        }
    }
}
