//! Configuration for the knowledge store.
//!
//! Everything tunable lives in [`KnowledgeConfig`]; there is no module-level
//! state. Configs are plain serde structs and can be loaded from JSON:
//!
//! ```rust,ignore
//! use evolving_knowledge::KnowledgeConfig;
//!
//! let config = KnowledgeConfig::from_json_str(r#"{
//!     "database_path": "~/.local/share/knowledge.db",
//!     "archive_policy": "exclude"
//! }"#)?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::evolution::{Bounds, DecayConfig, InsightConfig, LearningParameters, ParameterBounds};

/// How archived nodes take part in similarity, clustering and synthesis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivePolicy {
    /// Archived nodes stay fully visible; archiving only lowers retrieval
    /// priority
    #[default]
    Retain,
    /// Archived nodes are skipped by similarity scans, clustering and insight
    /// synthesis, and lose their similarity edges when re-inserted
    Exclude,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// SQLite file; `None` keeps everything in memory
    pub database_path: Option<PathBuf>,
    /// Tuning used when the store has none persisted
    pub initial_parameters: LearningParameters,
    pub parameter_bounds: ParameterBounds,
    pub decay: DecayConfig,
    pub insight: InsightConfig,
    pub archive_policy: ArchivePolicy,
    /// Existing nodes compared per insert
    pub max_similarity_candidates: usize,
    /// Window for `recent_additions` in status reports
    pub recent_window_hours: i64,
    /// Period of the background maintenance loop
    pub maintenance_interval_secs: u64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            initial_parameters: LearningParameters::default(),
            parameter_bounds: ParameterBounds::default(),
            decay: DecayConfig::default(),
            insight: InsightConfig::default(),
            archive_policy: ArchivePolicy::Retain,
            max_similarity_candidates: 100_000,
            recent_window_hours: 24,
            maintenance_interval_secs: 3600,
        }
    }
}

impl KnowledgeConfig {
    /// In-memory store with default tuning.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Persist to `path`.
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn with_archive_policy(mut self, policy: ArchivePolicy) -> Self {
        self.archive_policy = policy;
        self
    }

    pub fn with_connection_threshold(mut self, threshold: f64) -> Self {
        self.initial_parameters.connection_threshold = threshold;
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Database path with `~` expanded.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path.as_ref().map(|path| {
            let raw = path.to_string_lossy();
            PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
        })
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<()> {
        let bounds = &self.parameter_bounds;
        for (name, b) in [
            ("learning_rate", bounds.learning_rate),
            ("confidence_threshold", bounds.confidence_threshold),
            ("connection_threshold", bounds.connection_threshold),
            ("forgetting_rate", bounds.forgetting_rate),
        ] {
            check_bounds(name, b)?;
        }

        let params = &self.initial_parameters;
        for (name, value, b) in [
            ("learning_rate", params.learning_rate, bounds.learning_rate),
            (
                "confidence_threshold",
                params.confidence_threshold,
                bounds.confidence_threshold,
            ),
            (
                "connection_threshold",
                params.connection_threshold,
                bounds.connection_threshold,
            ),
            ("forgetting_rate", params.forgetting_rate, bounds.forgetting_rate),
        ] {
            if !b.contains(value) {
                return Err(Error::config(format!(
                    "{} = {} outside [{}, {}]",
                    name, value, b.min, b.max
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.decay.archive_importance_threshold) {
            return Err(Error::config(
                "decay.archive_importance_threshold must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.insight.min_confidence) {
            return Err(Error::config("insight.min_confidence must be within [0, 1]"));
        }
        if self.max_similarity_candidates == 0 {
            return Err(Error::config("max_similarity_candidates must be positive"));
        }
        if self.recent_window_hours <= 0 {
            return Err(Error::config("recent_window_hours must be positive"));
        }
        if self.maintenance_interval_secs == 0 {
            return Err(Error::config("maintenance_interval_secs must be positive"));
        }
        Ok(())
    }
}

fn check_bounds(name: &str, b: Bounds) -> Result<()> {
    if b.min.is_nan() || b.max.is_nan() || b.min > b.max {
        return Err(Error::config(format!(
            "{} bounds [{}, {}] are empty",
            name, b.min, b.max
        )));
    }
    Ok(())
}
