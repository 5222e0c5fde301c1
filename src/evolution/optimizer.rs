//! Adapts learning parameters to the complexity of incoming knowledge.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::evolution::types::{LearningParameters, ParameterBounds};
use crate::graph::KnowledgeNode;

/// Complexity above which learning slows down.
pub const HIGH_COMPLEXITY: f64 = 0.8;
/// Complexity below which learning speeds up.
pub const LOW_COMPLEXITY: f64 = 0.3;
/// Confidence above which the confidence threshold relaxes.
pub const TRUSTED_CONFIDENCE: f64 = 0.9;

/// Lexical complexity of a text in [0, 1]:
/// `min(1, unique_words / words + words / 1000)`, 0 for empty text.
pub fn complexity(text: &str) -> f64 {
    let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    if words.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&String> = words.iter().collect();
    let diversity = unique.len() as f64 / words.len() as f64;
    (diversity + words.len() as f64 / 1000.0).min(1.0)
}

/// What an update changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterAdjustment {
    pub complexity: f64,
    pub before: LearningParameters,
    pub after: LearningParameters,
}

impl ParameterAdjustment {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Multiplicative parameter tuning with clamps.
#[derive(Debug, Clone, Default)]
pub struct ParameterOptimizer {
    bounds: ParameterBounds,
}

impl ParameterOptimizer {
    pub fn new(bounds: ParameterBounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> &ParameterBounds {
        &self.bounds
    }

    /// Adjust `params` after ingesting `node`.
    ///
    /// Hard material (complexity > 0.8) slows the learning rate by 10%, easy
    /// material (< 0.3) speeds it up by 10%, and very confident sources
    /// (> 0.9) lower the confidence threshold by 5%. Results are clamped to
    /// the configured bounds.
    pub fn update_from_knowledge(&self, params: &LearningParameters, node: &KnowledgeNode) -> ParameterAdjustment {
        let complexity = complexity(&node.content_text());
        let mut next = *params;

        if complexity > HIGH_COMPLEXITY {
            next.learning_rate *= 0.9;
        } else if complexity < LOW_COMPLEXITY {
            next.learning_rate *= 1.1;
        }
        if node.confidence > TRUSTED_CONFIDENCE {
            next.confidence_threshold *= 0.95;
        }
        self.bounds.apply(&mut next);

        ParameterAdjustment {
            complexity,
            before: *params,
            after: next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::types::Bounds;
    use crate::graph::Payload;
    use serde_json::json;

    fn node(text: &str, confidence: f64) -> KnowledgeNode {
        let content: Payload = json!({ "t": text }).as_object().cloned().unwrap();
        KnowledgeNode::new("c", content).with_confidence(confidence)
    }

    #[test]
    fn test_complexity_values() {
        assert_eq!(complexity(""), 0.0);
        // 2 unique of 4 words
        assert!((complexity("a a b b") - (0.5 + 0.004)).abs() < 1e-12);
        assert_eq!(complexity("every word differs here"), 1.0);
    }

    #[test]
    fn test_hard_material_slows_learning() {
        let optimizer = ParameterOptimizer::default();
        let params = LearningParameters::default();
        let adj = optimizer.update_from_knowledge(&params, &node("distinct words only", 0.5));

        assert!(adj.complexity > HIGH_COMPLEXITY);
        assert!((adj.after.learning_rate - 0.09).abs() < 1e-12);
        assert_eq!(adj.after.confidence_threshold, params.confidence_threshold);
    }

    #[test]
    fn test_repetitive_material_speeds_learning() {
        let optimizer = ParameterOptimizer::default();
        let params = LearningParameters::default();
        let text = "x ".repeat(10);
        // "t" plus ten "x": 2 unique of 11 words
        let adj = optimizer.update_from_knowledge(&params, &node(&text, 0.5));

        assert!(adj.complexity < LOW_COMPLEXITY);
        assert!((adj.after.learning_rate - 0.11).abs() < 1e-12);
    }

    #[test]
    fn test_confident_source_relaxes_threshold() {
        let optimizer = ParameterOptimizer::default();
        let params = LearningParameters::default();
        let adj = optimizer.update_from_knowledge(&params, &node("x x x x x x", 0.95));

        assert!((adj.after.confidence_threshold - 0.665).abs() < 1e-12);
        assert!(adj.changed());
    }

    #[test]
    fn test_drift_is_clamped() {
        let optimizer = ParameterOptimizer::new(ParameterBounds {
            learning_rate: Bounds::new(0.05, 0.2),
            ..ParameterBounds::default()
        });
        let mut params = LearningParameters::default();
        for _ in 0..200 {
            params = optimizer
                .update_from_knowledge(&params, &node("x x x x x x x x", 0.99))
                .after;
        }
        assert_eq!(params.learning_rate, 0.2);
        assert_eq!(params.confidence_threshold, 0.1);

        for _ in 0..200 {
            params = optimizer
                .update_from_knowledge(&params, &node("all unique words", 0.5))
                .after;
        }
        assert_eq!(params.learning_rate, 0.05);
    }
}
