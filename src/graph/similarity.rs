//! Text similarity used to link nodes.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("invalid regex"));

/// Scores the relatedness of two labelled texts.
///
/// Implementations must be pure and deterministic, and must return a value
/// in [0, 1].
pub trait SimilarityScorer: Send + Sync {
    fn score(&self, label_a: &str, text_a: &str, label_b: &str, text_b: &str) -> f64;
}

/// Jaccard overlap of case-folded token sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaccardScorer;

impl SimilarityScorer for JaccardScorer {
    fn score(&self, label_a: &str, text_a: &str, label_b: &str, text_b: &str) -> f64 {
        let a = tokenize(&format!("{} {}", label_a, text_a));
        let b = tokenize(&format!("{} {}", label_b, text_b));
        jaccard(&a, &b)
    }
}

/// Split text into a set of lowercase alphanumeric tokens.
///
/// Underscores and punctuation separate tokens, so `machine_learning`
/// contributes `machine` and `learning`.
pub fn tokenize(text: &str) -> HashSet<String> {
    TOKEN_PATTERN
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// |A ∩ B| / |A ∪ B|, or 0.0 when either side is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
