//! Reciprocal Rank Fusion (RRF).
//!
//! Combines multiple ranked lists into a single fused ranking.
//! Based on: Cormack, Clarke, Buettcher (2009) - "Reciprocal Rank Fusion
//! outperforms Condorcet and individual Rank Learning Methods"

use std::collections::HashMap;

/// Configuration for the RRF algorithm.
#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    /// The k parameter controls how much weight is given to lower-ranked
    /// items. Default is 60, the value recommended in the original paper.
    pub k: u32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { k: 60 }
    }
}

impl RrfConfig {
    /// Creates a new RRF config with the specified k value.
    #[must_use]
    pub const fn new(k: u32) -> Self {
        Self { k }
    }
}

/// Performs Reciprocal Rank Fusion on multiple ranked chunk-id lists.
///
/// The RRF score for each item is `score(d) = Σ 1 / (k + rank(d))` over
/// the lists that contain it (ranks are 1-based). The result is sorted
/// by score descending; ties keep first-insertion order, so equal-scored
/// items follow the order of the first ranking that saw them.
///
/// # Examples
///
/// ```
/// use rl4_rs::rank::{RrfConfig, reciprocal_rank_fusion};
///
/// let bm25 = vec!["a", "b", "c"];
/// let tfidf = vec!["c", "a", "b"];
/// let fused = reciprocal_rank_fusion(&[&bm25, &tfidf], &RrfConfig::new(60));
/// let order: Vec<&str> = fused.iter().map(|(id, _)| *id).collect();
/// assert_eq!(order, vec!["a", "c", "b"]);
/// ```
#[must_use]
pub fn reciprocal_rank_fusion<'a>(
    ranked_lists: &[&[&'a str]],
    config: &RrfConfig,
) -> Vec<(&'a str, f64)> {
    // Insertion-ordered accumulation keeps tie-breaking deterministic.
    let mut order: Vec<&'a str> = Vec::new();
    let mut scores: HashMap<&'a str, f64> = HashMap::new();

    for list in ranked_lists {
        for (rank, item) in list.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let rrf_score = 1.0 / f64::from(config.k + (rank as u32) + 1);
            if let Some(score) = scores.get_mut(item) {
                *score += rrf_score;
            } else {
                scores.insert(item, rrf_score);
                order.push(item);
            }
        }
    }

    let mut results: Vec<(&'a str, f64)> = order
        .into_iter()
        .map(|item| (item, scores[item]))
        .collect();
    // Stable sort preserves insertion order among exact ties.
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}
