//! Feature reranker.
//!
//! Starts from the positional base score `1/(position+1)` over the fused
//! RRF candidates and applies recency, per-intent source bias, file
//! match (once per chunk), and additive term overlap.

use crate::core::Chunk;
use crate::query::{QueryAnalysis, source_bias};
use chrono::NaiveDate;

/// Reranker knobs.
#[derive(Debug, Clone, Copy)]
pub struct RerankConfig {
    /// Window in days treated as "recent".
    pub recency_days: f64,
    /// Multiplier applied inside the recency window.
    pub recency_boost: f64,
    /// Multiplier when a query file path matches the chunk.
    pub file_match_boost: f64,
    /// Weight of the additive term-overlap feature.
    pub term_overlap_weight: f64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            recency_days: 7.0,
            recency_boost: 1.5,
            file_match_boost: 2.0,
            term_overlap_weight: 0.5,
        }
    }
}

/// Relevance tier of a result, derived from normalized relevance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Relevance ≥ 0.7.
    High,
    /// Relevance ≥ 0.35.
    Medium,
    /// Everything else.
    Low,
}

impl Tier {
    /// Maps a normalized relevance in [0, 1] to a tier.
    #[must_use]
    pub fn from_relevance(relevance: f64) -> Self {
        if relevance >= 0.7 {
            Self::High
        } else if relevance >= 0.35 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Dot markers used in rendered bundles.
    #[must_use]
    pub const fn dots(self) -> &'static str {
        match self {
            Self::High => "●●●",
            Self::Medium => "●●○",
            Self::Low => "●○○",
        }
    }

    /// Snippet budget in characters for this tier.
    #[must_use]
    pub const fn snippet_budget(self) -> usize {
        match self {
            Self::High => 1200,
            Self::Medium => 600,
            Self::Low => 300,
        }
    }
}

/// Days elapsed between an ISO date and a now-timestamp, if parseable.
fn days_since(date: &str, now_ms: i64) -> Option<f64> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let now = chrono::DateTime::from_timestamp_millis(now_ms)?.date_naive();
    #[allow(clippy::cast_precision_loss)]
    let days = (now - date).num_days().max(0) as f64;
    Some(days)
}

/// Reranks fused candidates, returning `(chunk id, score)` sorted
/// descending (stable on ties).
#[must_use]
pub fn rerank(
    candidates: &[&Chunk],
    analysis: &QueryAnalysis,
    config: &RerankConfig,
    now_ms: i64,
) -> Vec<(String, f64)> {
    let mut scored: Vec<(String, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(position, chunk)| {
            #[allow(clippy::cast_precision_loss)]
            let mut score = 1.0 / (position as f64 + 1.0);

            // Recency boost.
            if let Some(days) = chunk.meta.date.as_deref().and_then(|d| days_since(d, now_ms)) {
                if days <= config.recency_days {
                    score *= config.recency_boost;
                } else {
                    score *= (config.recency_boost * config.recency_days / days).max(1.0);
                }
            }

            // Per-intent source bias.
            score *= source_bias(analysis.intent, chunk.meta.source);

            // File match, applied at most once per chunk.
            let file_matched = analysis.files.iter().any(|file| {
                chunk.content.contains(file.as_str()) || chunk.meta.file.contains(file.as_str())
            });
            if file_matched {
                score *= config.file_match_boost;
            }

            // Additive term overlap over the original query terms.
            if !analysis.terms.is_empty() {
                let content_lower = chunk.content.to_lowercase();
                #[allow(clippy::cast_precision_loss)]
                let present = analysis
                    .terms
                    .iter()
                    .filter(|term| content_lower.contains(term.as_str()))
                    .count() as f64;
                #[allow(clippy::cast_precision_loss)]
                let total = analysis.terms.len() as f64;
                score += config.term_overlap_weight * (present / total);
            }

            (chunk.id.clone(), score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChunkMeta, SourceKind};
    use crate::query::analyze;

    /// 2026-07-10T00:00:00Z.
    const NOW_MS: i64 = 1_783_641_600_000;

    fn chunk(id_seed: &str, source: SourceKind, content: &str, date: Option<&str>) -> Chunk {
        let mut meta = ChunkMeta::new(source, format!("files/{id_seed}.ts"));
        meta.date = date.map(ToString::to_string);
        Chunk::new(content.to_string(), meta, id_seed)
    }

    #[test]
    fn test_base_score_is_positional() {
        let a = chunk("a", SourceKind::Code, "nothing relevant", None);
        let b = chunk("b", SourceKind::Code, "nothing relevant", None);
        let analysis = analyze("zzz qqq");

        let scored = rerank(&[&a, &b], &analysis, &RerankConfig::default(), NOW_MS);
        assert_eq!(scored[0].0, a.id);
        assert!(scored[0].1 > scored[1].1);
    }

    #[test]
    fn test_recency_boost_inside_window() {
        let fresh = chunk("fresh", SourceKind::Code, "x", Some("2026-07-09"));
        let stale = chunk("stale", SourceKind::Code, "x", Some("2026-01-01"));
        let analysis = analyze("zzz");

        // Same position baseline: compare scores one at a time.
        let fresh_score = rerank(&[&fresh], &analysis, &RerankConfig::default(), NOW_MS)[0].1;
        let stale_score = rerank(&[&stale], &analysis, &RerankConfig::default(), NOW_MS)[0].1;
        assert!((fresh_score - 1.5).abs() < 1e-9);
        // Old dates degrade to the max(1, ...) floor: no boost.
        assert!((stale_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_recency_decay_between_window_and_floor() {
        // 14 days old: 1.5 * 7/14 = 0.75 → floored to 1.0.
        let two_weeks = chunk("w", SourceKind::Code, "x", Some("2026-06-26"));
        // 10 days old: 1.5 * 7/10 = 1.05.
        let ten_days = chunk("t", SourceKind::Code, "x", Some("2026-06-30"));
        let analysis = analyze("zzz");

        let w = rerank(&[&two_weeks], &analysis, &RerankConfig::default(), NOW_MS)[0].1;
        let t = rerank(&[&ten_days], &analysis, &RerankConfig::default(), NOW_MS)[0].1;
        assert!((w - 1.0).abs() < 1e-9);
        assert!((t - 1.05).abs() < 1e-9);
    }

    #[test]
    fn test_source_bias_for_why_intent() {
        let decision = chunk("d", SourceKind::Decisions, "x", None);
        let code = chunk("c", SourceKind::Code, "x", None);
        let analysis = analyze("why did we choose this");

        let decision_score =
            rerank(&[&decision], &analysis, &RerankConfig::default(), NOW_MS)[0].1;
        let code_score = rerank(&[&code], &analysis, &RerankConfig::default(), NOW_MS)[0].1;
        assert!((decision_score - 2.0).abs() < 1e-9);
        assert!((code_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_file_match_applied_once() {
        let mentions_twice = chunk(
            "m",
            SourceKind::Code,
            "src/cache.ts and again src/cache.ts",
            None,
        );
        let analysis = analyze("what broke in src/cache.ts");

        let scored = rerank(&[&mentions_twice], &analysis, &RerankConfig::default(), NOW_MS);
        // 1.0 base × 1.3 what/code bias × 2.0 file boost (applied once,
        // despite two mentions) + 0.25 overlap (3 of 6 terms present).
        assert!((scored[0].1 - 2.85).abs() < 1e-9);
    }

    #[test]
    fn test_term_overlap_additive() {
        let full = chunk("f", SourceKind::Code, "the cache signature changed", None);
        let none = chunk("n", SourceKind::Code, "unrelated body", None);
        let analysis = analyze("cache signature");

        let full_score = rerank(&[&full], &analysis, &RerankConfig::default(), NOW_MS)[0].1;
        let none_score = rerank(&[&none], &analysis, &RerankConfig::default(), NOW_MS)[0].1;
        assert!((full_score - none_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(Tier::from_relevance(1.0), Tier::High);
        assert_eq!(Tier::from_relevance(0.7), Tier::High);
        assert_eq!(Tier::from_relevance(0.5), Tier::Medium);
        assert_eq!(Tier::from_relevance(0.35), Tier::Medium);
        assert_eq!(Tier::from_relevance(0.1), Tier::Low);
    }

    #[test]
    fn test_tier_rendering_and_budgets() {
        assert_eq!(Tier::High.dots(), "●●●");
        assert_eq!(Tier::Medium.dots(), "●●○");
        assert_eq!(Tier::Low.dots(), "●○○");
        assert_eq!(Tier::High.snippet_budget(), 1200);
        assert_eq!(Tier::Medium.snippet_budget(), 600);
        assert_eq!(Tier::Low.snippet_budget(), 300);
    }
}
