//! Lesson scoring: four axes and a weighted composite.
//!
//! Axes: causal proximity from the coupling graph, a counterfactual
//! effect estimate from beta-binomial counters, temporal decay tuned to
//! the target file's save cadence, and marginal info gain (filled in
//! during selection).

use crate::core::Lesson;
use crate::cre::state::{CreState, ScoringWeights};
use crate::graph::CouplingGraph;
use serde::{Deserialize, Serialize};

/// Density-bucket thresholds (score per token).
const DENSITY_THRESHOLDS: [f64; 4] = [0.005, 0.01, 0.02, 0.04];

/// Per-axis score breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisBreakdown {
    /// Graph proximity of the lesson's origin to the target file.
    pub causal_proximity: f64,
    /// Estimated counterfactual effect of injecting the lesson.
    pub counterfactual: f64,
    /// Temporal decay, boosted by trigger history.
    pub temporal: f64,
    /// Marginal info gain against the already-selected set.
    pub info_gain: f64,
}

/// A lesson with its composite score and packing stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLesson {
    /// The lesson itself.
    pub lesson: Lesson,
    /// Base composite `α·prox + β·counter + γ·temporal` (selection adds
    /// `δ·info_gain` for the picked items).
    pub score: f64,
    /// Per-axis breakdown.
    pub axes: AxisBreakdown,
    /// Estimated token cost.
    pub tokens: usize,
    /// Score per token.
    pub density: f64,
    /// Quantized density, 0..=4.
    pub density_bucket: u8,
}

/// Quantizes a density value into buckets 0..=4.
#[must_use]
pub fn density_bucket(density: f64) -> u8 {
    let mut bucket = 0_u8;
    for threshold in DENSITY_THRESHOLDS {
        if density < threshold {
            return bucket;
        }
        bucket += 1;
    }
    bucket
}

/// Counterfactual effect axis.
///
/// With no recorded outcomes the lesson's type prior stands in. With
/// data, the treated-vs-baseline failure gap is shrunk toward the prior
/// by `prior / √(1 + n_obs)` and clamped to [0, 1].
fn counterfactual(lesson: &Lesson, state: Option<&CreState>) -> f64 {
    let prior = lesson.kind.prior();
    let Some(counters) = state.and_then(|s| s.counters(&lesson.id)) else {
        return prior;
    };
    if counters.treated_observations() == 0 && counters.baseline_observations() == 0 {
        return prior;
    }

    let p_treated = counters.p_fail_treated();
    let p_baseline = counters.p_fail_baseline();
    let n_obs = f64::from(counters.treated_observations());
    (p_baseline - p_treated + prior / (1.0 + n_obs).sqrt()).clamp(0.0, 1.0)
}

/// Temporal decay axis.
///
/// λ adapts to the target file's save cadence: files saved daily decay
/// lessons fast, dormant files keep them warm. Repeated triggers add a
/// logarithmic boost capped at 3×.
fn temporal(lesson: &Lesson, state: Option<&CreState>, avg_days_between_saves: f64, now_ms: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let delta_days = ((now_ms - lesson.last_seen).max(0) as f64) / 86_400_000.0;
    let lambda = (1.0 / avg_days_between_saves.max(2.0)).clamp(0.05, 0.5);

    let triggers = state
        .and_then(|s| s.counters(&lesson.id))
        .map_or(0, |c| c.triggers);
    let boost = (1.0 + f64::from(triggers).ln_1p()).min(3.0);

    (-lambda * delta_days).exp() * boost
}

/// Scores a list of lessons against a target file.
///
/// `info_gain` stays 0 here; the selector computes it marginally.
#[must_use]
pub fn score_lessons(
    lessons: &[Lesson],
    graph: &CouplingGraph,
    state: Option<&CreState>,
    target_file: &str,
    avg_days_between_saves: f64,
    now_ms: i64,
    weights: &ScoringWeights,
) -> Vec<ScoredLesson> {
    lessons
        .iter()
        .map(|lesson| {
            let axes = AxisBreakdown {
                causal_proximity: graph.proximity(&lesson.origin_file, target_file),
                counterfactual: counterfactual(lesson, state),
                temporal: temporal(lesson, state, avg_days_between_saves, now_ms),
                info_gain: 0.0,
            };
            let score = weights.alpha * axes.causal_proximity
                + weights.beta * axes.counterfactual
                + weights.gamma * axes.temporal;
            let tokens = lesson.estimate_tokens();
            #[allow(clippy::cast_precision_loss)]
            let density = score / tokens as f64;

            ScoredLesson {
                lesson: lesson.clone(),
                score,
                axes,
                tokens,
                density,
                density_bucket: density_bucket(density),
            }
        })
        .collect()
}
