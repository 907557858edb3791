//! Greedy submodular lesson selection under a token budget.
//!
//! Each round scores every still-fitting candidate by marginal density
//! `(S + δ·info_gain) / tokens`, where info gain shrinks with overlap
//! against the already-selected set. Selection stops when nothing fits
//! or four lessons are picked.

use crate::cre::score::ScoredLesson;
use crate::cre::state::ScoringWeights;
use crate::graph::CouplingGraph;
use serde::{Deserialize, Serialize};

/// Default token budget for a selection.
pub const DEFAULT_TOKEN_BUDGET: usize = 300;

/// Maximum selected lessons.
pub const MAX_SELECTED: usize = 4;

/// Overlap cap: even identical lessons keep 20% of their gain.
const MAX_OVERLAP: f64 = 0.8;

/// Why a candidate was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Did not fit in the remaining token budget.
    Budget,
    /// The selection already held the maximum number of items.
    MaxItems,
    /// Fit, but never won a greedy round.
    LowDensity,
}

/// A selected lesson with its 1-based rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedLesson {
    /// The scored lesson, with `info_gain` and final score filled in.
    pub scored: ScoredLesson,
    /// Selection rank, 1-based.
    pub rank: usize,
}

/// A rejected candidate with its drop reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedLesson {
    /// The scored lesson as it entered selection.
    pub scored: ScoredLesson,
    /// Why it was dropped.
    pub drop_reason: DropReason,
}

/// Result of one selection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Picked lessons, rank order.
    pub selected: Vec<SelectedLesson>,
    /// Rejected candidates with drop reasons.
    pub candidates: Vec<RejectedLesson>,
    /// Token budget the selection ran under.
    pub token_budget: usize,
    /// Tokens consumed by the selected set.
    pub used_tokens: usize,
}

impl Selection {
    /// Whether nothing was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Overlap between a candidate and one selected lesson:
/// `clamp(0.5·same_origin + 0.3·same_type + 0.4·same_coupled_file, 0, 0.8)`.
fn overlap(candidate: &ScoredLesson, picked: &ScoredLesson, graph: &CouplingGraph) -> f64 {
    let mut value: f64 = 0.0;
    if candidate.lesson.origin_file == picked.lesson.origin_file {
        value += 0.5;
    }
    if candidate.lesson.kind == picked.lesson.kind {
        value += 0.3;
    }
    if graph
        .edge_weight(&candidate.lesson.origin_file, &picked.lesson.origin_file)
        .is_some()
    {
        value += 0.4;
    }
    value.clamp(0.0, MAX_OVERLAP)
}

/// Greedy selection under `token_budget`.
#[must_use]
pub fn select_lessons(
    scored: Vec<ScoredLesson>,
    weights: &ScoringWeights,
    graph: &CouplingGraph,
    token_budget: usize,
) -> Selection {
    let mut remaining: Vec<ScoredLesson> = scored;
    let mut selected: Vec<SelectedLesson> = Vec::new();
    let mut used_tokens = 0_usize;

    while selected.len() < MAX_SELECTED {
        let budget_left = token_budget.saturating_sub(used_tokens);

        let mut best: Option<(usize, f64, f64)> = None;
        for (index, candidate) in remaining.iter().enumerate() {
            if candidate.tokens > budget_left {
                continue;
            }

            let max_overlap = selected
                .iter()
                .map(|s| overlap(candidate, &s.scored, graph))
                .fold(0.0_f64, f64::max);
            let info_gain = candidate.score * (1.0 - max_overlap);
            #[allow(clippy::cast_precision_loss)]
            let marginal_density =
                (candidate.score + weights.delta * info_gain) / candidate.tokens as f64;

            let better = best.is_none_or(|(_, best_density, _)| marginal_density > best_density);
            if better {
                best = Some((index, marginal_density, info_gain));
            }
        }

        let Some((index, _, info_gain)) = best else {
            break;
        };

        let mut picked = remaining.remove(index);
        picked.axes.info_gain = info_gain;
        picked.score += weights.delta * info_gain;
        #[allow(clippy::cast_precision_loss)]
        let final_density = picked.score / picked.tokens as f64;
        picked.density = final_density;
        picked.density_bucket = crate::cre::score::density_bucket(picked.density);
        used_tokens += picked.tokens;
        selected.push(SelectedLesson {
            scored: picked,
            rank: selected.len() + 1,
        });
    }

    let budget_left = token_budget.saturating_sub(used_tokens);
    let candidates: Vec<RejectedLesson> = remaining
        .into_iter()
        .map(|scored| {
            let drop_reason = if scored.tokens > budget_left {
                DropReason::Budget
            } else if selected.len() >= MAX_SELECTED {
                DropReason::MaxItems
            } else {
                DropReason::LowDensity
            };
            RejectedLesson {
                scored,
                drop_reason,
            }
        })
        .collect();

    Selection {
        selected,
        candidates,
        token_budget,
        used_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Lesson, LessonKind};
    use crate::cre::score::{AxisBreakdown, density_bucket};
    use crate::graph::CouplingGraphBuilder;

    fn scored(origin: &str, kind: LessonKind, score: f64, tokens: usize) -> ScoredLesson {
        let lesson = Lesson::new(kind, format!("lesson about {origin} {tokens}"), origin);
        #[allow(clippy::cast_precision_loss)]
        let density = score / tokens as f64;
        ScoredLesson {
            lesson,
            score,
            axes: AxisBreakdown {
                causal_proximity: score,
                ..AxisBreakdown::default()
            },
            tokens,
            density,
            density_bucket: density_bucket(density),
        }
    }

    fn kinds() -> [LessonKind; 6] {
        [
            LessonKind::Avoid,
            LessonKind::Reversal,
            LessonKind::Decision,
            LessonKind::Coupling,
            LessonKind::Chat,
            LessonKind::Hotspot,
        ]
    }

    #[test]
    fn test_budget_scenario_equal_scores() {
        // Six lessons, tokens {80, 90, 100, 110, 120, 200}, equal base
        // scores: selection under 300 tokens picks exactly three items
        // totalling 270 and drops the 200-token lesson on budget.
        let tokens = [80, 90, 100, 110, 120, 200];
        let lessons: Vec<ScoredLesson> = tokens
            .iter()
            .zip(kinds())
            .map(|(t, kind)| scored(&format!("f{t}.ts"), kind, 1.0, *t))
            .collect();

        let graph = CouplingGraphBuilder::new().build();
        let selection = select_lessons(
            lessons,
            &crate::cre::state::ScoringWeights::default(),
            &graph,
            300,
        );

        assert_eq!(selection.selected.len(), 3);
        assert_eq!(selection.used_tokens, 270);
        assert!(selection.used_tokens <= 300);
        let picked: Vec<usize> = selection.selected.iter().map(|s| s.scored.tokens).collect();
        assert_eq!(picked, vec![80, 90, 100]);

        for rejected in &selection.candidates {
            assert_eq!(rejected.drop_reason, DropReason::Budget);
        }
        let big = selection
            .candidates
            .iter()
            .find(|c| c.scored.tokens == 200)
            .unwrap();
        assert_eq!(big.drop_reason, DropReason::Budget);
    }

    #[test]
    fn test_ranks_are_one_based_and_ordered() {
        let lessons: Vec<ScoredLesson> = kinds()
            .iter()
            .enumerate()
            .take(3)
            .map(|(i, kind)| scored(&format!("f{i}.ts"), *kind, 1.0 - 0.1 * i as f64, 10))
            .collect();
        let graph = CouplingGraphBuilder::new().build();
        let selection = select_lessons(
            lessons,
            &crate::cre::state::ScoringWeights::default(),
            &graph,
            300,
        );

        let ranks: Vec<usize> = selection.selected.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_max_items_cap() {
        let lessons: Vec<ScoredLesson> = (0..6)
            .zip(kinds())
            .map(|(i, kind)| scored(&format!("f{i}.ts"), kind, 1.0, 10))
            .collect();
        let graph = CouplingGraphBuilder::new().build();
        let selection = select_lessons(
            lessons,
            &crate::cre::state::ScoringWeights::default(),
            &graph,
            300,
        );

        assert_eq!(selection.selected.len(), MAX_SELECTED);
        for rejected in &selection.candidates {
            assert_eq!(rejected.drop_reason, DropReason::MaxItems);
        }
    }

    #[test]
    fn test_overlap_shrinks_info_gain() {
        // Two lessons on the same origin and type overlap at the 0.8
        // cap; a distinct one keeps its full gain.
        let same_a = scored("same.ts", LessonKind::Avoid, 1.0, 10);
        let same_b = scored("same.ts", LessonKind::Avoid, 0.9, 10);
        let distinct = scored("other.ts", LessonKind::Decision, 0.9, 10);

        let graph = CouplingGraphBuilder::new().build();
        let selection = select_lessons(
            vec![same_a, same_b, distinct],
            &crate::cre::state::ScoringWeights::default(),
            &graph,
            300,
        );

        // First pick: same_a (highest score). Second pick must be the
        // distinct lesson despite equal base score with same_b.
        assert_eq!(selection.selected[0].scored.lesson.origin_file, "same.ts");
        assert_eq!(selection.selected[1].scored.lesson.origin_file, "other.ts");

        // The duplicate's eventual gain reflects the 0.8 overlap cap.
        let duplicate = &selection.selected[2];
        assert_eq!(duplicate.scored.lesson.origin_file, "same.ts");
        assert!((duplicate.scored.axes.info_gain - 0.9 * (1.0 - 0.8)).abs() < 1e-9);
    }

    #[test]
    fn test_coupled_origin_counts_as_overlap() {
        let mut builder = CouplingGraphBuilder::new();
        for _ in 0..5 {
            builder.add_co_modification(&["a.ts".to_string(), "b.ts".to_string()]);
        }
        let graph = builder.build();

        let first = scored("a.ts", LessonKind::Avoid, 1.0, 10);
        let coupled = scored("b.ts", LessonKind::Decision, 0.9, 10);
        let free = scored("z.ts", LessonKind::Chat, 0.9, 10);

        let selection = select_lessons(
            vec![first, coupled, free],
            &crate::cre::state::ScoringWeights::default(),
            &graph,
            300,
        );

        // The uncoupled lesson wins round two on info gain.
        assert_eq!(selection.selected[1].scored.lesson.origin_file, "z.ts");
    }

    #[test]
    fn test_selected_scores_include_delta_gain() {
        let only = scored("a.ts", LessonKind::Avoid, 1.0, 10);
        let graph = CouplingGraphBuilder::new().build();
        let selection = select_lessons(
            vec![only],
            &crate::cre::state::ScoringWeights::default(),
            &graph,
            300,
        );

        let picked = &selection.selected[0];
        // No overlap: info gain = base score; final = 1.0 + 0.15·1.0.
        assert!((picked.scored.axes.info_gain - 1.0).abs() < 1e-9);
        assert!((picked.scored.score - 1.15).abs() < 1e-9);
        assert_eq!(selection.used_tokens, 10);
    }

    #[test]
    fn test_empty_input() {
        let graph = CouplingGraphBuilder::new().build();
        let selection = select_lessons(
            Vec::new(),
            &crate::cre::state::ScoringWeights::default(),
            &graph,
            300,
        );
        assert!(selection.is_empty());
        assert!(selection.candidates.is_empty());
        assert_eq!(selection.used_tokens, 0);
    }

    #[test]
    fn test_nothing_fits_budget() {
        let big = scored("a.ts", LessonKind::Avoid, 1.0, 500);
        let graph = CouplingGraphBuilder::new().build();
        let selection = select_lessons(
            vec![big],
            &crate::cre::state::ScoringWeights::default(),
            &graph,
            300,
        );
        assert!(selection.is_empty());
        assert_eq!(selection.candidates[0].drop_reason, DropReason::Budget);
    }
}
