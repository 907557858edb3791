//! CRE state: per-lesson counters, scoring weights, safety guard, KPIs.
//!
//! State is a pure fold over the intervention log. The same
//! [`CreState::apply_record`] drives both online updates and
//! [`CreState::recompute_from_logs`], so replay from scratch is
//! byte-identical to the state accumulated incrementally.

use crate::core::LessonKind;
use crate::cre::log::{InterventionRecord, Outcome};
use crate::error::{CreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Safety window length (7 days) in milliseconds.
const WEEK_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Reversal-rate regression threshold that trips the freeze.
const FREEZE_MARGIN: f64 = 0.15;

/// Minimum resolved interventions before the freeze can trip.
const FREEZE_MIN_TOTAL: u32 = 10;

/// Baseline observations below which adjacent-bucket controls count.
const SPARSE_CONTROL_OBS: u32 = 5;

/// Per-lesson beta-binomial counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCounters {
    /// Lesson type.
    #[serde(rename = "type")]
    pub kind: LessonKind,
    /// Accepted outcomes while injected.
    pub injected_ok: u32,
    /// Reversed outcomes while injected.
    pub injected_fail: u32,
    /// Reworked outcomes while injected.
    pub injected_soft_fail: u32,
    /// Accepted outcomes while a matched control.
    pub baseline_ok: u32,
    /// Reversed outcomes while a matched control.
    pub baseline_fail: u32,
    /// Reworked outcomes while a matched control.
    pub baseline_soft_fail: u32,
    /// Times this lesson was selected.
    pub triggers: u32,
    /// Epoch-ms of the latest selection.
    pub last_triggered: i64,
    /// Epoch-ms of the first time the engine saw this lesson.
    pub first_seen: i64,
}

impl LessonCounters {
    /// Fresh counters for a lesson first seen now.
    #[must_use]
    pub const fn new(kind: LessonKind, now_ms: i64) -> Self {
        Self {
            kind,
            injected_ok: 0,
            injected_fail: 0,
            injected_soft_fail: 0,
            baseline_ok: 0,
            baseline_fail: 0,
            baseline_soft_fail: 0,
            triggers: 0,
            last_triggered: 0,
            first_seen: now_ms,
        }
    }

    /// Treated-arm observation count.
    #[must_use]
    pub const fn treated_observations(&self) -> u32 {
        self.injected_ok + self.injected_fail + self.injected_soft_fail
    }

    /// Control-arm observation count.
    #[must_use]
    pub const fn baseline_observations(&self) -> u32 {
        self.baseline_ok + self.baseline_fail + self.baseline_soft_fail
    }

    /// Smoothed failure probability under injection.
    #[must_use]
    pub fn p_fail_treated(&self) -> f64 {
        beta_binomial_p_fail(self.injected_fail, self.injected_ok, self.injected_soft_fail)
    }

    /// Smoothed failure probability as a control.
    #[must_use]
    pub fn p_fail_baseline(&self) -> f64 {
        beta_binomial_p_fail(self.baseline_fail, self.baseline_ok, self.baseline_soft_fail)
    }
}

/// `(fail + 0.5·soft + 1) / (fail + ok + soft + 2)`.
fn beta_binomial_p_fail(fail: u32, ok: u32, soft: u32) -> f64 {
    (f64::from(fail) + 0.5 * f64::from(soft) + 1.0)
        / (f64::from(fail) + f64::from(ok) + f64::from(soft) + 2.0)
}

/// The four scalar scoring weights, summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Causal-proximity weight (α).
    pub alpha: f64,
    /// Counterfactual weight (β).
    pub beta: f64,
    /// Temporal-decay weight (γ).
    pub gamma: f64,
    /// Info-gain weight (δ).
    pub delta: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            alpha: 0.35,
            beta: 0.30,
            gamma: 0.20,
            delta: 0.15,
        }
    }
}

impl ScoringWeights {
    /// Rescales the weights to sum to 1.
    pub fn normalize(&mut self) {
        let sum = self.alpha + self.beta + self.gamma + self.delta;
        if sum > 0.0 {
            self.alpha /= sum;
            self.beta /= sum;
            self.gamma /= sum;
            self.delta /= sum;
        }
    }

    /// Clamps every weight into `[0.1, 0.6]`.
    pub fn clamp_each(&mut self) {
        self.alpha = self.alpha.clamp(0.1, 0.6);
        self.beta = self.beta.clamp(0.1, 0.6);
        self.gamma = self.gamma.clamp(0.1, 0.6);
        self.delta = self.delta.clamp(0.1, 0.6);
    }
}

/// One resolved-outcome event retained for the safety windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    /// Resolution timestamp (epoch ms).
    pub t: i64,
    /// Whether the outcome was `reversed_fast`.
    pub reversed: bool,
}

/// Reversal-rate regression guard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyState {
    /// Reversal rate over the most recent 7 days (window A).
    pub recent_reversal_rate: f64,
    /// Reversal rate over the prior week (window B).
    pub prior_reversal_rate: f64,
    /// Resolved interventions counted by the guard.
    pub total_interventions: u32,
    /// Whether learning updates are paused.
    pub frozen: bool,
    /// Human-readable freeze reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_reason: Option<String>,
    /// Epoch-ms of the freeze.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_at: Option<i64>,
    /// Events inside the two windows, pruned to 14 days.
    #[serde(default)]
    pub events: Vec<OutcomeEvent>,
}

/// Aggregate outcome KPIs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kpis {
    /// Resolved interventions, all outcomes.
    pub resolved: u32,
    /// Accepted outcomes.
    pub accepted: u32,
    /// Reworked outcomes.
    pub reworked: u32,
    /// Reversed outcomes.
    pub reversed: u32,
    /// Indeterminate outcomes.
    pub indeterminate: u32,
}

/// Full CRE state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreState {
    /// Per-lesson counters keyed by lesson id.
    #[serde(default)]
    pub lessons: BTreeMap<String, LessonCounters>,
    /// Current scoring weights.
    #[serde(default)]
    pub weights: ScoringWeights,
    /// Safety guard block.
    #[serde(default)]
    pub safety: SafetyState,
    /// Outcome KPIs.
    #[serde(default)]
    pub kpis: Kpis,
    /// When weight adaptation was first activated, if ever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v2_activated_at: Option<i64>,
}

impl Default for CreState {
    fn default() -> Self {
        Self {
            lessons: BTreeMap::new(),
            weights: ScoringWeights::default(),
            safety: SafetyState::default(),
            kpis: Kpis::default(),
            v2_activated_at: None,
        }
    }
}

impl CreState {
    /// Loads state from disk; a missing file yields the default state.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                CreError::StateCorrupt {
                    reason: e.to_string(),
                }
                .into()
            }),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Persists state to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CreError::LogIo {
                path: parent.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CreError::Encoding(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| {
            CreError::LogIo {
                path: path.to_string_lossy().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Counters for a lesson, if any outcome data exists.
    #[must_use]
    pub fn counters(&self, lesson_id: &str) -> Option<&LessonCounters> {
        self.lessons.get(lesson_id)
    }

    /// Applies one intervention record: selection effects, then outcome
    /// effects when the record is resolved.
    pub fn apply_record(&mut self, record: &InterventionRecord) {
        self.note_selection(record);
        if record.outcome != Outcome::Pending {
            self.note_outcome(record);
        }
    }

    /// Records selection effects: trigger counts and timestamps.
    pub fn note_selection(&mut self, record: &InterventionRecord) {
        for lesson in &record.selected {
            let counters = self
                .lessons
                .entry(lesson.id.clone())
                .or_insert_with(|| LessonCounters::new(lesson.kind, record.t));
            counters.triggers += 1;
            counters.last_triggered = record.t;
        }
    }

    /// Records outcome effects: counters, safety totals, freeze check.
    ///
    /// Indeterminate outcomes and outcomes resolved during a refactor
    /// storm update KPIs only.
    pub fn note_outcome(&mut self, record: &InterventionRecord) {
        let outcome = record.outcome;
        if outcome == Outcome::Pending {
            return;
        }

        self.kpis.resolved += 1;
        match outcome {
            Outcome::Accepted => self.kpis.accepted += 1,
            Outcome::Reworked => self.kpis.reworked += 1,
            Outcome::ReversedFast => self.kpis.reversed += 1,
            Outcome::Indeterminate => self.kpis.indeterminate += 1,
            Outcome::Pending => {}
        }

        let storm = record
            .outcome_signals
            .as_ref()
            .is_some_and(|s| s.refactor_storm);
        if outcome == Outcome::Indeterminate || storm {
            return;
        }

        // Treatment arm.
        for lesson in &record.selected {
            let counters = self
                .lessons
                .entry(lesson.id.clone())
                .or_insert_with(|| LessonCounters::new(lesson.kind, record.t));
            match outcome {
                Outcome::Accepted => counters.injected_ok += 1,
                Outcome::Reworked => counters.injected_soft_fail += 1,
                Outcome::ReversedFast => counters.injected_fail += 1,
                Outcome::Pending | Outcome::Indeterminate => {}
            }
        }

        // Control arm: candidates in a selected density bucket, or an
        // adjacent one while their baseline data is still sparse.
        let selected_buckets: Vec<u8> = record.selected.iter().map(|l| l.density_bucket).collect();
        for candidate in &record.candidates {
            let counters = self
                .lessons
                .entry(candidate.id.clone())
                .or_insert_with(|| LessonCounters::new(candidate.kind, record.t));
            let sparse = counters.baseline_observations() < SPARSE_CONTROL_OBS;
            let matched = selected_buckets.iter().any(|&bucket| {
                bucket == candidate.density_bucket
                    || (sparse && bucket.abs_diff(candidate.density_bucket) == 1)
            });
            if !matched {
                continue;
            }
            match outcome {
                Outcome::Accepted => counters.baseline_ok += 1,
                Outcome::Reworked => counters.baseline_soft_fail += 1,
                Outcome::ReversedFast => counters.baseline_fail += 1,
                Outcome::Pending | Outcome::Indeterminate => {}
            }
        }

        // Safety totals and windows.
        let resolved_at = record.outcome_resolved_at.unwrap_or(record.t);
        self.safety.total_interventions += 1;
        self.safety.events.push(OutcomeEvent {
            t: resolved_at,
            reversed: outcome == Outcome::ReversedFast,
        });
        self.recompute_safety_windows();
        self.evaluate_freeze(resolved_at);
    }

    /// Recomputes window A (last 7 days) and window B (the week before)
    /// relative to the newest event, pruning anything older than 14
    /// days. Using event time instead of the wall clock keeps replay
    /// deterministic.
    fn recompute_safety_windows(&mut self) {
        self.safety.events.sort_by_key(|e| e.t);
        let Some(latest) = self.safety.events.last().map(|e| e.t) else {
            return;
        };
        self.safety.events.retain(|e| e.t > latest - 2 * WEEK_MS);

        let rate = |events: &[OutcomeEvent], from: i64, to: i64| -> f64 {
            let window: Vec<&OutcomeEvent> =
                events.iter().filter(|e| e.t > from && e.t <= to).collect();
            if window.is_empty() {
                return 0.0;
            }
            #[allow(clippy::cast_precision_loss)]
            let reversed = window.iter().filter(|e| e.reversed).count() as f64;
            #[allow(clippy::cast_precision_loss)]
            let total = window.len() as f64;
            reversed / total
        };

        self.safety.recent_reversal_rate = rate(&self.safety.events, latest - WEEK_MS, latest);
        self.safety.prior_reversal_rate =
            rate(&self.safety.events, latest - 2 * WEEK_MS, latest - WEEK_MS);
    }

    /// Trips or releases the freeze based on the current windows.
    fn evaluate_freeze(&mut self, now_ms: i64) {
        let a = self.safety.recent_reversal_rate;
        let b = self.safety.prior_reversal_rate;

        if a > b + FREEZE_MARGIN && b > 0.0 && self.safety.total_interventions >= FREEZE_MIN_TOTAL
        {
            let reason = format!(
                "recent reversal rate {a:.2} regressed past prior rate {b:.2} + {FREEZE_MARGIN}"
            );
            if !self.safety.frozen {
                warn!(reason, "safety freeze engaged");
                self.safety.frozen = true;
                self.safety.frozen_at = Some(now_ms);
            }
            // Keep the reason current while the regression persists.
            self.safety.frozen_reason = Some(reason);
        } else if self.safety.frozen && a <= b {
            info!(recent = a, prior = b, "safety freeze released");
            self.safety.frozen = false;
            self.safety.frozen_reason = None;
            self.safety.frozen_at = None;
        }
    }

    /// Folds the whole intervention log from scratch, in file order.
    #[must_use]
    pub fn recompute_from_logs(records: &[InterventionRecord]) -> Self {
        let mut state = Self::default();
        for record in records {
            state.apply_record(record);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cre::log::{LoggedLesson, OutcomeSignals};
    use crate::cre::score::AxisBreakdown;

    fn lesson(id: &str, bucket: u8) -> LoggedLesson {
        LoggedLesson {
            id: id.to_string(),
            kind: LessonKind::Avoid,
            score: 0.5,
            rank: 1,
            density: 0.01,
            density_bucket: bucket,
            axes: AxisBreakdown::default(),
        }
    }

    fn record(t: i64, outcome: Outcome, selected: Vec<LoggedLesson>) -> InterventionRecord {
        InterventionRecord {
            intervention_id: format!("iv-{t}"),
            engine_version: "test".to_string(),
            t,
            target_file: "src/a.ts".to_string(),
            burst_id: None,
            selected,
            candidates: Vec::new(),
            token_budget: 300,
            used_tokens: 100,
            outcome,
            outcome_resolved_at: Some(t + 1),
            outcome_signals: None,
            pi_log: vec![1.0],
        }
    }

    #[test]
    fn test_beta_binomial_smoothing() {
        let counters = LessonCounters::new(LessonKind::Avoid, 0);
        // No data: (0 + 0 + 1) / (0 + 0 + 0 + 2) = 0.5.
        assert!((counters.p_fail_treated() - 0.5).abs() < 1e-9);

        let counters = LessonCounters {
            injected_ok: 3,
            injected_fail: 1,
            injected_soft_fail: 2,
            ..LessonCounters::new(LessonKind::Avoid, 0)
        };
        // (1 + 1 + 1) / (1 + 3 + 2 + 2) = 3/8.
        assert!((counters.p_fail_treated() - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_selection_updates_triggers() {
        let mut state = CreState::default();
        state.apply_record(&record(100, Outcome::Pending, vec![lesson("l1", 2)]));
        state.apply_record(&record(200, Outcome::Pending, vec![lesson("l1", 2)]));

        let counters = state.counters("l1").unwrap();
        assert_eq!(counters.triggers, 2);
        assert_eq!(counters.last_triggered, 200);
        assert_eq!(counters.first_seen, 100);
        assert_eq!(counters.treated_observations(), 0);
    }

    #[test]
    fn test_outcome_updates_treatment_arm() {
        let mut state = CreState::default();
        state.apply_record(&record(1, Outcome::Accepted, vec![lesson("l1", 2)]));
        state.apply_record(&record(2, Outcome::Reworked, vec![lesson("l1", 2)]));
        state.apply_record(&record(3, Outcome::ReversedFast, vec![lesson("l1", 2)]));

        let counters = state.counters("l1").unwrap();
        assert_eq!(counters.injected_ok, 1);
        assert_eq!(counters.injected_soft_fail, 1);
        assert_eq!(counters.injected_fail, 1);
        assert_eq!(state.kpis.resolved, 3);
    }

    #[test]
    fn test_indeterminate_updates_kpis_only() {
        let mut state = CreState::default();
        state.apply_record(&record(1, Outcome::Indeterminate, vec![lesson("l1", 2)]));

        assert_eq!(state.kpis.indeterminate, 1);
        let counters = state.counters("l1").unwrap();
        assert_eq!(counters.treated_observations(), 0);
        assert_eq!(state.safety.total_interventions, 0);
    }

    #[test]
    fn test_refactor_storm_skips_training() {
        let mut state = CreState::default();
        let mut r = record(1, Outcome::Accepted, vec![lesson("l1", 2)]);
        r.outcome_signals = Some(OutcomeSignals {
            refactor_storm: true,
            ..OutcomeSignals::default()
        });
        state.apply_record(&r);

        assert_eq!(state.kpis.accepted, 1);
        assert_eq!(state.counters("l1").unwrap().treated_observations(), 0);
        assert_eq!(state.safety.total_interventions, 0);
    }

    #[test]
    fn test_control_arm_bucket_matching() {
        let mut state = CreState::default();
        let mut r = record(1, Outcome::Accepted, vec![lesson("sel", 2)]);
        r.candidates = vec![
            crate::cre::log::CandidateLesson {
                id: "same-bucket".to_string(),
                kind: LessonKind::Decision,
                score: 0.2,
                density: 0.01,
                density_bucket: 2,
                drop_reason: crate::cre::select::DropReason::LowDensity,
            },
            crate::cre::log::CandidateLesson {
                id: "adjacent".to_string(),
                kind: LessonKind::Decision,
                score: 0.2,
                density: 0.01,
                density_bucket: 3,
                drop_reason: crate::cre::select::DropReason::Budget,
            },
            crate::cre::log::CandidateLesson {
                id: "far".to_string(),
                kind: LessonKind::Decision,
                score: 0.2,
                density: 0.01,
                density_bucket: 0,
                drop_reason: crate::cre::select::DropReason::Budget,
            },
        ];
        state.apply_record(&r);

        assert_eq!(state.counters("same-bucket").unwrap().baseline_ok, 1);
        // Adjacent bucket counts while sparse.
        assert_eq!(state.counters("adjacent").unwrap().baseline_ok, 1);
        assert_eq!(state.counters("far").unwrap().baseline_ok, 0);
    }

    #[test]
    fn test_safety_freeze_and_release() {
        let mut state = CreState::default();
        let day = 24 * 60 * 60 * 1000_i64;
        let base = 100 * day;

        // Prior week: 20% reversal rate (2/10).
        for i in 0..10_i64 {
            let outcome = if i < 2 {
                Outcome::ReversedFast
            } else {
                Outcome::Accepted
            };
            let mut r = record(base + i, outcome, vec![lesson("l", 2)]);
            r.outcome_resolved_at = Some(base + i);
            state.apply_record(&r);
        }
        // Recent week: 40% reversal rate (4/10).
        for i in 0..10_i64 {
            let outcome = if i < 4 {
                Outcome::ReversedFast
            } else {
                Outcome::Accepted
            };
            let t = base + 8 * day + i;
            let mut r = record(t, outcome, vec![lesson("l", 2)]);
            r.outcome_resolved_at = Some(t);
            state.apply_record(&r);
        }

        assert!(state.safety.frozen);
        let reason = state.safety.frozen_reason.as_deref().unwrap();
        assert!(reason.contains("0.40"));
        assert!(reason.contains("0.20"));

        // A week later, a batch at 15%: window A now holds only the
        // improved batch while window B holds the 40% week, so the
        // freeze releases.
        for i in 0..20_i64 {
            let outcome = if i < 3 {
                Outcome::ReversedFast
            } else {
                Outcome::Accepted
            };
            let t = base + 16 * day + i;
            let mut r = record(t, outcome, vec![lesson("l", 2)]);
            r.outcome_resolved_at = Some(t);
            state.apply_record(&r);
        }
        assert!(!state.safety.frozen);
        assert!(state.safety.frozen_reason.is_none());
    }

    #[test]
    fn test_replay_equals_online() {
        let records = vec![
            record(1, Outcome::Accepted, vec![lesson("a", 1)]),
            record(2, Outcome::ReversedFast, vec![lesson("b", 2)]),
            record(3, Outcome::Indeterminate, vec![lesson("a", 1)]),
            record(4, Outcome::Reworked, vec![lesson("a", 1), lesson("b", 2)]),
        ];

        let mut online = CreState::default();
        for r in &records {
            online.apply_record(r);
        }
        let replayed = CreState::recompute_from_logs(&records);
        assert_eq!(online, replayed);
    }

    #[test]
    fn test_state_save_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(".internal/cre_state.json");

        let mut state = CreState::default();
        state.apply_record(&record(1, Outcome::Accepted, vec![lesson("l1", 2)]));
        state.save(&path).unwrap();

        let loaded = CreState::load(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_state_load_missing_is_default() {
        let loaded = CreState::load(Path::new("/nonexistent/state.json")).unwrap();
        assert_eq!(loaded, CreState::default());
    }

    #[test]
    fn test_state_load_corrupt_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(CreState::load(&path).is_err());
    }

    #[test]
    fn test_weights_normalize_and_clamp() {
        let mut weights = ScoringWeights {
            alpha: 2.0,
            beta: 1.0,
            gamma: 0.5,
            delta: 0.5,
        };
        weights.normalize();
        let sum = weights.alpha + weights.beta + weights.gamma + weights.delta;
        assert!((sum - 1.0).abs() < 1e-9);

        weights.clamp_each();
        assert!(weights.alpha <= 0.6);
        assert!(weights.delta >= 0.1);
    }
}
