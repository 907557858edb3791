//! Causal Relevance Engine.
//!
//! Scores and selects lessons to inject before an agent edits a file,
//! logs the intervention, resolves its outcome from subsequent
//! file-save signals, and feeds per-lesson counters back into future
//! scoring. State is a pure fold over the append-only intervention log,
//! with a safety freeze on sustained outcome regression and optional
//! gated weight adaptation.

pub mod adapt;
pub mod log;
pub mod mine;
pub mod outcome;
pub mod score;
pub mod select;
pub mod state;

pub use adapt::{V2_GATE, maybe_adapt_weights};
pub use log::{
    CandidateLesson, InterventionLog, InterventionRecord, LoggedLesson, Outcome, OutcomeSignals,
    propensities,
};
pub use mine::{avoid_lessons, dedup_lessons, mine_lessons};
pub use outcome::{
    CommitEvent, ResolutionContext, SweepInputs, is_refactor_storm, resolve, resolve_pending,
};
pub use score::{AxisBreakdown, ScoredLesson, density_bucket, score_lessons};
pub use select::{
    DEFAULT_TOKEN_BUDGET, DropReason, MAX_SELECTED, RejectedLesson, SelectedLesson, Selection,
    select_lessons,
};
pub use state::{CreState, Kpis, LessonCounters, OutcomeEvent, SafetyState, ScoringWeights};
