//! Outcome resolution for pending interventions.
//!
//! Each pending record is judged against the file-save stream that
//! followed it. The priority order is strict: `reversed_fast`, then
//! `reworked`, then `accepted`, then `indeterminate`; a rework whose
//! content happens to match a prior hash inside the 5-save window is
//! classified `reversed_fast` by design.

use crate::cre::log::{InterventionLog, InterventionRecord, Outcome, OutcomeSignals};
use crate::error::Result;
use crate::evidence::{ActivityRecord, BurstRecord};
use crate::store::SnapshotIndex;
use tracing::debug;

/// Save events inspected for a hash reversal.
const REVERSAL_WINDOW_EVENTS: usize = 5;

/// Rework window after the intervention.
const REWORK_WINDOW_MS: i64 = 60 * 60 * 1000;

/// Absolute line-churn threshold for a rework.
const REWORK_LINES: u32 = 50;

/// Relative churn threshold for a rework.
const REWORK_FRACTION: f64 = 0.15;

/// Idle time on the file that counts as acceptance.
const ACCEPT_IDLE_MS: i64 = 60 * 60 * 1000;

/// Global quiet time that counts as a stable session end.
const SESSION_STABLE_MS: i64 = 20 * 60 * 1000;

/// Quiet time after a commit that counts as acceptance.
const COMMIT_QUIET_MS: i64 = 15 * 60 * 1000;

/// Elapsed time after which an unresolved intervention goes
/// indeterminate.
const INDETERMINATE_MS: i64 = 120 * 60 * 1000;

/// Bursts inspected for the refactor-storm heuristic.
const STORM_WINDOW: usize = 10;

/// Refactor bursts within the window that trip the storm.
const STORM_REFACTOR_MIN: usize = 6;

/// Average events per burst above which the storm can trip.
const STORM_AVG_EVENTS: f64 = 4.0;

/// A commit observed in the command history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    /// Epoch-ms commit timestamp.
    pub t: i64,
    /// Files believed to be included.
    pub files: Vec<String>,
}

/// Everything the resolver needs to judge one record.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// Full activity stream (any order; filtered per record).
    pub saves: &'a [ActivityRecord],
    /// Observed commits.
    pub commits: &'a [CommitEvent],
    /// Latest known total line count of the target file.
    pub last_known_lines: Option<u32>,
    /// Timestamp of the latest activity across all files.
    pub last_activity_ms: Option<i64>,
    /// Current clock.
    pub now_ms: i64,
}

/// Detects a refactor storm: at least 6 refactor-pattern bursts among
/// the last 10, with an average event count above 4.
#[must_use]
pub fn is_refactor_storm(bursts: &[BurstRecord]) -> bool {
    let window: Vec<&BurstRecord> = bursts.iter().rev().take(STORM_WINDOW).collect();
    if window.is_empty() {
        return false;
    }
    let refactors = window.iter().filter(|b| b.is_refactor()).count();
    #[allow(clippy::cast_precision_loss)]
    let avg_events =
        window.iter().map(|b| f64::from(b.events_count)).sum::<f64>() / window.len() as f64;
    refactors >= STORM_REFACTOR_MIN && avg_events > STORM_AVG_EVENTS
}

/// Judges one pending record. `None` means still pending.
#[must_use]
pub fn resolve(
    record: &InterventionRecord,
    ctx: &ResolutionContext<'_>,
) -> Option<(Outcome, OutcomeSignals)> {
    let mut saves_after: Vec<&ActivityRecord> = ctx
        .saves
        .iter()
        .filter(|s| s.path == record.target_file && s.t > record.t)
        .collect();
    saves_after.sort_by_key(|s| s.t);

    let prior_hash = ctx
        .saves
        .iter()
        .filter(|s| s.path == record.target_file && s.t <= record.t)
        .max_by_key(|s| s.t)
        .map(|s| s.sha256.as_str());

    let mut signals = OutcomeSignals::default();

    // 1. Fast reversal: a content hash repeats within the next 5 saves,
    //    or returns to the pre-intervention content.
    let window = &saves_after[..saves_after.len().min(REVERSAL_WINDOW_EVENTS)];
    let mut seen: Vec<&str> = Vec::new();
    for (position, save) in window.iter().enumerate() {
        let hash = save.sha256.as_str();
        if !hash.is_empty() && (seen.contains(&hash) || prior_hash == Some(hash)) {
            signals.same_hash_event = Some(u8::try_from(position + 1).unwrap_or(u8::MAX));
            return Some((Outcome::ReversedFast, signals));
        }
        seen.push(hash);
    }

    // 2. Rework: heavy churn inside the hour.
    let churn: u32 = saves_after
        .iter()
        .filter(|s| s.t <= record.t + REWORK_WINDOW_MS)
        .map(|s| s.lines_added + s.lines_removed)
        .sum();
    if churn > 0 {
        signals.lines_changed = Some(churn);
        if let Some(lines) = ctx.last_known_lines.filter(|l| *l > 0) {
            signals.pct_of_file = Some(f64::from(churn) / f64::from(lines));
        }
        let relative_hit = signals.pct_of_file.is_some_and(|p| p >= REWORK_FRACTION);
        if churn >= REWORK_LINES || relative_hit {
            return Some((Outcome::Reworked, signals));
        }
    }

    // 3. Acceptance.
    let last_touch = saves_after.last().map_or(record.t, |s| s.t);
    let idle_on_file = ctx.now_ms - last_touch;
    if idle_on_file >= ACCEPT_IDLE_MS {
        signals.no_touch_minutes = Some(idle_on_file / 60_000);
        return Some((Outcome::Accepted, signals));
    }
    if let Some(last_activity) = ctx.last_activity_ms
        && ctx.now_ms - last_activity.max(record.t) >= SESSION_STABLE_MS
    {
        signals.session_end_stable = true;
        return Some((Outcome::Accepted, signals));
    }
    let committed = ctx.commits.iter().any(|commit| {
        commit.t >= record.t
            && commit.files.iter().any(|f| f == &record.target_file)
            && ctx.now_ms >= commit.t + COMMIT_QUIET_MS
            && !saves_after
                .iter()
                .any(|s| s.t > commit.t && s.t <= commit.t + COMMIT_QUIET_MS)
    });
    if committed {
        signals.commit_included = true;
        return Some((Outcome::Accepted, signals));
    }

    // 4. Indeterminate after two hours.
    if ctx.now_ms - record.t > INDETERMINATE_MS {
        return Some((Outcome::Indeterminate, signals));
    }

    None
}

/// Inputs for a resolution sweep over the whole log.
#[derive(Debug)]
pub struct SweepInputs<'a> {
    /// Full activity stream.
    pub saves: &'a [ActivityRecord],
    /// Observed commits.
    pub commits: &'a [CommitEvent],
    /// Recent bursts, for the storm heuristic.
    pub bursts: &'a [BurstRecord],
    /// Snapshot index, for last-known file sizes.
    pub snapshot: &'a SnapshotIndex,
    /// Current clock.
    pub now_ms: i64,
}

/// Scans pending records in file order, resolves what it can, rewrites
/// the log, and returns the resolved records for state updates.
pub fn resolve_pending(
    log: &InterventionLog,
    inputs: &SweepInputs<'_>,
) -> Result<Vec<InterventionRecord>> {
    let mut records = log.read_all()?;
    let storm = is_refactor_storm(inputs.bursts);
    let last_activity_ms = inputs.saves.iter().map(|s| s.t).max();

    let mut resolved = Vec::new();
    for record in &mut records {
        if record.outcome != Outcome::Pending {
            continue;
        }

        let last_known_lines = inputs
            .snapshot
            .latest_hash(&record.target_file)
            .and_then(|hash| inputs.snapshot.version_meta(hash))
            .map(|meta| meta.total_lines);

        let ctx = ResolutionContext {
            saves: inputs.saves,
            commits: inputs.commits,
            last_known_lines,
            last_activity_ms,
            now_ms: inputs.now_ms,
        };

        if let Some((outcome, mut signals)) = resolve(record, &ctx) {
            signals.refactor_storm = storm;
            debug!(
                id = %record.intervention_id,
                outcome = ?outcome,
                "intervention resolved"
            );
            record.outcome = outcome;
            record.outcome_resolved_at = Some(inputs.now_ms);
            record.outcome_signals = Some(signals);
            resolved.push(record.clone());
        }
    }

    if !resolved.is_empty() {
        log.rewrite_all(&records)?;
    }
    Ok(resolved)
}
