//! Gated weight adaptation from resolved interventions.
//!
//! Once at least 100 interventions have resolved, a doubly-robust
//! estimate per axis nudges the scoring weights: observed reward minus
//! a weak prior, importance-weighted by the clipped logged propensity,
//! plus the prior term. The estimate here is averaged over records
//! rather than summed, which keeps the step size sane; the gate, the
//! clip interval, and the final normalize+clamp are the load-bearing
//! invariants.

use crate::cre::log::{InterventionRecord, Outcome};
use crate::cre::state::CreState;
use tracing::info;

/// Resolved interventions required before adaptation activates.
pub const V2_GATE: u32 = 100;

/// Propensity clip bounds.
const PI_CLIP: (f64, f64) = (0.05, 0.95);

/// Weak prior on the expected reward.
const MU_HAT: f64 = 0.7;

/// Reward for an outcome; `None` for outcomes that carry no signal.
fn reward(outcome: Outcome) -> Option<f64> {
    match outcome {
        Outcome::Accepted => Some(1.0),
        Outcome::Reworked => Some(0.3),
        Outcome::ReversedFast => Some(0.0),
        Outcome::Pending | Outcome::Indeterminate => None,
    }
}

/// Average per-axis signal of a record's selected lessons.
fn avg_signals(record: &InterventionRecord) -> Option<[f64; 4]> {
    if record.selected.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = record.selected.len() as f64;
    let mut sums = [0.0_f64; 4];
    for lesson in &record.selected {
        sums[0] += lesson.axes.causal_proximity;
        sums[1] += lesson.axes.counterfactual;
        sums[2] += lesson.axes.temporal;
        sums[3] += lesson.axes.info_gain;
    }
    Some([sums[0] / n, sums[1] / n, sums[2] / n, sums[3] / n])
}

/// Mean clipped propensity of a record.
fn clipped_propensity(record: &InterventionRecord) -> f64 {
    if record.pi_log.is_empty() {
        return PI_CLIP.1;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = record.pi_log.iter().sum::<f64>() / record.pi_log.len() as f64;
    mean.clamp(PI_CLIP.0, PI_CLIP.1)
}

/// Runs weight adaptation if the gate is met.
///
/// Returns `true` when the weights were updated. Never runs while the
/// safety guard is frozen.
pub fn maybe_adapt_weights(state: &mut CreState, records: &[InterventionRecord], now_ms: i64) -> bool {
    if state.safety.frozen {
        return false;
    }

    let usable: Vec<(&InterventionRecord, f64, [f64; 4])> = records
        .iter()
        .filter_map(|record| {
            let y = reward(record.outcome)?;
            let signals = avg_signals(record)?;
            Some((record, y, signals))
        })
        .collect();

    let resolved = records
        .iter()
        .filter(|r| !matches!(r.outcome, Outcome::Pending))
        .count();
    if resolved < V2_GATE as usize {
        return false;
    }
    if usable.is_empty() {
        return false;
    }

    if state.v2_activated_at.is_none() {
        info!(resolved, "weight adaptation activated");
        state.v2_activated_at = Some(now_ms);
    }

    #[allow(clippy::cast_precision_loss)]
    let n = usable.len() as f64;
    let mut dr = [0.0_f64; 4];
    for (record, y, signals) in &usable {
        let pi = clipped_propensity(record);
        for (axis, signal) in signals.iter().enumerate() {
            dr[axis] += ((y - MU_HAT) * signal / pi + MU_HAT * signal) / n;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let learning_rate = 0.1 / (n / f64::from(V2_GATE)).sqrt();

    let weights = &mut state.weights;
    weights.alpha += learning_rate * dr[0];
    weights.beta += learning_rate * dr[1];
    weights.gamma += learning_rate * dr[2];
    weights.delta += learning_rate * dr[3];

    weights.normalize();
    weights.clamp_each();
    info!(
        alpha = weights.alpha,
        beta = weights.beta,
        gamma = weights.gamma,
        delta = weights.delta,
        "weights adapted"
    );
    true
}
