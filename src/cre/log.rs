//! Append-only intervention log.
//!
//! Every non-empty selection appends one complete JSONL record with a
//! normalized propensity vector; empty selections are never logged.
//! Appends write the whole line in one call so a crash leaves at most a
//! partial final line, which readers tolerate. Mid-file corruption, by
//! contrast, is a hard error: replay correctness depends on it.

use crate::core::LessonKind;
use crate::cre::score::AxisBreakdown;
use crate::cre::select::{DropReason, Selection};
use crate::error::{CreError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Intervention outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Not yet resolved.
    Pending,
    /// The same content hash reappeared shortly after the edit.
    ReversedFast,
    /// The file was substantially rewritten within the hour.
    Reworked,
    /// The edit stuck.
    Accepted,
    /// Too much time passed to tell.
    Indeterminate,
}

/// A selected lesson as logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedLesson {
    /// Lesson id.
    pub id: String,
    /// Lesson type.
    #[serde(rename = "type")]
    pub kind: LessonKind,
    /// Final score including the info-gain term.
    pub score: f64,
    /// Selection rank, 1-based.
    pub rank: usize,
    /// Score per token.
    pub density: f64,
    /// Quantized density bucket.
    pub density_bucket: u8,
    /// Per-axis breakdown.
    pub axes: AxisBreakdown,
}

/// A rejected candidate as logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLesson {
    /// Lesson id.
    pub id: String,
    /// Lesson type.
    #[serde(rename = "type")]
    pub kind: LessonKind,
    /// Base score at selection time.
    pub score: f64,
    /// Score per token.
    pub density: f64,
    /// Quantized density bucket.
    pub density_bucket: u8,
    /// Why it was dropped.
    pub drop_reason: DropReason,
}

/// Signals gathered while resolving an outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSignals {
    /// Position (1-based) of the repeated hash inside the 5-save window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_hash_event: Option<u8>,
    /// Lines added + removed within the rework window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_changed: Option<u32>,
    /// Change as a fraction of the last-known file size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct_of_file: Option<f64>,
    /// Minutes without a touch on the target file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_touch_minutes: Option<i64>,
    /// Whether the session ended stably with no further activity.
    #[serde(default)]
    pub session_end_stable: bool,
    /// Whether a commit included the file.
    #[serde(default)]
    pub commit_included: bool,
    /// Whether the outcome landed during a refactor storm.
    #[serde(default)]
    pub refactor_storm: bool,
}

/// One append-only log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    /// Intervention id.
    pub intervention_id: String,
    /// Engine version that produced the record.
    pub engine_version: String,
    /// Epoch-ms intervention timestamp.
    pub t: i64,
    /// File the intervention targeted.
    pub target_file: String,
    /// Burst the edit belongs to, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_id: Option<String>,
    /// Selected lessons, rank order.
    pub selected: Vec<LoggedLesson>,
    /// Rejected candidates with drop reasons.
    #[serde(default)]
    pub candidates: Vec<CandidateLesson>,
    /// Token budget of the selection.
    pub token_budget: usize,
    /// Tokens used by the selection.
    pub used_tokens: usize,
    /// Current outcome.
    pub outcome: Outcome,
    /// Epoch-ms of outcome resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_resolved_at: Option<i64>,
    /// Resolution signals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_signals: Option<OutcomeSignals>,
    /// Normalized propensity per selected lesson, summing to 1.
    pub pi_log: Vec<f64>,
}

/// Normalized propensities over the selected set.
///
/// Scores come from selection; when every score is zero the vector
/// falls back to uniform `1/|selected|`. Entries are always in (0, 1]
/// and sum to 1.
#[must_use]
pub fn propensities(selection: &Selection) -> Vec<f64> {
    let count = selection.selected.len();
    if count == 0 {
        return Vec::new();
    }

    let total: f64 = selection.selected.iter().map(|s| s.scored.score).sum();
    if total <= 0.0 {
        #[allow(clippy::cast_precision_loss)]
        let uniform = 1.0 / count as f64;
        return vec![uniform; count];
    }
    selection
        .selected
        .iter()
        .map(|s| s.scored.score / total)
        .collect()
}

/// The append-only intervention log.
#[derive(Debug, Clone)]
pub struct InterventionLog {
    path: PathBuf,
}

impl InterventionLog {
    /// Creates a log handle for a path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Builds and appends a record for a selection.
    ///
    /// Returns `None` without touching the log when the selection is
    /// empty (integrity guard).
    pub fn append(
        &self,
        selection: &Selection,
        target_file: &str,
        burst_id: Option<&str>,
        now_ms: i64,
    ) -> Result<Option<InterventionRecord>> {
        if selection.is_empty() {
            debug!(target_file, "skipping empty selection");
            return Ok(None);
        }

        let pi_log = propensities(selection);
        let selected: Vec<LoggedLesson> = selection
            .selected
            .iter()
            .map(|s| LoggedLesson {
                id: s.scored.lesson.id.clone(),
                kind: s.scored.lesson.kind,
                score: s.scored.score,
                rank: s.rank,
                density: s.scored.density,
                density_bucket: s.scored.density_bucket,
                axes: s.scored.axes,
            })
            .collect();
        let candidates: Vec<CandidateLesson> = selection
            .candidates
            .iter()
            .map(|c| CandidateLesson {
                id: c.scored.lesson.id.clone(),
                kind: c.scored.lesson.kind,
                score: c.scored.score,
                density: c.scored.density,
                density_bucket: c.scored.density_bucket,
                drop_reason: c.drop_reason,
            })
            .collect();

        let record = InterventionRecord {
            intervention_id: intervention_id(target_file, &selected, now_ms),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            t: now_ms,
            target_file: target_file.to_string(),
            burst_id: burst_id.map(ToString::to_string),
            selected,
            candidates,
            token_budget: selection.token_budget,
            used_tokens: selection.used_tokens,
            outcome: Outcome::Pending,
            outcome_resolved_at: None,
            outcome_signals: None,
            pi_log,
        };

        self.append_record(&record)?;
        Ok(Some(record))
    }

    /// Appends an already-built record as one full line.
    pub fn append_record(&self, record: &InterventionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let mut line =
            serde_json::to_string(record).map_err(|e| CreError::Encoding(e.to_string()))?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        // One write for the whole line: a crash can only truncate the
        // tail, never interleave.
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Reads all records in file order.
    ///
    /// A partial final line (in-flight append) is tolerated; malformed
    /// interior lines are a hard error.
    pub fn read_all(&self) -> Result<Vec<InterventionRecord>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e).into()),
        };

        let lines: Vec<&str> = text.lines().collect();
        let mut records = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InterventionRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if index == lines.len() - 1 => {
                    debug!(error = %e, "ignoring partial final log line");
                }
                Err(e) => {
                    return Err(CreError::Encoding(format!(
                        "corrupt record at line {}: {e}",
                        index + 1
                    ))
                    .into());
                }
            }
        }
        Ok(records)
    }

    /// Replaces the whole log atomically (write temp file, rename).
    ///
    /// Used by the outcome resolver's read-modify-write cycle.
    pub fn rewrite_all(&self, records: &[InterventionRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let mut body = String::new();
        for record in records {
            body.push_str(
                &serde_json::to_string(record).map_err(|e| CreError::Encoding(e.to_string()))?,
            );
            body.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn io_error(&self, e: std::io::Error) -> CreError {
        CreError::LogIo {
            path: self.path.to_string_lossy().to_string(),
            reason: e.to_string(),
        }
    }
}

/// Deterministic intervention id from timestamp, target, and selection.
fn intervention_id(target_file: &str, selected: &[LoggedLesson], now_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(now_ms.to_le_bytes());
    hasher.update(target_file.as_bytes());
    for lesson in selected {
        hasher.update([0x1f]);
        hasher.update(lesson.id.as_bytes());
    }
    let digest = hasher.finalize();
    let mut suffix = String::with_capacity(12);
    for byte in &digest[..6] {
        suffix.push_str(&format!("{byte:02x}"));
    }
    format!("iv-{now_ms}-{suffix}")
}
