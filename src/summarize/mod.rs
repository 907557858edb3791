//! Deterministic dashboard rebuilders.
//!
//! Pure functions from the JSONL streams to `timeline.md` and
//! `evidence.md`: same inputs, byte-identical outputs. Bursts cluster
//! into work sessions (≤30 minutes apart), sessions are enriched with
//! line counts and overlapping chat threads, and everything groups by
//! local calendar day.

pub mod evidence;
pub mod timeline;

pub use evidence::rebuild_evidence;
pub use timeline::rebuild_timeline;

use crate::core::WorkspacePaths;
use crate::error::Result;
use crate::evidence::{ActivityRecord, BurstRecord, ChatThread, read_jsonl};
use chrono::{Local, TimeZone};
use std::collections::BTreeMap;

/// Bursts this close together belong to one session.
const SESSION_GAP_MS: i64 = 30 * 60 * 1000;

/// A clustered work session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Session start (first burst).
    pub start_ms: i64,
    /// Session end (last burst start + duration).
    pub end_ms: i64,
    /// Bursts in the session, time order.
    pub bursts: Vec<BurstRecord>,
    /// Files touched, sorted.
    pub files: Vec<String>,
    /// Save events inside the session window.
    pub saves: u32,
    /// Lines added inside the window.
    pub lines_added: u32,
    /// Lines removed inside the window.
    pub lines_removed: u32,
    /// Chat threads overlapping the window, stream order.
    pub chat_threads: Vec<ChatThread>,
}

impl Session {
    /// Dominant burst pattern of the session, by count then name.
    #[must_use]
    pub fn dominant_pattern(&self) -> Option<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for burst in &self.bursts {
            if let Some(pattern) = &burst.pattern {
                *counts.entry(pattern.kind.as_str()).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(kind, _)| kind.to_string())
    }
}

/// Clusters bursts into sessions: two bursts share a session when
/// separated by at most 30 minutes.
#[must_use]
pub fn cluster_sessions(bursts: &[BurstRecord]) -> Vec<Session> {
    let mut ordered: Vec<&BurstRecord> = bursts.iter().collect();
    ordered.sort_by_key(|b| b.t);

    let mut sessions: Vec<Session> = Vec::new();
    for burst in ordered {
        #[allow(clippy::cast_possible_wrap)]
        let burst_end = burst.t + burst.duration_ms as i64;
        let extend = sessions
            .last()
            .is_some_and(|s| burst.t - s.end_ms <= SESSION_GAP_MS);

        if extend {
            #[allow(clippy::unwrap_used)]
            let session = sessions.last_mut().unwrap();
            session.end_ms = session.end_ms.max(burst_end);
            session.bursts.push(burst.clone());
        } else {
            sessions.push(Session {
                start_ms: burst.t,
                end_ms: burst_end,
                bursts: vec![burst.clone()],
                files: Vec::new(),
                saves: 0,
                lines_added: 0,
                lines_removed: 0,
                chat_threads: Vec::new(),
            });
        }
    }

    sessions
}

/// Enriches sessions with activity line counts and overlapping chat
/// threads.
pub fn enrich_sessions(
    sessions: &mut [Session],
    activity: &[ActivityRecord],
    threads: &[ChatThread],
) {
    for session in sessions.iter_mut() {
        let mut files: Vec<String> = session
            .bursts
            .iter()
            .flat_map(|b| b.files.iter().cloned())
            .collect();

        for save in activity {
            if save.t >= session.start_ms && save.t <= session.end_ms {
                session.saves += 1;
                session.lines_added += save.lines_added;
                session.lines_removed += save.lines_removed;
                files.push(save.path.clone());
            }
        }
        files.sort();
        files.dedup();
        session.files = files;

        session.chat_threads = threads
            .iter()
            .filter(|t| t.first_ms <= session.end_ms && t.last_ms >= session.start_ms)
            .cloned()
            .collect();
    }
}

/// Formats epoch milliseconds as a local calendar day.
#[must_use]
pub fn local_day(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map_or_else(|| "unknown".to_string(), |dt| dt.format("%Y-%m-%d").to_string())
}

/// Formats epoch milliseconds as a local `HH:MM` time.
#[must_use]
pub fn local_time(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map_or_else(|| "??:??".to_string(), |dt| dt.format("%H:%M").to_string())
}

/// Groups sessions by local calendar day of their start.
#[must_use]
pub fn group_by_day(sessions: Vec<Session>) -> BTreeMap<String, Vec<Session>> {
    let mut days: BTreeMap<String, Vec<Session>> = BTreeMap::new();
    for session in sessions {
        days.entry(local_day(session.start_ms)).or_default().push(session);
    }
    days
}

/// Reads the streams and rewrites both dashboards on disk.
pub fn write_dashboards(paths: &WorkspacePaths) -> Result<()> {
    let activity: Vec<ActivityRecord> = read_jsonl(&paths.activity_stream());
    let bursts: Vec<BurstRecord> = read_jsonl(&paths.sessions_stream());
    let threads: Vec<ChatThread> = read_jsonl(&paths.chat_threads_stream());

    crate::io::write_file(paths.evidence_md(), &rebuild_evidence(&activity, &bursts, &threads))?;
    crate::io::write_file(paths.timeline_md(), &rebuild_timeline(&activity, &bursts, &threads))?;
    Ok(())
}
