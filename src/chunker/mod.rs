//! Per-source chunkers.
//!
//! Every evidence source is turned into uniformly-shaped [`Chunk`]s by a
//! deterministic segmentation rule, so re-running a chunker on the same
//! input yields byte-identical chunks and ids:
//!
//! - **Dashboard**: split at box-drawing section headers
//! - **Timeline**: split at heading levels (`##`, `### date`, `#### time`)
//! - **Decisions**: one chunk per record
//! - **Chat**: per-thread byte-budget accumulator
//! - **CLI**: per-session fixed windows
//! - **Code**: semantic split-points with a fixed-window fallback

pub mod chat;
pub mod cli;
pub mod code;
pub mod dashboard;

pub use chat::{CHAT_BYTE_BUDGET, CHAT_MESSAGE_CAP, chunk_chat, chunk_chat_with};
pub use cli::{CLI_WINDOW_EVENTS, chunk_cli};
pub use code::{SMALL_FILE_LINES, chunk_code};
pub use dashboard::{chunk_dashboard, chunk_timeline};

use crate::core::{Chunk, ChunkMeta, SourceKind};
use crate::evidence::DecisionRecord;
use chrono::{TimeZone, Utc};

/// Closed tag set recognized in evidence text.
pub const TAGS: &[&str] = &[
    "FIX", "FEAT", "ARCH", "REFACTOR", "TEST", "DOCS", "PERF", "BUG",
];

/// Converts epoch milliseconds to an ISO-8601 date (`YYYY-MM-DD`).
#[must_use]
pub fn ms_to_iso_date(ms: i64) -> Option<String> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Finds the first closed-set tag in a text, if any.
#[must_use]
pub fn detect_tag(text: &str) -> Option<String> {
    TAGS.iter()
        .filter_map(|tag| text.find(tag).map(|pos| (pos, *tag)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, tag)| tag.to_string())
}

/// One chunk per decision record.
///
/// Content is the compact `intent → chosen_option (timestamp)` line the
/// retrieval side expects; the record id is the chunk range so identical
/// decisions in different records stay distinct.
#[must_use]
pub fn chunk_decisions(records: &[DecisionRecord], file: &str) -> Vec<Chunk> {
    records
        .iter()
        .map(|record| {
            let content = format!(
                "{} → {} ({})",
                record.intent_text, record.chosen_option, record.iso_timestamp
            );
            let date = record.iso_timestamp.get(..10).map(ToString::to_string);
            let mut meta = ChunkMeta::new(SourceKind::Decisions, file);
            meta.date = date;
            meta.tag = detect_tag(&record.intent_text);
            meta.thread_id.clone_from(&record.thread_id);
            Chunk::new(content, meta, &record.id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(id: &str, intent: &str, option: &str, iso: &str) -> DecisionRecord {
        DecisionRecord {
            id: id.to_string(),
            intent_text: intent.to_string(),
            chosen_option: option.to_string(),
            confidence_gate: Some(0.8),
            iso_timestamp: iso.to_string(),
            thread_id: None,
        }
    }

    #[test]
    fn test_decisions_one_chunk_per_record() {
        let records = vec![
            decision("d1", "pick a queue", "redis streams", "2026-07-01T10:00:00Z"),
            decision("d2", "FIX flaky retry test", "add jitter", "2026-07-02T09:30:00Z"),
        ];
        let chunks = chunk_decisions(&records, ".rl4/evidence/decisions.jsonl");

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "pick a queue → redis streams (2026-07-01T10:00:00Z)");
        assert_eq!(chunks[0].meta.date.as_deref(), Some("2026-07-01"));
        assert_eq!(chunks[1].meta.tag.as_deref(), Some("FIX"));
    }

    #[test]
    fn test_decisions_stable_ids() {
        let records = vec![decision("d1", "a", "b", "2026-07-01T10:00:00Z")];
        let once = chunk_decisions(&records, "f");
        let twice = chunk_decisions(&records, "f");
        assert_eq!(once[0].id, twice[0].id);
    }

    #[test]
    fn test_decisions_same_text_different_record_ids() {
        let records = vec![
            decision("d1", "a", "b", "2026-07-01T10:00:00Z"),
            decision("d2", "a", "b", "2026-07-01T10:00:00Z"),
        ];
        let chunks = chunk_decisions(&records, "f");
        assert_ne!(chunks[0].id, chunks[1].id);
    }

    #[test]
    fn test_ms_to_iso_date() {
        // 2026-07-01T00:00:00Z
        assert_eq!(ms_to_iso_date(1_782_864_000_000).as_deref(), Some("2026-07-01"));
    }

    #[test]
    fn test_detect_tag_first_occurrence() {
        assert_eq!(detect_tag("BUG then FIX").as_deref(), Some("BUG"));
        assert_eq!(detect_tag("nothing here"), None);
    }
}
