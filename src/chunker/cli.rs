//! Shell history chunker.
//!
//! Command records are grouped by terminal session and cut into
//! fixed-size windows. Each event renders as one line:
//! `[tool] command (status [+duration]) → stdout preview`.

use crate::chunker::ms_to_iso_date;
use crate::core::{Chunk, ChunkMeta, SourceKind};
use crate::evidence::CliRecord;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Events per CLI chunk window.
pub const CLI_WINDOW_EVENTS: usize = 10;

/// Session key used when a record carries no session id.
const DEFAULT_SESSION: &str = "session";

/// Chunks CLI history into per-session fixed windows.
#[must_use]
pub fn chunk_cli(records: &[CliRecord], file: &str) -> Vec<Chunk> {
    let mut sessions: BTreeMap<&str, Vec<(usize, &CliRecord)>> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        let key = record.session_id.as_deref().unwrap_or(DEFAULT_SESSION);
        sessions.entry(key).or_default().push((index, record));
    }

    let mut chunks = Vec::new();
    for (session_id, session_records) in sessions {
        for window in session_records.chunks(CLI_WINDOW_EVENTS) {
            let content: String = window
                .iter()
                .map(|(_, r)| render_event(r))
                .collect::<Vec<_>>()
                .join("\n");

            let first_ts = window.iter().map(|(_, r)| r.t).min().unwrap_or(0);
            let last_ts = window.iter().map(|(_, r)| r.t).max().unwrap_or(0);
            let first_index = window[0].0;
            let last_index = window[window.len() - 1].0;

            let mut meta = ChunkMeta::new(SourceKind::Cli, file)
                .thread(session_id)
                .window(first_ts, last_ts);
            meta.date = ms_to_iso_date(first_ts);

            let range = format!("{session_id}:{first_index}-{last_index}");
            chunks.push(Chunk::new(content, meta, &range));
        }
    }
    chunks
}

/// Renders one command event as a single line.
fn render_event(record: &CliRecord) -> String {
    let mut line = format!("[{}] {}", record.tool, record.command);

    let status = match record.exit_code {
        Some(0) => "ok".to_string(),
        Some(code) => format!("exit {code}"),
        None => "?".to_string(),
    };
    let _ = write!(line, " ({status}");
    if let Some(ms) = record.duration_ms {
        let _ = write!(line, " +{}", format_duration(ms));
    }
    line.push(')');

    if let Some(preview) = &record.stdout_preview {
        let first = preview.lines().next().unwrap_or("");
        if !first.is_empty() {
            let _ = write!(line, " → {first}");
        }
    }
    line
}

#[allow(clippy::cast_precision_loss)]
fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}
