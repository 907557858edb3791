//! Aggregated evidence dashboard renderer.
//!
//! Renders `evidence.md`: ASCII box sections with an activity overview,
//! a hot-file table with progress bars, and a session summary. The box
//! headers are the split points the dashboard chunker keys on.

use crate::evidence::{ActivityRecord, BurstRecord, ChatThread};
use crate::summarize::{cluster_sessions, enrich_sessions, local_day};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Inner width of a box section.
const BOX_WIDTH: usize = 46;

/// Maximum progress-bar length.
const BAR_WIDTH: usize = 20;

fn box_header(title: &str) -> String {
    let dashes = BOX_WIDTH.saturating_sub(title.chars().count() + 6).max(1);
    format!("┌─── {title} {}┐", "─".repeat(dashes))
}

fn box_footer() -> String {
    format!("└{}┘", "─".repeat(BOX_WIDTH))
}

fn progress_bar(value: u32, max: u32) -> String {
    if max == 0 {
        return String::new();
    }
    let filled = ((value as usize) * BAR_WIDTH).div_ceil(max as usize).min(BAR_WIDTH);
    "█".repeat(filled.max(1))
}

/// Rebuilds the aggregated dashboard from the evidence streams.
#[must_use]
pub fn rebuild_evidence(
    activity: &[ActivityRecord],
    bursts: &[BurstRecord],
    threads: &[ChatThread],
) -> String {
    let mut out = String::from("# Evidence\n\n");

    // Per-file aggregates.
    let mut per_file: BTreeMap<&str, (u32, u32, u32)> = BTreeMap::new();
    let mut total_added = 0_u32;
    let mut total_removed = 0_u32;
    for save in activity {
        let entry = per_file.entry(save.path.as_str()).or_default();
        entry.0 += 1;
        entry.1 += save.lines_added;
        entry.2 += save.lines_removed;
        total_added += save.lines_added;
        total_removed += save.lines_removed;
    }

    out.push_str(&box_header("ACTIVITY OVERVIEW"));
    out.push('\n');
    let _ = writeln!(
        out,
        "  {} saves · {} files · +{total_added}/-{total_removed} lines",
        activity.len(),
        per_file.len(),
    );
    if let (Some(first), Some(last)) = (
        activity.iter().map(|s| s.t).min(),
        activity.iter().map(|s| s.t).max(),
    ) {
        let _ = writeln!(out, "  span: {} → {}", local_day(first), local_day(last));
    }
    out.push_str(&box_footer());
    out.push_str("\n\n");

    // Hot files, by save count then path.
    let mut ranked: Vec<(&str, (u32, u32, u32))> = per_file.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then_with(|| a.0.cmp(b.0)));
    let max_saves = ranked.first().map_or(0, |(_, (saves, _, _))| *saves);

    out.push_str(&box_header("HOT FILES"));
    out.push('\n');
    if ranked.is_empty() {
        out.push_str("  no activity recorded\n");
    }
    for (path, (saves, added, removed)) in ranked.iter().take(10) {
        let _ = writeln!(
            out,
            "  {path}  {} {saves} saves (+{added}/-{removed})",
            progress_bar(*saves, max_saves),
        );
    }
    out.push_str(&box_footer());
    out.push_str("\n\n");

    // Sessions.
    let mut sessions = cluster_sessions(bursts);
    enrich_sessions(&mut sessions, activity, threads);

    out.push_str(&box_header("WORK SESSIONS"));
    out.push('\n');
    if sessions.is_empty() {
        out.push_str("  no sessions recorded\n");
    }
    for session in &sessions {
        let pattern = session
            .dominant_pattern()
            .unwrap_or_else(|| "mixed".to_string());
        let _ = writeln!(
            out,
            "  {} [{}] {} files · {} saves · +{}/-{} · {} chats",
            local_day(session.start_ms),
            pattern,
            session.files.len(),
            session.saves,
            session.lines_added,
            session.lines_removed,
            session.chat_threads.len(),
        );
    }
    out.push_str(&box_footer());
    out.push('\n');

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::tests::{burst, save};

    #[test]
    fn test_evidence_round_trip_scenario() {
        // Three saves on src/a.ts at 10:00, 10:05, 10:20 with +10/-2
        // each, empty sessions: the dashboard reports 3 saves and
        // +30/-6 net lines.
        let base = 1_782_900_000_000_i64;
        let activity = vec![
            save(base, "src/a.ts", 10, 2),
            save(base + 5 * 60_000, "src/a.ts", 10, 2),
            save(base + 20 * 60_000, "src/a.ts", 10, 2),
        ];

        let text = rebuild_evidence(&activity, &[], &[]);
        assert!(text.contains("3 saves · 1 files · +30/-6 lines"));
        assert!(text.contains("src/a.ts"));
        assert!(text.contains("3 saves (+30/-6)"));
        assert!(text.contains("no sessions recorded"));
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let activity = vec![save(1, "b.ts", 1, 0), save(2, "a.ts", 2, 1)];
        let bursts = vec![burst("b1", 1, 60_000, &["a.ts"])];
        let first = rebuild_evidence(&activity, &bursts, &[]);
        let second = rebuild_evidence(&activity, &bursts, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_sections_are_chunkable_headers() {
        let text = rebuild_evidence(&[], &[], &[]);
        let chunks = crate::chunker::chunk_dashboard(&text, ".rl4/evidence.md");
        let sections: Vec<&str> = chunks
            .iter()
            .filter_map(|c| c.meta.section.as_deref())
            .collect();
        assert!(sections.contains(&"ACTIVITY OVERVIEW"));
        assert!(sections.contains(&"HOT FILES"));
        assert!(sections.contains(&"WORK SESSIONS"));
    }

    #[test]
    fn test_hot_files_ranked_and_barred() {
        let activity = vec![
            save(1, "busy.ts", 1, 0),
            save(2, "busy.ts", 1, 0),
            save(3, "busy.ts", 1, 0),
            save(4, "calm.ts", 1, 0),
        ];
        let text = rebuild_evidence(&activity, &[], &[]);

        let busy_pos = text.find("busy.ts").unwrap();
        let calm_pos = text.find("calm.ts").unwrap();
        assert!(busy_pos < calm_pos);
        assert!(text.contains('█'));
    }

    #[test]
    fn test_sessions_enriched_in_dashboard() {
        let activity = vec![save(60_000, "a.ts", 5, 1)];
        let bursts = vec![burst("b1", 0, 5 * 60_000, &["a.ts"])];
        let text = rebuild_evidence(&activity, &bursts, &[]);
        assert!(text.contains("1 files · 1 saves · +5/-1 · 0 chats"));
    }
}
