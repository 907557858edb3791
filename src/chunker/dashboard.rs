//! Dashboard and timeline chunkers.
//!
//! `evidence.md` is segmented at box-drawing section headers;
//! `timeline.md` at second-level headings, date sub-headings, and
//! time-range sub-sub-headings.

use crate::chunker::detect_tag;
use crate::core::{Chunk, ChunkMeta, SourceKind};
use regex::Regex;
use std::sync::OnceLock;

/// Matches a box-drawing section header such as
/// `┌─── HOT FILES ───────┐` and captures the section name.
fn box_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| Regex::new(r"^┌─+\s*(.+?)\s*─+┐\s*$").unwrap());
    re
}

/// Matches a second-level heading and captures its text.
fn h2_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| Regex::new(r"^##\s+(.+?)\s*$").unwrap());
    re
}

/// Matches a date sub-heading (`### 2026-07-01`).
fn date_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| Regex::new(r"^###\s+(\d{4}-\d{2}-\d{2})\s*$").unwrap());
    re
}

/// Matches a time-range sub-sub-heading (`#### 09:30` or `#### 09:30–11:00`).
fn time_heading() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| Regex::new(r"^####\s+(\d{2}:\d{2}.*?)\s*$").unwrap());
    re
}

struct SectionAccumulator<'a> {
    file: &'a str,
    source: SourceKind,
    chunks: Vec<Chunk>,
    lines: Vec<&'a str>,
    section: Option<String>,
    date: Option<String>,
    start_line: u32,
    current_line: u32,
}

impl<'a> SectionAccumulator<'a> {
    fn new(file: &'a str, source: SourceKind) -> Self {
        Self {
            file,
            source,
            chunks: Vec::new(),
            lines: Vec::new(),
            section: None,
            date: None,
            start_line: 1,
            current_line: 0,
        }
    }

    fn push_line(&mut self, line: &'a str) {
        if self.lines.is_empty() {
            self.start_line = self.current_line;
        }
        self.lines.push(line);
    }

    fn flush(&mut self) {
        let content = self.lines.join("\n");
        if content.trim().is_empty() {
            self.lines.clear();
            return;
        }

        let end_line =
            self.start_line + u32::try_from(self.lines.len().saturating_sub(1)).unwrap_or(0);
        let mut meta =
            ChunkMeta::new(self.source, self.file).lines(self.start_line, end_line);
        meta.section.clone_from(&self.section);
        meta.date.clone_from(&self.date);
        meta.tag = detect_tag(&content);

        let range = format!(
            "{}:L{}-L{}",
            self.section.as_deref().unwrap_or("-"),
            self.start_line,
            end_line
        );
        self.chunks.push(Chunk::new(content, meta, &range));
        self.lines.clear();
    }
}

/// Chunks the aggregated dashboard at box-drawing section headers.
///
/// Each section, including its header line, becomes one chunk whose
/// section metadata is the header's name. Text before the first header
/// forms a preamble chunk.
#[must_use]
pub fn chunk_dashboard(content: &str, file: &str) -> Vec<Chunk> {
    let mut acc = SectionAccumulator::new(file, SourceKind::Evidence);

    for line in content.lines() {
        acc.current_line += 1;
        if let Some(caps) = box_header().captures(line) {
            acc.flush();
            acc.section = Some(caps[1].to_string());
        }
        acc.push_line(line);
    }
    acc.flush();
    acc.chunks
}

/// Chunks the timeline journal at `##`, `### date`, and `#### time`
/// headings.
///
/// Date headings set the chunk date; time headings inherit the date of
/// the enclosing day.
#[must_use]
pub fn chunk_timeline(content: &str, file: &str) -> Vec<Chunk> {
    let mut acc = SectionAccumulator::new(file, SourceKind::Timeline);

    for line in content.lines() {
        acc.current_line += 1;
        if let Some(caps) = h2_heading().captures(line) {
            acc.flush();
            acc.section = Some(caps[1].to_string());
            acc.date = None;
        } else if let Some(caps) = date_heading().captures(line) {
            acc.flush();
            let date = caps[1].to_string();
            acc.section = Some(date.clone());
            acc.date = Some(date);
        } else if let Some(caps) = time_heading().captures(line) {
            acc.flush();
            // Keep the day's date; narrow the section to the time range.
            let time = caps[1].to_string();
            acc.section = Some(match &acc.date {
                Some(date) => format!("{date} {time}"),
                None => time,
            });
        }
        acc.push_line(line);
    }
    acc.flush();
    acc.chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    const DASHBOARD: &str = "\
# Evidence

┌─── ACTIVITY OVERVIEW ──────────┐
12 saves across 4 files
└────────────────────────────────┘

┌─── HOT FILES ──────────────────┐
src/index.ts  ████████ 8
src/api.ts    ███ 3
└────────────────────────────────┘
";

    #[test]
    fn test_dashboard_sections() {
        let chunks = chunk_dashboard(DASHBOARD, ".rl4/evidence.md");
        assert_eq!(chunks.len(), 3);

        // Preamble before the first header.
        assert!(chunks[0].content.starts_with("# Evidence"));
        assert_eq!(chunks[0].meta.section, None);

        assert_eq!(chunks[1].meta.section.as_deref(), Some("ACTIVITY OVERVIEW"));
        assert!(chunks[1].content.contains("12 saves"));

        assert_eq!(chunks[2].meta.section.as_deref(), Some("HOT FILES"));
        assert!(chunks[2].content.contains("src/index.ts"));
    }

    #[test]
    fn test_dashboard_deterministic_ids() {
        let a = chunk_dashboard(DASHBOARD, ".rl4/evidence.md");
        let b = chunk_dashboard(DASHBOARD, ".rl4/evidence.md");
        let ids_a: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_dashboard_empty() {
        assert!(chunk_dashboard("", "f").is_empty());
        assert!(chunk_dashboard("\n\n", "f").is_empty());
    }

    const TIMELINE: &str = "\
# Timeline

## Week 27

### 2026-07-01

#### 09:30–10:15
Worked on the retry logic, FIX for the flaky test.

#### 14:00
Refactored the cache layer.

### 2026-07-02
Quiet day, one doc tweak.
";

    #[test]
    fn test_timeline_heading_hierarchy() {
        let chunks = chunk_timeline(TIMELINE, ".rl4/timeline.md");
        let sections: Vec<Option<&str>> =
            chunks.iter().map(|c| c.meta.section.as_deref()).collect();

        assert_eq!(
            sections,
            vec![
                None,
                Some("Week 27"),
                Some("2026-07-01"),
                Some("2026-07-01 09:30–10:15"),
                Some("2026-07-01 14:00"),
                Some("2026-07-02"),
            ]
        );
    }

    #[test]
    fn test_timeline_dates_inherited_by_time_chunks() {
        let chunks = chunk_timeline(TIMELINE, ".rl4/timeline.md");
        let morning = chunks
            .iter()
            .find(|c| c.content.contains("retry logic"))
            .unwrap();
        assert_eq!(morning.meta.date.as_deref(), Some("2026-07-01"));
        assert_eq!(morning.meta.tag.as_deref(), Some("FIX"));

        let next_day = chunks.iter().find(|c| c.content.contains("Quiet day")).unwrap();
        assert_eq!(next_day.meta.date.as_deref(), Some("2026-07-02"));
    }

    #[test]
    fn test_timeline_line_ranges() {
        let chunks = chunk_timeline(TIMELINE, ".rl4/timeline.md");
        for chunk in &chunks {
            let (start, end) = chunk.meta.line_range.unwrap();
            assert!(start >= 1);
            assert!(end >= start);
        }
    }

    #[test]
    fn test_timeline_new_week_clears_date() {
        let text = "### 2026-07-01\nday\n## Next Week\nno date here\n";
        let chunks = chunk_timeline(text, "f");
        let last = chunks.last().unwrap();
        assert_eq!(last.meta.date, None);
    }
}
