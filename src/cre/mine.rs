//! Lesson mining from the evidence streams.
//!
//! Lessons are derived observations: host-authored AVOID rules from
//! `skills.mdc`, reversals from intent chains, hotspots from save
//! counts, couplings from strong graph edges, decisions, and
//! chat-derived causal inferences. SimHash identity dedups rephrasings,
//! merging their seen-ranges.

use crate::core::{Lesson, LessonKind, WorkspacePaths};
use crate::evidence::{
    ActivityRecord, CausalLinkRecord, DecisionRecord, IntentChainRecord, read_jsonl,
};
use crate::graph::CouplingGraph;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Save count at which a file becomes a hotspot lesson.
const HOTSPOT_SAVES: usize = 10;

/// Edge weight at which a coupling becomes a lesson.
const COUPLING_LESSON_WEIGHT: f64 = 0.5;

/// Matches a trailing `(file: path)` marker on a skills rule.
fn file_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| Regex::new(r"\(file:\s*([^)]+)\)\s*$").unwrap());
    re
}

/// Extracts AVOID lessons from the host-authored rules file.
///
/// Only lines starting with `AVOID:` are rules; everything else in
/// `skills.mdc` is free text and ignored.
#[must_use]
pub fn avoid_lessons(skills_text: &str, now_ms: i64) -> Vec<Lesson> {
    skills_text
        .lines()
        .filter_map(|line| {
            let rule = line.trim().strip_prefix("AVOID:")?.trim();
            if rule.is_empty() {
                return None;
            }
            let (text, origin) = match file_marker().captures(rule) {
                Some(caps) => (
                    rule[..caps.get(0).map_or(rule.len(), |m| m.start())]
                        .trim()
                        .to_string(),
                    caps[1].trim().to_string(),
                ),
                None => (rule.to_string(), String::new()),
            };
            Some(Lesson::new(LessonKind::Avoid, text, origin).seen(now_ms, now_ms))
        })
        .collect()
}

/// Mines the full lesson set for a workspace.
#[must_use]
pub fn mine_lessons(paths: &WorkspacePaths, graph: &CouplingGraph, now_ms: i64) -> Vec<Lesson> {
    let mut lessons: Vec<Lesson> = Vec::new();

    // Host-authored avoid rules.
    if let Ok(text) = std::fs::read_to_string(paths.skills_mdc()) {
        lessons.extend(avoid_lessons(&text, now_ms));
    }

    // Reversals from intent chains.
    let chains: Vec<IntentChainRecord> = read_jsonl(&paths.intent_chains_stream());
    for record in &chains {
        if record
            .intent_signal
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("revert"))
        {
            let text = format!("a change on {} was reverted shortly after landing", record.file);
            lessons.push(
                Lesson::new(LessonKind::Reversal, text, record.file.clone())
                    .seen(record.t, record.t)
                    .evidence(format!("intent_chains.jsonl@{}", record.t)),
            );
        }
    }

    // Hotspots from save counts.
    let saves: Vec<ActivityRecord> = read_jsonl(&paths.activity_stream());
    let mut per_file: BTreeMap<&str, (usize, i64, i64)> = BTreeMap::new();
    for save in &saves {
        let entry = per_file.entry(save.path.as_str()).or_insert((0, save.t, save.t));
        entry.0 += 1;
        entry.1 = entry.1.min(save.t);
        entry.2 = entry.2.max(save.t);
    }
    for (file, (count, first, last)) in per_file {
        if count >= HOTSPOT_SAVES {
            let text = format!("{file} is a hot spot ({count} recent saves)");
            lessons.push(
                Lesson::new(LessonKind::Hotspot, text, file)
                    .seen(first, last)
                    .evidence("activity.jsonl".to_string()),
            );
        }
    }

    // Couplings from strong edges.
    for edge in graph.edges() {
        if edge.weight >= COUPLING_LESSON_WEIGHT {
            let text = format!("{} usually changes together with {}", edge.a, edge.b);
            lessons.push(
                Lesson::new(LessonKind::Coupling, text, edge.a.clone())
                    .seen(now_ms, now_ms)
                    .evidence("intent_graph.json".to_string()),
            );
        }
    }

    // Decisions.
    let decisions: Vec<DecisionRecord> = read_jsonl(&paths.decisions_stream());
    for decision in &decisions {
        let origin = first_file_in(&decision.intent_text).unwrap_or_default();
        let text = format!("decided: {} → {}", decision.intent_text, decision.chosen_option);
        let t = chrono::DateTime::parse_from_rfc3339(&decision.iso_timestamp)
            .map_or(now_ms, |dt| dt.timestamp_millis());
        lessons.push(
            Lesson::new(LessonKind::Decision, text, origin)
                .seen(t, t)
                .evidence(format!("decisions.jsonl#{}", decision.id)),
        );
    }

    // Chat-derived causal inferences.
    let links: Vec<CausalLinkRecord> = read_jsonl(&paths.causal_links_stream());
    for link in &links {
        if link.inference.is_empty() {
            continue;
        }
        lessons.push(
            Lesson::new(LessonKind::Chat, link.inference.clone(), link.file.clone())
                .seen(link.t, link.t)
                .evidence(format!("causal_links.jsonl@{}", link.thread_id)),
        );
    }

    dedup_lessons(lessons)
}

/// Collapses lessons sharing an id (SimHash identity), merging seen
/// ranges and evidence references.
#[must_use]
pub fn dedup_lessons(lessons: Vec<Lesson>) -> Vec<Lesson> {
    let mut merged: Vec<Lesson> = Vec::new();
    let mut index_of: BTreeMap<String, usize> = BTreeMap::new();

    for lesson in lessons {
        if let Some(&index) = index_of.get(&lesson.id) {
            let existing = &mut merged[index];
            existing.first_seen = existing.first_seen.min(lesson.first_seen);
            existing.last_seen = existing.last_seen.max(lesson.last_seen);
            for reference in lesson.evidence_refs {
                if !existing.evidence_refs.contains(&reference) {
                    existing.evidence_refs.push(reference);
                }
            }
        } else {
            index_of.insert(lesson.id.clone(), merged.len());
            merged.push(lesson);
        }
    }
    merged
}

fn first_file_in(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| {
        Regex::new(r"[\w./-]+\.(?:ts|tsx|js|jsx|rs|py|go|java|md|json|yml|yaml|toml)\b").unwrap()
    });
    re.find(text).map(|m| m.as_str().to_string())
}
