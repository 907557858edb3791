//! Answer formatter.
//!
//! Produces a structured, cited source bundle, never free prose and
//! never a model call. Three parts: a header line, a numbered source
//! list with adaptive snippets, and a synthesis directive with the
//! citation protocol. Output is hard-capped at ~12 KB.

pub mod related;

pub use related::related_questions;

use crate::io::find_char_boundary;
use crate::query::{Intent, QueryAnalysis};
use crate::rank::{SearchOutcome, Tier};
use std::fmt::Write;

/// Hard cap on bundle size in bytes.
const MAX_OUTPUT_BYTES: usize = 12 * 1024;

/// Bytes reserved for the synthesis block inside the cap.
const SYNTHESIS_RESERVE: usize = 700;

/// Minimum per-source budget; below this the formatter stops with a
/// "more sources" notice.
const MIN_SOURCE_BUDGET: usize = 100;

/// Fraction of the snippet budget the line selector aims to fill.
const SNIPPET_FILL: f64 = 0.8;

/// Formats the full cited bundle for a query.
#[must_use]
pub fn format_answer(
    analysis: &QueryAnalysis,
    outcome: &SearchOutcome,
    related: &[String],
) -> String {
    if analysis.terms.is_empty() {
        return "Empty query: give me at least one word to search the workspace memory for."
            .to_string();
    }

    if outcome.results.is_empty() {
        let missing = outcome
            .note
            .clone()
            .unwrap_or_else(|| "no matching evidence".to_string());
        return format!(
            "No evidence found for \"{}\": {missing}. The corpus holds {} chunks.",
            analysis.normalized, outcome.total_chunks
        );
    }

    // When confidence is high, low-tier sources only waste budget.
    let keep_low = outcome.confidence < 0.7;
    let kept: Vec<_> = outcome
        .results
        .iter()
        .filter(|r| keep_low || r.tier != Tier::Low)
        .collect();
    let dropped_low = outcome.results.len() - kept.len();

    let high = kept.iter().filter(|r| r.tier == Tier::High).count();
    let medium = kept.iter().filter(|r| r.tier == Tier::Medium).count();

    let mut out = String::new();
    let _ = writeln!(
        out,
        "## \"{}\" — intent: {} ({:.0}%), {} high / {} medium sources, confidence {}",
        analysis.normalized,
        analysis.intent,
        analysis.confidence * 100.0,
        high,
        medium,
        confidence_label(outcome.confidence),
    );
    out.push('\n');
    out.push_str("### Sources\n");

    let mut emitted = 0_usize;
    for (number, result) in kept.iter().enumerate() {
        let remaining = MAX_OUTPUT_BYTES
            .saturating_sub(out.len())
            .saturating_sub(SYNTHESIS_RESERVE);
        if remaining < MIN_SOURCE_BUDGET {
            let _ = writeln!(out, "… {} more sources available.", kept.len() - emitted);
            break;
        }

        let budget = result.tier.snippet_budget().min(remaining);
        let snippet = extract_snippet(&result.chunk.content, &analysis.terms, budget);
        let _ = writeln!(
            out,
            "[{}] {} {} ({})",
            number + 1,
            result.tier.dots(),
            result.chunk.citation.render(),
            result.chunk.meta.source,
        );
        for line in snippet.lines() {
            let _ = writeln!(out, "    {line}");
        }
        emitted += 1;
    }
    if dropped_low > 0 {
        let _ = writeln!(
            out,
            "({dropped_low} low-relevance sources omitted at this confidence.)"
        );
    }

    out.push('\n');
    out.push_str("### Synthesis\n");
    let _ = writeln!(out, "{}", synthesis_directive(analysis.intent));
    out.push_str(
        "Cite inline as [1], [2]; prefer ●●● sources; state gaps explicitly instead of guessing.\n",
    );

    if !related.is_empty() {
        out.push('\n');
        out.push_str("### Related questions\n");
        for question in related {
            let _ = writeln!(out, "- {question}");
        }
    }

    // Belt over the reserve arithmetic.
    if out.len() > MAX_OUTPUT_BYTES {
        let cut = find_char_boundary(&out, MAX_OUTPUT_BYTES);
        out.truncate(cut);
    }
    out
}

/// Intent-specific synthesis directive.
#[must_use]
pub const fn synthesis_directive(intent: Intent) -> &'static str {
    match intent {
        Intent::Why => "Reconstruct context → decision → rationale, quoting the decisive evidence.",
        Intent::How => "Lay out the implementation stepwise, in the order the sources show.",
        Intent::What => "Define the thing first, then its role and boundaries in this workspace.",
        Intent::When => "Build the chronology with explicit dates from the citations.",
        Intent::Who => "Attribute the work to threads and sessions, with their time ranges.",
        Intent::List => "Enumerate one bullet per item, each with its citation.",
        Intent::Diff => "Contrast before and after; name exactly what changed and where.",
        Intent::General => "Synthesize the sources into a direct answer.",
    }
}

fn confidence_label(confidence: f64) -> String {
    let label = if confidence >= 0.7 {
        "high"
    } else if confidence >= 0.4 {
        "medium"
    } else {
        "low"
    };
    format!("{:.0}% ({label})", confidence * 100.0)
}

/// Extracts a budgeted snippet from chunk content.
///
/// Lines are scored by query-term hits with a mild length penalty; the
/// top lines are taken with a ±1-line context window until ~80% of the
/// budget is filled, then reassembled in original order with `[…]`
/// marking elided gaps.
#[must_use]
pub fn extract_snippet(content: &str, terms: &[String], budget: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return String::new();
    }

    let mut scored: Vec<(usize, f64)> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let lower = line.to_lowercase();
            #[allow(clippy::cast_precision_loss)]
            let hits = terms.iter().filter(|t| lower.contains(t.as_str())).count() as f64;
            #[allow(clippy::cast_precision_loss)]
            let penalty = 1.0 + line.len() as f64 / 200.0;
            (index, hits / penalty)
        })
        .filter(|(_, score)| *score > 0.0)
        .collect();

    if scored.is_empty() {
        // No term hits: fall back to the head of the content.
        return head_of(content, budget);
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let target = (budget as f64 * SNIPPET_FILL) as usize;
    let mut selected: Vec<bool> = vec![false; lines.len()];
    let mut used = 0_usize;

    for (index, _) in scored {
        if used >= target {
            break;
        }
        let from = index.saturating_sub(1);
        let to = (index + 1).min(lines.len() - 1);
        for i in from..=to {
            if !selected[i] {
                selected[i] = true;
                used += lines[i].len() + 1;
            }
        }
    }

    // Reassemble in original order, eliding gaps.
    let mut out = String::new();
    let mut previous: Option<usize> = None;
    for (index, line) in lines.iter().enumerate() {
        if !selected[index] {
            continue;
        }
        if previous.is_some_and(|p| index > p + 1) {
            out.push_str("[…]\n");
        }
        out.push_str(line);
        out.push('\n');
        previous = Some(index);
    }

    if out.len() > budget {
        let cut = find_char_boundary(&out, budget);
        out.truncate(cut);
    }
    out.trim_end().to_string()
}

fn head_of(content: &str, budget: usize) -> String {
    if content.len() <= budget {
        return content.trim_end().to_string();
    }
    let cut = find_char_boundary(content, budget);
    content[..cut].trim_end().to_string()
}
