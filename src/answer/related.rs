//! Related-question generator.
//!
//! Composes at most five follow-up questions from the result set:
//! filenames, tags, the latest date, section names, cross-exploration
//! into absent source kinds, and an intent-typed template around an
//! extracted topic. Deduplicated, first occurrence wins.

use crate::core::SourceKind;
use crate::query::{Intent, QueryAnalysis, tokenize};
use crate::rank::SearchOutcome;
use std::collections::{BTreeMap, HashSet};

/// Maximum related questions.
pub const MAX_RELATED: usize = 5;

/// Minimum joined length for a topic bigram.
const MIN_BIGRAM_LEN: usize = 8;

/// Minimum occurrences for a topic bigram.
const MIN_BIGRAM_COUNT: usize = 2;

/// Builds the related-question list for a result set.
#[must_use]
pub fn related_questions(analysis: &QueryAnalysis, outcome: &SearchOutcome) -> Vec<String> {
    let mut questions: Vec<String> = Vec::new();
    let mut push = |question: String, questions: &mut Vec<String>| {
        if questions.len() < MAX_RELATED && !questions.contains(&question) {
            questions.push(question);
        }
    };

    // (a) Filenames of the top chunks.
    for result in outcome.results.iter().take(2) {
        let file = &result.chunk.meta.file;
        if !file.is_empty() && !file.starts_with(".rl4/") {
            push(format!("What changed recently in {file}?"), &mut questions);
        }
    }

    // (b) Detected tags.
    for result in &outcome.results {
        if let Some(tag) = &result.chunk.meta.tag {
            push(format!("Which decisions are tagged {tag}?"), &mut questions);
            break;
        }
    }

    // (c) Latest date in the result set.
    if let Some(date) = outcome
        .results
        .iter()
        .filter_map(|r| r.chunk.meta.date.as_deref())
        .max()
    {
        push(format!("What happened on {date}?"), &mut questions);
    }

    // (d) Section names.
    for result in &outcome.results {
        if let Some(section) = &result.chunk.meta.section {
            push(format!("What else is in the {section} section?"), &mut questions);
            break;
        }
    }

    // (e) Cross-exploration into a source kind absent from the results.
    let present: HashSet<SourceKind> =
        outcome.results.iter().map(|r| r.chunk.meta.source).collect();
    let topic = extract_topic(analysis, outcome);
    for kind in [SourceKind::Chat, SourceKind::Cli, SourceKind::Decisions] {
        if !present.contains(&kind) {
            let question = match kind {
                SourceKind::Chat => format!("What did the chats say about {topic}?"),
                SourceKind::Cli => format!("Which commands touched {topic}?"),
                _ => format!("Is there a recorded decision about {topic}?"),
            };
            push(question, &mut questions);
            break;
        }
    }

    // (f) Intent-typed template around the topic.
    let templated = match analysis.intent {
        Intent::Why => format!("Why was {topic} changed?"),
        Intent::How => format!("How is {topic} implemented?"),
        Intent::When => format!("When did {topic} last change?"),
        Intent::Who => format!("Who worked on {topic}?"),
        Intent::Diff => format!("What changed around {topic}?"),
        Intent::What | Intent::List | Intent::General => {
            format!("What else relates to {topic}?")
        }
    };
    push(templated, &mut questions);

    questions
}

/// Extracts a "topic" for templates: a detected identifier first, then
/// the top repeated bigram from the results, then the top unigram.
fn extract_topic(analysis: &QueryAnalysis, outcome: &SearchOutcome) -> String {
    if let Some(identifier) = analysis.identifiers.first() {
        return identifier.clone();
    }

    let mut bigrams: BTreeMap<String, usize> = BTreeMap::new();
    let mut unigrams: BTreeMap<String, usize> = BTreeMap::new();
    for result in &outcome.results {
        let tokens = tokenize(&result.chunk.content);
        for token in &tokens {
            if token.len() >= 4 {
                *unigrams.entry(token.clone()).or_insert(0) += 1;
            }
        }
        for pair in tokens.windows(2) {
            let joined = format!("{} {}", pair[0], pair[1]);
            if joined.len() >= MIN_BIGRAM_LEN {
                *bigrams.entry(joined).or_insert(0) += 1;
            }
        }
    }

    if let Some((bigram, _)) = bigrams
        .iter()
        .filter(|(_, count)| **count >= MIN_BIGRAM_COUNT)
        .max_by_key(|(_, count)| **count)
    {
        return bigram.clone();
    }

    if let Some((unigram, _)) = unigrams.iter().max_by_key(|(_, count)| **count) {
        return unigram.clone();
    }

    analysis
        .terms
        .first()
        .cloned()
        .unwrap_or_else(|| "this work".to_string())
}
