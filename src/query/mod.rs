//! Deterministic query analyzer.
//!
//! No external data, no model calls: intent detection runs an ordered
//! pattern list, entity extraction uses four regexes, and synonym
//! expansion unions a static bilingual dictionary, capped to avoid
//! BM25 dilution.

use crate::core::SourceKind;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Cap on the expanded term set.
pub const MAX_EXPANDED_TERMS: usize = 20;

/// Detected query intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Rationale questions ("why did we ...").
    Why,
    /// Procedure questions ("how do I ...").
    How,
    /// Definition questions ("what is ...").
    What,
    /// Chronology questions ("when did ...").
    When,
    /// Attribution questions ("who changed ...").
    Who,
    /// Enumeration requests ("list all ...").
    List,
    /// Comparison requests ("diff between ...").
    Diff,
    /// Anything else.
    General,
}

impl Intent {
    /// Returns the lowercase intent name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Why => "why",
            Self::How => "how",
            Self::What => "what",
            Self::When => "when",
            Self::Who => "who",
            Self::List => "list",
            Self::Diff => "diff",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full analysis of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnalysis {
    /// Query as received.
    pub raw: String,
    /// Lowercased, whitespace-collapsed query.
    pub normalized: String,
    /// Detected intent.
    pub intent: Intent,
    /// Intent confidence in [0, 1].
    pub confidence: f64,
    /// File paths mentioned in the query.
    pub files: Vec<String>,
    /// ISO dates mentioned in the query.
    pub dates: Vec<String>,
    /// Closed-set tags mentioned in the query.
    pub tags: Vec<String>,
    /// CamelCase identifiers mentioned in the query.
    pub identifiers: Vec<String>,
    /// Original query tokens.
    pub terms: Vec<String>,
    /// Tokens plus dictionary synonyms, capped at
    /// [`MAX_EXPANDED_TERMS`].
    pub expanded_terms: Vec<String>,
}

/// One intent pattern: starts-with wins over contains.
struct IntentPattern {
    intent: Intent,
    starts: Regex,
    contains: Regex,
    start_confidence: f64,
    contains_confidence: f64,
}

fn intent_patterns() -> &'static [IntentPattern] {
    static PATTERNS: OnceLock<Vec<IntentPattern>> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let patterns = PATTERNS.get_or_init(|| {
        let pattern = |intent, starts: &str, contains: &str, sc, cc| IntentPattern {
            intent,
            starts: Regex::new(starts).unwrap(),
            contains: Regex::new(contains).unwrap(),
            start_confidence: sc,
            contains_confidence: cc,
        };
        vec![
            pattern(
                Intent::Why,
                r"^(why|pourquoi)\b",
                r"\b(why|pourquoi|reason|rationale|raison)\b",
                0.9,
                0.7,
            ),
            pattern(
                Intent::How,
                r"^(how|comment)\b",
                r"\b(how to|comment|implement|implementation)\b",
                0.9,
                0.65,
            ),
            pattern(
                Intent::When,
                r"^(when|quand)\b",
                r"\b(when|quand|history|historique|chronology)\b",
                0.85,
                0.6,
            ),
            pattern(
                Intent::Who,
                r"^(who|qui)\b",
                r"\b(who|qui)\b",
                0.85,
                0.6,
            ),
            pattern(
                Intent::What,
                r"^(what|quoi|qu)\b",
                r"\b(what is|definition|qu'est-ce)\b",
                0.85,
                0.6,
            ),
            pattern(
                Intent::List,
                r"^(list|show|liste|affiche)\b",
                r"\b(list of|all the|liste des)\b",
                0.8,
                0.6,
            ),
            pattern(
                Intent::Diff,
                r"^(diff|compare)\b",
                r"\b(difference|différence|versus|vs|changed between)\b",
                0.8,
                0.6,
            ),
        ]
    });
    patterns
}

fn file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| {
        Regex::new(
            r"[\w./-]+\.(?:ts|tsx|js|jsx|mjs|rs|py|go|java|c|h|cpp|hpp|rb|php|md|json|yml|yaml|toml|css|html)\b",
        )
        .unwrap()
    });
    re
}

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());
    re
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)+\b").unwrap());
    re
}

/// Static bilingual synonym dictionary (English ↔ French).
///
/// Both directions are looked up, so either language in the query pulls
/// in the other.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("error", &["erreur", "failure", "échec"]),
    ("bug", &["erreur", "défaut", "defect"]),
    ("fix", &["correction", "corriger", "repair"]),
    ("why", &["pourquoi", "reason", "raison"]),
    ("delete", &["supprimer", "remove", "suppression"]),
    ("test", &["essai", "spec", "vérification"]),
    ("slow", &["lent", "performance", "lenteur"]),
    ("build", &["compilation", "compiler"]),
    ("change", &["modification", "changement", "modifier"]),
    ("file", &["fichier"]),
    ("save", &["sauvegarde", "enregistrer"]),
    ("search", &["recherche", "chercher"]),
    ("cache", &["cache"]),
    ("decision", &["décision", "choix"]),
    ("revert", &["annuler", "rollback", "retour"]),
];

/// Tokenizes text into lowercase word tokens, splitting on
/// non-alphanumeric characters (underscore preserved).
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Normalizes a query: lowercase, trim, collapse whitespace.
#[must_use]
pub fn normalize(query: &str) -> String {
    query.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Detects intent via the ordered pattern list.
///
/// The first start-matching pattern wins; otherwise the first
/// contains-match; otherwise `general` with 0.5 confidence.
#[must_use]
pub fn detect_intent(normalized: &str) -> (Intent, f64) {
    for pattern in intent_patterns() {
        if pattern.starts.is_match(normalized) {
            return (pattern.intent, pattern.start_confidence);
        }
    }
    for pattern in intent_patterns() {
        if pattern.contains.is_match(normalized) {
            return (pattern.intent, pattern.contains_confidence);
        }
    }
    (Intent::General, 0.5)
}

/// Per-intent multiplicative source bias used by the reranker.
#[must_use]
pub fn source_bias(intent: Intent, kind: SourceKind) -> f64 {
    match (intent, kind) {
        (Intent::Why, SourceKind::Decisions) | (Intent::When, SourceKind::Timeline) => 2.0,
        (Intent::Why, SourceKind::Timeline)
        | (Intent::How, SourceKind::Code)
        | (Intent::Who, SourceKind::Chat)
        | (Intent::List, SourceKind::Evidence) => 1.5,
        (Intent::How, SourceKind::Chat)
        | (Intent::What, SourceKind::Code)
        | (Intent::Diff, SourceKind::Timeline) => 1.3,
        (Intent::What, SourceKind::Evidence)
        | (Intent::Who, SourceKind::Decisions)
        | (Intent::Diff, SourceKind::Code)
        | (Intent::When, SourceKind::Evidence) => 1.2,
        _ => 1.0,
    }
}

/// Analyzes a query: normalize, detect intent, extract entities, expand
/// synonyms.
#[must_use]
pub fn analyze(query: &str) -> QueryAnalysis {
    let normalized = normalize(query);
    let (intent, confidence) = detect_intent(&normalized);

    let files: Vec<String> = file_regex()
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .collect();
    let dates: Vec<String> = date_regex()
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .collect();
    let tags: Vec<String> = crate::chunker::TAGS
        .iter()
        .filter(|tag| {
            query
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == **tag)
        })
        .map(|tag| (*tag).to_string())
        .collect();
    let identifiers: Vec<String> = identifier_regex()
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .filter(|ident| !tags.iter().any(|t| t == ident))
        .collect();

    let terms = tokenize(&normalized);
    let expanded_terms = expand_terms(&terms, &identifiers);

    QueryAnalysis {
        raw: query.to_string(),
        normalized,
        intent,
        confidence,
        files,
        dates,
        tags,
        identifiers,
        terms,
        expanded_terms,
    }
}

/// Unions dictionary synonyms into the term set, original terms first,
/// capped at [`MAX_EXPANDED_TERMS`].
fn expand_terms(terms: &[String], identifiers: &[String]) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for term in terms {
        if seen.insert(term.clone()) {
            expanded.push(term.clone());
        }
    }

    let lookups: Vec<String> = terms
        .iter()
        .cloned()
        .chain(identifiers.iter().map(|i| i.to_lowercase()))
        .collect();

    for word in &lookups {
        for (key, synonyms) in SYNONYMS {
            let forward = key == word;
            let backward = synonyms.iter().any(|s| s == word);
            if !forward && !backward {
                continue;
            }
            if backward && seen.insert((*key).to_string()) {
                expanded.push((*key).to_string());
            }
            if forward {
                for synonym in *synonyms {
                    if seen.insert((*synonym).to_string()) {
                        expanded.push((*synonym).to_string());
                    }
                }
            }
        }
    }

    expanded.truncate(MAX_EXPANDED_TERMS);
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("why did we drop redis", Intent::Why, 0.9; "why start")]
    #[test_case("pourquoi ce choix", Intent::Why, 0.9; "why french start")]
    #[test_case("tell me the reason for this", Intent::Why, 0.7; "why contains")]
    #[test_case("how do I run the tests", Intent::How, 0.9; "how start")]
    #[test_case("when was the cache added", Intent::When, 0.85; "when start")]
    #[test_case("who touched the parser", Intent::Who, 0.85; "who start")]
    #[test_case("what is the blob store", Intent::What, 0.85; "what start")]
    #[test_case("list all decisions", Intent::List, 0.8; "list start")]
    #[test_case("diff between v1 and v2", Intent::Diff, 0.8; "diff start")]
    #[test_case("cache invalidation details", Intent::General, 0.5; "general fallback")]
    fn test_intent_detection(query: &str, intent: Intent, confidence: f64) {
        let (detected, conf) = detect_intent(&normalize(query));
        assert_eq!(detected, intent);
        assert!((conf - confidence).abs() < f64::EPSILON);
    }

    #[test]
    fn test_starts_with_wins_over_contains() {
        // "when" starts the query even though "reason" appears inside.
        let (intent, conf) = detect_intent("when did we find the reason");
        assert_eq!(intent, Intent::When);
        assert!((conf - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Why   DID  we "), "why did we");
    }

    #[test]
    fn test_entity_extraction() {
        let analysis = analyze("why did src/cache/index.ts break on 2026-07-01 FIX CacheSignature");
        assert_eq!(analysis.files, vec!["src/cache/index.ts"]);
        assert_eq!(analysis.dates, vec!["2026-07-01"]);
        assert_eq!(analysis.tags, vec!["FIX"]);
        assert_eq!(analysis.identifiers, vec!["CacheSignature"]);
    }

    #[test]
    fn test_tags_excluded_from_identifiers() {
        // REFACTOR is in the tag set, not an identifier; CamelCase regex
        // would not match it anyway, but a mixed-case tag must not leak.
        let analysis = analyze("REFACTOR the DataStore");
        assert_eq!(analysis.tags, vec!["REFACTOR"]);
        assert_eq!(analysis.identifiers, vec!["DataStore"]);
    }

    #[test]
    fn test_synonym_expansion_bidirectional() {
        let analysis = analyze("fix the bug");
        assert!(analysis.expanded_terms.contains(&"correction".to_string()));
        assert!(analysis.expanded_terms.contains(&"erreur".to_string()));

        // French → English.
        let analysis = analyze("corriger erreur");
        assert!(analysis.expanded_terms.contains(&"fix".to_string()));
    }

    #[test]
    fn test_expansion_cap() {
        let query = "error bug fix why delete test slow build change file save search";
        let analysis = analyze(query);
        assert!(analysis.expanded_terms.len() <= MAX_EXPANDED_TERMS);
        // Original terms come first and survive the cap.
        assert_eq!(analysis.expanded_terms[0], "error");
    }

    #[test]
    fn test_expansion_preserves_original_terms_first() {
        let analysis = analyze("cache bug");
        assert_eq!(analysis.expanded_terms[0], "cache");
        assert_eq!(analysis.expanded_terms[1], "bug");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Hello, World! foo_bar v2"),
            vec!["hello", "world", "foo_bar", "v2"]
        );
    }

    #[test]
    fn test_source_bias_table() {
        assert!((source_bias(Intent::Why, SourceKind::Decisions) - 2.0).abs() < f64::EPSILON);
        assert!((source_bias(Intent::Why, SourceKind::Timeline) - 1.5).abs() < f64::EPSILON);
        assert!((source_bias(Intent::When, SourceKind::Timeline) - 2.0).abs() < f64::EPSILON);
        assert!((source_bias(Intent::General, SourceKind::Code) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_identifier_kept_as_term() {
        let analysis = analyze("inspect FixRunner");
        assert!(analysis.expanded_terms.contains(&"fixrunner".to_string()));
        assert_eq!(analysis.identifiers, vec!["FixRunner"]);
    }
}
