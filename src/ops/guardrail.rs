//! Bit-exact guardrail for queries and responses.
//!
//! Closed rules: a query must be non-empty and at most 2000 chars; a
//! response must be at most 100 000 chars and carry at least one
//! citation. Every answer the engine emits must pass the response rule.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Maximum query length in characters.
pub const MAX_QUERY_CHARS: usize = 2000;

/// Maximum response length in characters.
pub const MAX_RESPONSE_CHARS: usize = 100_000;

/// What is being guarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailKind {
    /// Inbound query text.
    Query,
    /// Outbound response text.
    Response,
}

/// Guardrail decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    /// Whether the text passes.
    pub allowed: bool,
    /// Reason when it does not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Intervention backing the guarded edit, when one is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervention_id: Option<String>,
}

impl GuardrailVerdict {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            intervention_id: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            intervention_id: None,
        }
    }
}

/// The citation pattern every response must match at least once.
#[must_use]
pub fn citation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let re = RE.get_or_init(|| Regex::new(r"\.rl4\/|L\d+| \| \d{4}-\d{2}-\d{2}").unwrap());
    re
}

/// Checks text against the rule set for its kind.
#[must_use]
pub fn check(text: &str, kind: GuardrailKind) -> GuardrailVerdict {
    match kind {
        GuardrailKind::Query => {
            if text.trim().is_empty() {
                return GuardrailVerdict::denied("query is empty");
            }
            let length = text.chars().count();
            if length > MAX_QUERY_CHARS {
                return GuardrailVerdict::denied(format!(
                    "query is {length} chars (max {MAX_QUERY_CHARS})"
                ));
            }
            GuardrailVerdict::allowed()
        }
        GuardrailKind::Response => {
            let length = text.chars().count();
            if length > MAX_RESPONSE_CHARS {
                return GuardrailVerdict::denied(format!(
                    "response is {length} chars (max {MAX_RESPONSE_CHARS})"
                ));
            }
            if !citation_pattern().is_match(text) {
                return GuardrailVerdict::denied("response carries no citation");
            }
            GuardrailVerdict::allowed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_empty_query_denied() {
        let verdict = check("", GuardrailKind::Query);
        assert!(!verdict.allowed);
        assert!(verdict.reason.as_deref().unwrap().contains("empty"));

        let verdict = check("   \n ", GuardrailKind::Query);
        assert!(!verdict.allowed);
    }

    #[test]
    fn test_query_length_limit() {
        let ok = "x".repeat(MAX_QUERY_CHARS);
        assert!(check(&ok, GuardrailKind::Query).allowed);

        let too_long = "x".repeat(MAX_QUERY_CHARS + 1);
        let verdict = check(&too_long, GuardrailKind::Query);
        assert!(!verdict.allowed);
        assert!(verdict.reason.as_deref().unwrap().contains("2001"));
    }

    #[test_case("see src/a.ts | L10-L20 for details"; "line range")]
    #[test_case("evidence under .rl4/evidence.md"; "rl4 path")]
    #[test_case("logged on src/a.ts | 2026-07-01"; "date separator")]
    fn test_response_with_citation_allowed(text: &str) {
        assert!(check(text, GuardrailKind::Response).allowed);
    }

    #[test]
    fn test_response_without_citation_denied() {
        let verdict = check("a confident answer with no sources", GuardrailKind::Response);
        assert!(!verdict.allowed);
        assert!(verdict.reason.as_deref().unwrap().contains("citation"));
    }

    #[test]
    fn test_response_length_limit() {
        let mut text = "cited at L1 ".repeat(1);
        text.push_str(&"x".repeat(MAX_RESPONSE_CHARS));
        let verdict = check(&text, GuardrailKind::Response);
        assert!(!verdict.allowed);
    }

    #[test]
    fn test_unicode_counts_chars_not_bytes() {
        // 2000 multibyte chars are exactly at the limit.
        let query = "é".repeat(MAX_QUERY_CHARS);
        assert!(check(&query, GuardrailKind::Query).allowed);
    }
}
