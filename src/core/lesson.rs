//! Lessons: derived, type-tagged observations about files.
//!
//! A lesson's identity is a stable hash over its type, origin file, and a
//! 64-bit SimHash fingerprint of its text, so minor rephrasings of the
//! same observation collapse to one id.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lesson type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LessonKind {
    /// Host-authored avoid-pattern from `skills.mdc`.
    Avoid,
    /// A change on this file was later reverted.
    Reversal,
    /// A recorded decision touching this file.
    Decision,
    /// Strong coupling edge to another file.
    Coupling,
    /// Frequently re-saved file.
    Hotspot,
    /// Chat-derived causal inference.
    Chat,
}

impl LessonKind {
    /// Returns the uppercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Avoid => "AVOID",
            Self::Reversal => "REVERSAL",
            Self::Decision => "DECISION",
            Self::Coupling => "COUPLING",
            Self::Hotspot => "HOTSPOT",
            Self::Chat => "CHAT",
        }
    }

    /// Counterfactual type-prior used when no outcome record exists yet.
    #[must_use]
    pub const fn prior(self) -> f64 {
        match self {
            Self::Avoid => 0.6,
            Self::Reversal => 0.4,
            Self::Coupling => 0.2,
            Self::Decision => 0.15,
            Self::Chat => 0.1,
            Self::Hotspot => 0.05,
        }
    }
}

impl std::fmt::Display for LessonKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived observation about a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Stable identifier (16 hex chars).
    pub id: String,

    /// Lesson type.
    #[serde(rename = "type")]
    pub kind: LessonKind,

    /// Human-readable lesson text.
    pub text: String,

    /// File the lesson is about.
    pub origin_file: String,

    /// References into the evidence streams backing this lesson.
    #[serde(default)]
    pub evidence_refs: Vec<String>,

    /// Epoch-millisecond timestamp of first observation.
    pub first_seen: i64,

    /// Epoch-millisecond timestamp of latest observation.
    pub last_seen: i64,

    /// Originating workspace id for team lessons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_workspace: Option<String>,
}

impl Lesson {
    /// Creates a lesson, deriving its id from type, origin, and text
    /// fingerprint.
    #[must_use]
    pub fn new(kind: LessonKind, text: impl Into<String>, origin_file: impl Into<String>) -> Self {
        let text = text.into();
        let origin_file = origin_file.into();
        let id = lesson_id(kind, &origin_file, &text);
        Self {
            id,
            kind,
            text,
            origin_file,
            evidence_refs: Vec::new(),
            first_seen: 0,
            last_seen: 0,
            source_workspace: None,
        }
    }

    /// Sets first/last seen timestamps.
    #[must_use]
    pub const fn seen(mut self, first: i64, last: i64) -> Self {
        self.first_seen = first;
        self.last_seen = last;
        self
    }

    /// Adds an evidence reference.
    #[must_use]
    pub fn evidence(mut self, reference: impl Into<String>) -> Self {
        self.evidence_refs.push(reference.into());
        self
    }

    /// Estimates token count of the lesson text (~4 chars per token).
    #[must_use]
    pub fn estimate_tokens(&self) -> usize {
        self.text.len().div_ceil(4).max(1)
    }
}

/// 64-bit FNV-1a hash.
const fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

/// 64-bit SimHash over lowercased word tokens.
///
/// Each token's FNV-1a hash votes per bit: +1 where the bit is set, -1
/// where it is not; the final bit is set where the accumulated vote is
/// strictly positive. The exact accumulation rule is load-bearing for
/// lesson dedup and must not change.
#[must_use]
pub fn simhash64(text: &str) -> u64 {
    let mut votes = [0_i32; 64];
    let mut saw_token = false;

    for token in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
    {
        saw_token = true;
        let h = fnv1a64(token.to_lowercase().as_bytes());
        for (bit, vote) in votes.iter_mut().enumerate() {
            if (h >> bit) & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }

    if !saw_token {
        return 0;
    }

    let mut out = 0_u64;
    for (bit, vote) in votes.iter().enumerate() {
        if *vote > 0 {
            out |= 1 << bit;
        }
    }
    out
}

/// 16-hex-char locality-sensitive fingerprint of lesson text.
#[must_use]
pub fn text_fingerprint(text: &str) -> String {
    format!("{:016x}", simhash64(text))
}

/// Stable lesson id over (type, origin file, text fingerprint).
#[must_use]
pub fn lesson_id(kind: LessonKind, origin_file: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(origin_file.as_bytes());
    hasher.update([0x1f]);
    hasher.update(text_fingerprint(text).as_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(16);
    for byte in &digest[..8] {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simhash_deterministic() {
        let a = simhash64("avoid editing the generated client by hand");
        let b = simhash64("avoid editing the generated client by hand");
        assert_eq!(a, b);
    }

    #[test]
    fn test_simhash_collapses_rephrasings() {
        // Word-set overlap dominates; reordering and case changes keep
        // most bit votes identical.
        let a = simhash64("Avoid editing the generated client by hand");
        let b = simhash64("avoid editing the generated client BY HAND");
        assert_eq!(a, b);
    }

    #[test]
    fn test_simhash_differs_for_unrelated_text() {
        let a = simhash64("avoid editing the generated client");
        let b = simhash64("retry the flaky websocket test");
        assert_ne!(a, b);
    }

    #[test]
    fn test_simhash_empty() {
        assert_eq!(simhash64(""), 0);
        assert_eq!(simhash64("   "), 0);
    }

    #[test]
    fn test_fingerprint_is_16_hex() {
        let fp = text_fingerprint("some lesson text");
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_lesson_id_stable_across_rephrasing() {
        let a = lesson_id(LessonKind::Avoid, "src/gen.ts", "Avoid editing the generated client");
        let b = lesson_id(LessonKind::Avoid, "src/gen.ts", "avoid editing the GENERATED client");
        assert_eq!(a, b);
    }

    #[test]
    fn test_lesson_id_varies_by_kind_and_file() {
        let base = lesson_id(LessonKind::Avoid, "src/gen.ts", "text");
        assert_ne!(base, lesson_id(LessonKind::Reversal, "src/gen.ts", "text"));
        assert_ne!(base, lesson_id(LessonKind::Avoid, "src/other.ts", "text"));
    }

    #[test]
    fn test_lesson_new() {
        let lesson = Lesson::new(LessonKind::Hotspot, "saved 14 times this week", "src/hot.rs")
            .seen(100, 900)
            .evidence("activity.jsonl#L12");
        assert_eq!(lesson.kind, LessonKind::Hotspot);
        assert_eq!(lesson.first_seen, 100);
        assert_eq!(lesson.last_seen, 900);
        assert_eq!(lesson.evidence_refs.len(), 1);
        assert_eq!(lesson.id.len(), 16);
    }

    #[test]
    fn test_lesson_token_estimate_minimum() {
        let lesson = Lesson::new(LessonKind::Chat, "ab", "f");
        assert_eq!(lesson.estimate_tokens(), 1);
    }

    #[test]
    fn test_type_priors() {
        assert!((LessonKind::Avoid.prior() - 0.6).abs() < f64::EPSILON);
        assert!((LessonKind::Reversal.prior() - 0.4).abs() < f64::EPSILON);
        assert!((LessonKind::Coupling.prior() - 0.2).abs() < f64::EPSILON);
        assert!((LessonKind::Decision.prior() - 0.15).abs() < f64::EPSILON);
        assert!((LessonKind::Chat.prior() - 0.1).abs() < f64::EPSILON);
        assert!((LessonKind::Hotspot.prior() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lesson_serde_type_field() {
        let lesson = Lesson::new(LessonKind::Avoid, "never use sync fs in handlers", "src/api.ts");
        let json = serde_json::to_string(&lesson).unwrap();
        assert!(json.contains("\"type\":\"AVOID\""));
        let back: Lesson = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lesson);
    }
}
