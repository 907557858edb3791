//! Chunk representation for the retrieval corpus.
//!
//! Chunks are the uniformly-shaped retrieval units produced by the
//! per-source chunkers. Each chunk carries metadata about its origin and
//! a ready-to-render citation, and is identified by a stable id derived
//! from its content, source kind, and range.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Source kind of a retrieval unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Aggregated dashboard sections (`evidence.md`).
    Evidence,
    /// Per-day journal sections (`timeline.md`).
    Timeline,
    /// Decision records.
    Decisions,
    /// Chat transcript windows.
    Chat,
    /// Shell command history windows.
    Cli,
    /// Source-tree file segments.
    Code,
}

impl SourceKind {
    /// Returns the lowercase wire name of this source kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evidence => "evidence",
            Self::Timeline => "timeline",
            Self::Decisions => "decisions",
            Self::Chat => "chat",
            Self::Cli => "cli",
            Self::Code => "code",
        }
    }

    /// Parses a source kind from its wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "evidence" => Some(Self::Evidence),
            "timeline" => Some(Self::Timeline),
            "decisions" => Some(Self::Decisions),
            "chat" => Some(Self::Chat),
            "cli" => Some(Self::Cli),
            "code" => Some(Self::Code),
            _ => None,
        }
    }

    /// All source kinds, in index-build order.
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::Evidence,
            Self::Timeline,
            Self::Decisions,
            Self::Chat,
            Self::Cli,
            Self::Code,
        ]
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Source kind this chunk was cut from.
    pub source: SourceKind,

    /// Originating file path, workspace-relative where possible.
    pub file: String,

    /// Line range in the originating file (1-based, inclusive).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_range: Option<(u32, u32)>,

    /// ISO-8601 date associated with the chunk, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Closed-set tag (FIX, FEAT, ARCH, ...), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Section name for dashboard/timeline chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// Chat thread or CLI session identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Epoch-millisecond timestamp of the first record in the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_ts: Option<i64>,

    /// Epoch-millisecond timestamp of the last record in the window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ts: Option<i64>,
}

impl ChunkMeta {
    /// Creates minimal metadata for a source kind and file.
    #[must_use]
    pub fn new(source: SourceKind, file: impl Into<String>) -> Self {
        Self {
            source,
            file: file.into(),
            line_range: None,
            date: None,
            tag: None,
            section: None,
            thread_id: None,
            first_ts: None,
            last_ts: None,
        }
    }

    /// Sets the line range.
    #[must_use]
    pub const fn lines(mut self, start: u32, end: u32) -> Self {
        self.line_range = Some((start, end));
        self
    }

    /// Sets the ISO-8601 date.
    #[must_use]
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Sets the tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Sets the section name.
    #[must_use]
    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Sets the thread or session identifier.
    #[must_use]
    pub fn thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Sets the first/last timestamps of the window.
    #[must_use]
    pub const fn window(mut self, first_ts: i64, last_ts: i64) -> Self {
        self.first_ts = Some(first_ts);
        self.last_ts = Some(last_ts);
        self
    }
}

/// Renderable citation for a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Cited file path.
    pub file: String,

    /// Line-or-range string, e.g. `L10-L42`, or a section name.
    pub lines: String,

    /// ISO-8601 date, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Source kind of the cited chunk.
    pub source: SourceKind,

    /// Thread or session identifier, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl Citation {
    /// Derives a citation from chunk metadata.
    #[must_use]
    pub fn from_meta(meta: &ChunkMeta) -> Self {
        let lines = meta.line_range.map_or_else(
            || {
                meta.section.clone().unwrap_or_else(|| {
                    meta.thread_id
                        .clone()
                        .unwrap_or_else(|| meta.source.as_str().to_string())
                })
            },
            |(start, end)| {
                if start == end {
                    format!("L{start}")
                } else {
                    format!("L{start}-L{end}")
                }
            },
        );

        Self {
            file: meta.file.clone(),
            lines,
            date: meta.date.clone(),
            source: meta.source,
            thread_id: meta.thread_id.clone(),
        }
    }

    /// Renders the citation as a single line.
    ///
    /// # Examples
    ///
    /// ```
    /// use rl4_rs::core::{ChunkMeta, Citation, SourceKind};
    ///
    /// let meta = ChunkMeta::new(SourceKind::Code, "src/a.ts")
    ///     .lines(10, 20)
    ///     .date("2026-07-01");
    /// let cite = Citation::from_meta(&meta);
    /// assert_eq!(cite.render(), "src/a.ts | L10-L20 | 2026-07-01");
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("{} | {}", self.file, self.lines);
        if let Some(date) = &self.date {
            out.push_str(" | ");
            out.push_str(date);
        }
        out
    }
}

/// Immutable retrieval unit.
///
/// Two chunks with the same content, source kind, and range always carry
/// the same id, so re-running the chunkers on identical input produces
/// byte-identical results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier (16 hex chars).
    pub id: String,

    /// UTF-8 content.
    pub content: String,

    /// Origin metadata.
    pub meta: ChunkMeta,

    /// Ready-to-render citation.
    pub citation: Citation,
}

impl Chunk {
    /// Creates a chunk, deriving its id from (content, source, range).
    ///
    /// `range` is the chunker-supplied identity string: a line span for
    /// code, a section path for dashboards, or thread/session id plus
    /// index bounds for chat and CLI windows.
    #[must_use]
    pub fn new(content: String, meta: ChunkMeta, range: &str) -> Self {
        let id = stable_chunk_id(&content, meta.source, range);
        let citation = Citation::from_meta(&meta);
        Self {
            id,
            content,
            meta,
            citation,
        }
    }

    /// Returns the size of the chunk content in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Checks whether the chunk content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Estimates token count using the ~4 chars per token heuristic.
    #[must_use]
    pub fn estimate_tokens(&self) -> usize {
        self.content.len().div_ceil(4)
    }
}

/// Derives the stable chunk id from content, source kind, and range.
///
/// The id is the first 16 hex chars of a SHA-256 over the three parts
/// with `\x1f` separators, so no concatenation of distinct inputs can
/// collide by boundary shifting.
#[must_use]
pub fn stable_chunk_id(content: &str, source: SourceKind, range: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update([0x1f]);
    hasher.update(source.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(range.as_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(16);
    for byte in &digest[..8] {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}
