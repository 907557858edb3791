//! Code-aware chunker.
//!
//! Small files (≤80 lines) become a single chunk carrying a one-line
//! header. Larger files are cut at semantic split-points (function,
//! class, and method declarations across common languages) when the
//! distance since the last cut is at least half the target window;
//! otherwise the cut falls back to a fixed 80-line window. Consecutive
//! chunks overlap by 15 lines.

use crate::core::{Chunk, ChunkMeta, SourceKind};
use regex::Regex;
use std::sync::OnceLock;

/// Files at or under this line count become one chunk.
pub const SMALL_FILE_LINES: usize = 80;

/// Target window size in lines for larger files.
const WINDOW_LINES: usize = 80;

/// Overlap inherited by each cut, in lines.
const OVERLAP_LINES: usize = 15;

/// Declaration patterns marking semantic split-points.
///
/// One regex per family keeps the set auditable; all are line-anchored.
fn split_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    let patterns = PATTERNS.get_or_init(|| {
        [
            // Rust
            r"^\s*(?:pub\s+)?(?:async\s+)?fn\s+\w+",
            r"^\s*(?:pub\s+)?(?:struct|enum|trait|impl)\b",
            // Python
            r"^\s*(?:async\s+)?def\s+\w+",
            r"^\s*class\s+\w+",
            // JavaScript / TypeScript
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*\w*",
            r"^\s*(?:export\s+)?(?:abstract\s+)?class\s+\w+",
            r"^\s*(?:export\s+)?(?:const|let|var)\s+\w+\s*=\s*(?:async\s*)?\(",
            // Go
            r"^func\s+(?:\(\w+\s+\*?\w+\)\s+)?\w+",
            // Java / C# / C++ method-ish declarations
            r"^\s*(?:public|private|protected|static|final|virtual)\s+[\w<>\[\]]+\s+\w+\s*\(",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    });
    patterns
}

/// Detects a display language name from the file extension.
fn language_of(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "rs" => "rust",
        "py" => "python",
        "js" | "jsx" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        "rb" => "ruby",
        "php" => "php",
        "md" => "markdown",
        "json" => "json",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        _ => "text",
    }
}

/// Line indices (0-based) where a declaration starts.
fn split_points(lines: &[&str]) -> Vec<usize> {
    let patterns = split_patterns();
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| patterns.iter().any(|p| p.is_match(line)))
        .map(|(index, _)| index)
        .collect()
}

/// Chunks one source file.
#[must_use]
pub fn chunk_code(path: &str, content: &str) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    let lang = language_of(path);

    if total <= SMALL_FILE_LINES {
        let header = format!("// file: {path} ({lang}, {total} lines)");
        let body = lines.join("\n");
        let chunk_content = format!("{header}\n{body}");
        let meta = ChunkMeta::new(SourceKind::Code, path).lines(1, u32::try_from(total).unwrap_or(u32::MAX));
        let range = format!("L1-L{total}");
        return vec![Chunk::new(chunk_content, meta, &range)];
    }

    let splits = split_points(&lines);
    let mut chunks = Vec::new();
    let mut start = 0_usize;

    while start < total {
        let target_end = (start + WINDOW_LINES).min(total);
        let end = if target_end >= total {
            total
        } else {
            // Prefer the last declaration inside the window that leaves
            // at least half a window behind the previous cut.
            splits
                .iter()
                .copied()
                .filter(|&s| s > start + WINDOW_LINES / 2 && s <= target_end)
                .next_back()
                .unwrap_or(target_end)
        };

        let body = lines[start..end].join("\n");
        if !body.trim().is_empty() {
            let meta = ChunkMeta::new(SourceKind::Code, path).lines(
                u32::try_from(start + 1).unwrap_or(u32::MAX),
                u32::try_from(end).unwrap_or(u32::MAX),
            );
            let range = format!("L{}-L{}", start + 1, end);
            chunks.push(Chunk::new(body, meta, &range));
        }

        if end >= total {
            break;
        }
        start = end.saturating_sub(OVERLAP_LINES).max(start + 1);
    }

    chunks
}
