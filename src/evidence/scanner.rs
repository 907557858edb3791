//! Bounded workspace scanner.
//!
//! Breadth-first walk over the source tree with a hard-coded skip-list
//! for well-known noisy directories, `.gitignore` support, a per-file
//! size cap, a total-file cap, and a wall-clock deadline. When any limit
//! trips, the scan stops and the partial result is flagged `truncated`;
//! downstream consumers index whatever was collected.

use crate::core::RL4_DIR;
use regex::Regex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Directories never descended into, regardless of gitignore.
const SKIP_DIRS: &[&str] = &[
    ".git",
    RL4_DIR,
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "coverage",
    ".next",
    ".venv",
    "venv",
    "__pycache__",
    ".idea",
    ".vscode",
];

/// Scanner limits.
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    /// Per-file size cap in bytes; larger files are skipped.
    pub max_file_bytes: u64,
    /// Total files collected before the scan stops.
    pub max_files: usize,
    /// Wall-clock deadline for the whole walk.
    pub deadline: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            max_files: 5_000,
            deadline: Duration::from_secs(3),
        }
    }
}

/// One scanned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Workspace-relative path with `/` separators.
    pub rel_path: String,
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// File size in bytes.
    pub size: u64,
}

/// Scan output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Files collected, in BFS order.
    pub files: Vec<ScannedFile>,
    /// Whether a cap or the deadline stopped the scan early.
    pub truncated: bool,
}

/// Compiled `.gitignore` patterns.
///
/// Each glob line becomes an anchored regex over the workspace-relative
/// path. Negation lines and malformed patterns are skipped, matching the
/// one-bad-record-isolation policy of the evidence readers.
#[derive(Debug, Default)]
pub struct GitIgnore {
    rules: Vec<IgnoreRule>,
}

#[derive(Debug)]
struct IgnoreRule {
    regex: Regex,
    dir_only: bool,
}

impl GitIgnore {
    /// Loads `.gitignore` from the workspace root; missing file means no
    /// rules.
    #[must_use]
    pub fn load(root: &Path) -> Self {
        std::fs::read_to_string(root.join(".gitignore"))
            .map(|text| Self::parse(&text))
            .unwrap_or_default()
    }

    /// Parses gitignore text into anchored regex rules.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut rules = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let dir_only = line.ends_with('/');
            let pattern = line.trim_end_matches('/');
            let anchored = pattern.starts_with('/');
            let pattern = pattern.trim_start_matches('/');

            let Some(regex) = glob_to_regex(pattern, anchored) else {
                debug!(pattern = line, "skipping unparseable gitignore pattern");
                continue;
            };
            rules.push(IgnoreRule { regex, dir_only });
        }

        Self { rules }
    }

    /// Checks whether a workspace-relative path is ignored.
    #[must_use]
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        self.rules
            .iter()
            .any(|rule| (is_dir || !rule.dir_only) && rule.regex.is_match(rel_path))
    }
}

/// Converts one gitignore glob into an anchored regex.
///
/// `**` crosses directory separators, `*` and `?` do not. Unanchored
/// patterns may match at any path segment boundary.
fn glob_to_regex(pattern: &str, anchored: bool) -> Option<Regex> {
    let mut out = String::new();
    out.push('^');
    if !anchored && !pattern.contains('/') {
        // A bare name matches at any depth.
        out.push_str("(?:.*/)?");
    }

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // Swallow a following separator so `a/**/b` matches `a/b`.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    // A directory pattern also ignores everything beneath it.
    out.push_str("(?:/.*)?$");
    Regex::new(&out).ok()
}

/// Scans a workspace breadth-first under the configured limits.
#[must_use]
pub fn scan_workspace(root: &Path, config: &ScanConfig) -> ScanResult {
    let ignore = GitIgnore::load(root);
    let started = Instant::now();
    let mut result = ScanResult::default();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(root.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        if started.elapsed() >= config.deadline {
            warn!(collected = result.files.len(), "scan deadline hit");
            result.truncated = true;
            break;
        }

        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };

        let mut children: Vec<_> = entries.flatten().collect();
        // Deterministic order keeps cache signatures and chunk ids stable.
        children.sort_by_key(std::fs::DirEntry::file_name);

        for entry in children {
            if result.files.len() >= config.max_files {
                result.truncated = true;
                queue.clear();
                break;
            }

            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let rel_path = relative_path(root, &path);

            if file_type.is_dir() {
                if SKIP_DIRS.contains(&name.as_str()) || ignore.is_ignored(&rel_path, true) {
                    continue;
                }
                queue.push_back(path);
            } else if file_type.is_file() {
                if ignore.is_ignored(&rel_path, false) {
                    continue;
                }
                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                if meta.len() > config.max_file_bytes {
                    continue;
                }
                result.files.push(ScannedFile {
                    rel_path,
                    abs_path: path,
                    size: meta.len(),
                });
            }
        }
    }

    result
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
