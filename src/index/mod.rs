//! Metadata index: the chunk corpus for one workspace state.
//!
//! [`IndexBuilder::build`] is the public contract: compute the current
//! [`CacheSignature`], serve from the in-memory cache, fall back to the
//! on-disk cache, and only then rebuild from all evidence sources in a
//! fixed order. Rebuilds also inject synthetic chunks (live activity,
//! version history, intent chains) so freshly-saved work is findable
//! before the dashboards have been re-rendered.

pub mod cache;

pub use cache::{CacheSignature, DiskCache, MemoryCache};

use crate::chunker::{
    chunk_chat, chunk_cli, chunk_code, chunk_dashboard, chunk_decisions, chunk_timeline,
    ms_to_iso_date,
};
use crate::core::{Chunk, ChunkMeta, SourceKind, WorkspacePaths};
use crate::error::Result;
use crate::evidence::{
    ActivityRecord, BurstRecord, ChatMessage, CliRecord, DecisionRecord, IntentChainRecord,
    ScanConfig, ScannedFile, read_jsonl, read_jsonl_with_archives, scan_workspace, tail_jsonl,
};
use crate::store::{BlobStore, SnapshotIndex};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records considered for the live-activity synthetic chunks.
const LIVE_TAIL_RECORDS: usize = 500;

/// 24 hours in milliseconds.
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Snapshot coverage below which uncovered files are read live.
const COVERAGE_FALLBACK: f64 = 0.5;

/// Path patterns excluded from code indexing as build artifacts.
const ARTIFACT_PATTERNS: &[&str] = &[
    ".min.js",
    ".min.css",
    ".map",
    ".d.ts",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "Gemfile.lock",
    "go.sum",
];

/// Checks whether a path is a build artifact that must not be indexed.
#[must_use]
pub fn is_build_artifact(path: &str) -> bool {
    ARTIFACT_PATTERNS.iter().any(|p| path.ends_with(p))
}

/// The chunk corpus from one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataIndex {
    /// Cache signature this index was built under.
    pub signature: String,

    /// Epoch-millisecond build timestamp.
    #[serde(rename = "builtAt")]
    pub built_at: i64,

    /// Workspace root the index covers.
    pub root: String,

    /// Ordered chunk sequence.
    pub chunks: Vec<Chunk>,

    /// Whether the workspace scan was truncated by a cap or deadline.
    #[serde(default)]
    pub truncated: bool,
}

impl MetadataIndex {
    /// Number of chunks in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no chunks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Builds metadata indexes for one workspace.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    paths: WorkspacePaths,
    scan_config: ScanConfig,
}

impl IndexBuilder {
    /// Creates a builder with default scan limits.
    #[must_use]
    pub fn new(paths: WorkspacePaths) -> Self {
        Self {
            paths,
            scan_config: ScanConfig::default(),
        }
    }

    /// Overrides the scan limits.
    #[must_use]
    pub const fn with_scan_config(mut self, config: ScanConfig) -> Self {
        self.scan_config = config;
        self
    }

    /// Returns the current metadata index, reusing caches when the
    /// signature still matches.
    pub fn build(
        &self,
        memory: &MemoryCache,
        disk: &DiskCache,
        now_ms: i64,
    ) -> Result<Arc<MetadataIndex>> {
        let signature = CacheSignature::compute(&self.paths);

        if let Some(index) = memory.get(&signature) {
            debug!(signature = %signature, "memory cache hit");
            return Ok(index);
        }

        if let Some(index) = disk.load(&signature) {
            let index = Arc::new(index);
            memory.put(&signature, Arc::clone(&index));
            return Ok(index);
        }

        info!(signature = %signature, "rebuilding metadata index");
        let index = Arc::new(self.rebuild(&signature, now_ms));
        if let Err(err) = disk.store(&index) {
            warn!(error = %err, "failed to persist index cache");
        }
        memory.put(&signature, Arc::clone(&index));
        Ok(index)
    }

    /// Rebuilds the index from every source, in a fixed order.
    fn rebuild(&self, signature: &CacheSignature, now_ms: i64) -> MetadataIndex {
        let paths = &self.paths;
        let snapshot = SnapshotIndex::load(paths);
        let scan = scan_workspace(paths.root(), &self.scan_config);
        let mut chunks = Vec::new();

        // 1. Dashboards.
        if let Ok(text) = crate::io::read_file(paths.evidence_md()) {
            chunks.extend(chunk_dashboard(&text, ".rl4/evidence.md"));
        }
        if let Ok(text) = crate::io::read_file(paths.timeline_md()) {
            chunks.extend(chunk_timeline(&text, ".rl4/timeline.md"));
        }

        // 2. Decisions.
        let decisions: Vec<DecisionRecord> = read_jsonl(&paths.decisions_stream());
        chunks.extend(chunk_decisions(&decisions, ".rl4/evidence/decisions.jsonl"));

        // 3. Chat, archives oldest-first then live.
        let messages: Vec<ChatMessage> = read_jsonl_with_archives(
            &paths.chat_history_stream(),
            &paths.archives_dir(),
            "chat_history",
        );
        chunks.extend(chunk_chat(&messages, ".rl4/evidence/chat_history.jsonl"));

        // 4. Live-activity synthetic chunks (at most two).
        chunks.extend(self.live_activity_chunks(now_ms));

        // 5. File-history synthetic chunks.
        chunks.extend(file_history_chunks(&snapshot));

        // 6. Intent-chain synthetic chunks.
        chunks.extend(intent_chain_chunks(&read_jsonl(&paths.intent_chains_stream())));

        // 7. CLI.
        let cli: Vec<CliRecord> = read_jsonl(&paths.cli_history_stream());
        chunks.extend(chunk_cli(&cli, ".rl4/evidence/cli_history.jsonl"));

        // 8. Code, from snapshot blobs with a live-read fallback.
        chunks.extend(code_chunks(paths, &snapshot, &scan.files));

        info!(chunks = chunks.len(), truncated = scan.truncated, "index rebuilt");
        MetadataIndex {
            signature: signature.as_str().to_string(),
            built_at: now_ms,
            root: paths.root().to_string_lossy().to_string(),
            chunks,
            truncated: scan.truncated,
        }
    }

    /// Builds the two live-activity summary chunks covering the last 24
    /// hours: one for work sessions, one for hot files.
    fn live_activity_chunks(&self, now_ms: i64) -> Vec<Chunk> {
        let cutoff = now_ms - DAY_MS;
        let mut out = Vec::new();

        let bursts: Vec<BurstRecord> = tail_jsonl(&self.paths.sessions_stream(), LIVE_TAIL_RECORDS);
        let recent_bursts: Vec<&BurstRecord> = bursts.iter().filter(|b| b.t >= cutoff).collect();
        if !recent_bursts.is_empty() {
            let mut content = format!("Work sessions in the last 24h: {}\n", recent_bursts.len());
            for burst in &recent_bursts {
                let pattern = burst
                    .pattern
                    .as_ref()
                    .map_or("unclassified", |p| p.kind.as_str());
                content.push_str(&format!(
                    "- {} [{}] {} files, {} events\n",
                    burst.burst_id,
                    pattern,
                    burst.files.len(),
                    burst.events_count
                ));
            }
            let mut meta = ChunkMeta::new(SourceKind::Evidence, ".rl4/evidence/sessions.jsonl")
                .section("LIVE SESSIONS (24H)");
            meta.date = ms_to_iso_date(now_ms);
            out.push(Chunk::new(content, meta, "live-activity:sessions"));
        }

        let saves: Vec<ActivityRecord> = tail_jsonl(&self.paths.activity_stream(), LIVE_TAIL_RECORDS);
        let mut per_file: BTreeMap<&str, (u32, u32, u32)> = BTreeMap::new();
        for save in saves.iter().filter(|s| s.t >= cutoff) {
            let entry = per_file.entry(save.path.as_str()).or_default();
            entry.0 += 1;
            entry.1 += save.lines_added;
            entry.2 += save.lines_removed;
        }
        if !per_file.is_empty() {
            let mut ranked: Vec<_> = per_file.into_iter().collect();
            ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then_with(|| a.0.cmp(b.0)));
            ranked.truncate(10);

            let mut content = "Hot files in the last 24h:\n".to_string();
            for (path, (saves, added, removed)) in ranked {
                content.push_str(&format!("- {path} — {saves} saves (+{added}/-{removed})\n"));
            }
            let mut meta = ChunkMeta::new(SourceKind::Evidence, ".rl4/evidence/activity.jsonl")
                .section("LIVE HOT FILES (24H)");
            meta.date = ms_to_iso_date(now_ms);
            out.push(Chunk::new(content, meta, "live-activity:hot-files"));
        }

        out
    }
}

/// One synthetic chunk per file with at least two snapshot versions,
/// describing each version's timestamp and delta.
fn file_history_chunks(snapshot: &SnapshotIndex) -> Vec<Chunk> {
    let mut out = Vec::new();

    for (path, hashes) in &snapshot.files {
        if hashes.len() < 2 {
            continue;
        }

        let mut content = format!("Version history for {path}:\n");
        let mut latest_date = None;
        for (i, hash) in hashes.iter().enumerate() {
            if let Some(meta) = snapshot.version_meta(hash) {
                let date = ms_to_iso_date(meta.t).unwrap_or_else(|| "unknown".to_string());
                content.push_str(&format!(
                    "{}. {} +{}/-{} ({} lines, {} bytes)\n",
                    i + 1,
                    date,
                    meta.lines_added,
                    meta.lines_removed,
                    meta.total_lines,
                    meta.bytes
                ));
                latest_date = Some(date);
            } else {
                content.push_str(&format!("{}. {} (no metadata)\n", i + 1, &hash[..hash.len().min(12)]));
            }
        }

        let mut meta = ChunkMeta::new(SourceKind::Code, path.as_str()).section("VERSION HISTORY");
        meta.date = latest_date;
        let range = format!("history:{path}:{}", hashes.len());
        out.push(Chunk::new(content, meta, &range));
    }

    out
}

/// One synthetic chunk per file with at least two intent-chain records,
/// tracing its save-to-save deltas.
fn intent_chain_chunks(records: &[IntentChainRecord]) -> Vec<Chunk> {
    let mut per_file: BTreeMap<&str, Vec<&IntentChainRecord>> = BTreeMap::new();
    for record in records {
        per_file.entry(record.file.as_str()).or_default().push(record);
    }

    let mut out = Vec::new();
    for (path, file_records) in per_file {
        if file_records.len() < 2 {
            continue;
        }

        let mut content = format!("Intent chain for {path}:\n");
        let mut latest_date = None;
        for record in &file_records {
            let date = ms_to_iso_date(record.t).unwrap_or_else(|| "unknown".to_string());
            let signal = record.intent_signal.as_deref().unwrap_or("save");
            content.push_str(&format!(
                "{date}: +{}/-{} net {} ({signal})\n",
                record.delta.lines_added, record.delta.lines_removed, record.delta.net_change
            ));
            latest_date = Some(date);
        }

        let mut meta = ChunkMeta::new(SourceKind::Evidence, path).section("INTENT CHAIN");
        meta.date = latest_date;
        let range = format!("intent-chain:{path}:{}", file_records.len());
        out.push(Chunk::new(content, meta, &range));
    }
    out
}

/// Code chunks from snapshot blobs, with a live-read fallback when the
/// snapshot index covers less than half of what the scanner sees.
fn code_chunks(
    paths: &WorkspacePaths,
    snapshot: &SnapshotIndex,
    scanned: &[ScannedFile],
) -> Vec<Chunk> {
    let indexable: Vec<&ScannedFile> = scanned
        .iter()
        .filter(|f| !is_build_artifact(&f.rel_path))
        .collect();
    let rel_paths: Vec<String> = indexable.iter().map(|f| f.rel_path.clone()).collect();
    let coverage = snapshot.coverage(&rel_paths);
    let read_live_uncovered = coverage < COVERAGE_FALLBACK;
    if read_live_uncovered {
        debug!(coverage, "snapshot coverage low, reading uncovered files live");
    }

    let store = BlobStore::open(paths.snapshots_dir()).ok();

    let contents: Vec<(String, String)> = indexable
        .iter()
        .filter_map(|file| {
            let blob_text = store.as_ref().and_then(|s| {
                snapshot
                    .latest_hash(&file.rel_path)
                    .and_then(|hash| s.read_text(hash).ok())
            });
            match blob_text {
                Some(text) => Some((file.rel_path.clone(), text)),
                None if read_live_uncovered => {
                    crate::io::read_file_capped(&file.abs_path, file.size.max(1))
                        .ok()
                        .map(|text| (file.rel_path.clone(), text))
                }
                None => None,
            }
        })
        .collect();

    contents
        .par_iter()
        .map(|(path, text)| chunk_code(path, text))
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, WorkspacePaths) {
        let tmp = TempDir::new().unwrap();
        let paths = WorkspacePaths::new(tmp.path());
        paths.ensure_layout().unwrap();
        (tmp, paths)
    }

    fn write_stream(path: &std::path::Path, lines: &[String]) {
        std::fs::write(path, lines.join("\n") + "\n").unwrap();
    }

    #[test]
    fn test_is_build_artifact() {
        assert!(is_build_artifact("dist/app.min.js"));
        assert!(is_build_artifact("types/index.d.ts"));
        assert!(is_build_artifact("package-lock.json"));
        assert!(is_build_artifact("Cargo.lock"));
        assert!(!is_build_artifact("src/app.ts"));
    }

    #[test]
    fn test_build_uses_memory_cache_on_second_call() {
        let (_tmp, paths) = workspace();
        std::fs::write(paths.root().join("a.rs"), "fn main() {}\n").unwrap();

        let builder = IndexBuilder::new(paths.clone());
        let memory = MemoryCache::new();
        let disk = DiskCache::for_workspace(&paths);

        let first = builder.build(&memory, &disk, 1_000).unwrap();
        let second = builder.build(&memory, &disk, 2_000).unwrap();
        // Same Arc: the rebuild was skipped and built_at is unchanged.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.built_at, 1_000);
    }

    #[test]
    fn test_build_loads_from_disk_cache() {
        let (_tmp, paths) = workspace();
        std::fs::write(paths.root().join("a.rs"), "fn main() {}\n").unwrap();

        let builder = IndexBuilder::new(paths.clone());
        let disk = DiskCache::for_workspace(&paths);

        let first = builder.build(&MemoryCache::new(), &disk, 1_000).unwrap();
        // Fresh memory cache: must come back from disk, not a rebuild.
        let second = builder.build(&MemoryCache::new(), &disk, 9_000).unwrap();
        assert_eq!(first.built_at, second.built_at);
        assert_eq!(first.signature, second.signature);
    }

    #[test]
    fn test_rebuild_collects_all_sources_in_order() {
        let (_tmp, paths) = workspace();

        std::fs::write(
            paths.evidence_md(),
            "┌─── OVERVIEW ───┐\nstats here\n└───┘\n",
        )
        .unwrap();
        std::fs::write(paths.timeline_md(), "## Week\n### 2026-07-01\nwork\n").unwrap();
        write_stream(
            &paths.decisions_stream(),
            &[r#"{"id":"d1","intent_text":"pick db","chosen_option":"sqlite","isoTimestamp":"2026-07-01T10:00:00Z"}"#.to_string()],
        );
        write_stream(
            &paths.chat_history_stream(),
            &[r#"{"thread_id":"t1","timestamp":1,"role":"user","content":"hello"}"#.to_string()],
        );
        write_stream(
            &paths.cli_history_stream(),
            &[r#"{"t":1,"command":"make","tool":"shell","exit_code":0}"#.to_string()],
        );
        std::fs::write(paths.root().join("lib.rs"), "fn lib() {}\n").unwrap();

        let builder = IndexBuilder::new(paths.clone());
        let index = builder
            .build(&MemoryCache::new(), &DiskCache::for_workspace(&paths), 5_000)
            .unwrap();

        let kinds: Vec<SourceKind> = index.chunks.iter().map(|c| c.meta.source).collect();
        // Fixed source order: evidence, timeline, decisions, chat, cli, code.
        let first_evidence = kinds.iter().position(|k| *k == SourceKind::Evidence).unwrap();
        let first_timeline = kinds.iter().position(|k| *k == SourceKind::Timeline).unwrap();
        let first_decision = kinds.iter().position(|k| *k == SourceKind::Decisions).unwrap();
        let first_chat = kinds.iter().position(|k| *k == SourceKind::Chat).unwrap();
        let first_cli = kinds.iter().position(|k| *k == SourceKind::Cli).unwrap();
        let first_code = kinds.iter().position(|k| *k == SourceKind::Code).unwrap();
        assert!(first_evidence < first_timeline);
        assert!(first_timeline < first_decision);
        assert!(first_decision < first_chat);
        assert!(first_chat < first_cli);
        assert!(first_cli < first_code);
    }

    #[test]
    fn test_live_activity_synthetic_chunks() {
        let (_tmp, paths) = workspace();
        let now = 100 * DAY_MS;

        write_stream(
            &paths.activity_stream(),
            &[
                format!(r#"{{"t":{},"path":"src/hot.ts","sha256":"h1","linesAdded":5,"linesRemoved":1}}"#, now - 1000),
                format!(r#"{{"t":{},"path":"src/hot.ts","sha256":"h2","linesAdded":3,"linesRemoved":0}}"#, now - 500),
                // Older than 24h: excluded.
                format!(r#"{{"t":{},"path":"src/old.ts","sha256":"h3","linesAdded":9,"linesRemoved":9}}"#, now - 2 * DAY_MS),
            ],
        );
        write_stream(
            &paths.sessions_stream(),
            &[format!(
                r#"{{"burst_id":"b1","t":{},"files":["src/hot.ts"],"pattern":{{"type":"feature"}},"events_count":4,"duration_ms":60000}}"#,
                now - 800
            )],
        );

        let builder = IndexBuilder::new(paths.clone());
        let index = builder
            .build(&MemoryCache::new(), &DiskCache::for_workspace(&paths), now)
            .unwrap();

        let sessions = index
            .chunks
            .iter()
            .find(|c| c.meta.section.as_deref() == Some("LIVE SESSIONS (24H)"))
            .unwrap();
        assert!(sessions.content.contains("b1"));

        let hot = index
            .chunks
            .iter()
            .find(|c| c.meta.section.as_deref() == Some("LIVE HOT FILES (24H)"))
            .unwrap();
        assert!(hot.content.contains("src/hot.ts — 2 saves (+8/-1)"));
        assert!(!hot.content.contains("src/old.ts"));
    }

    #[test]
    fn test_file_history_chunks_require_two_versions() {
        let mut snapshot = SnapshotIndex::default();
        let meta = crate::store::VersionMeta {
            t: 1_782_864_000_000,
            total_lines: 10,
            lines_added: 10,
            lines_removed: 0,
            bytes: 100,
        };
        snapshot.record_version("once.ts", "h1", meta);
        snapshot.record_version("twice.ts", "h2", meta);
        snapshot.record_version(
            "twice.ts",
            "h3",
            crate::store::VersionMeta {
                t: 1_782_950_400_000,
                total_lines: 12,
                lines_added: 4,
                lines_removed: 2,
                bytes: 120,
            },
        );

        let chunks = file_history_chunks(&snapshot);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("Version history for twice.ts"));
        assert!(chunks[0].content.contains("1. 2026-07-01 +10/-0"));
        assert!(chunks[0].content.contains("2. 2026-07-02 +4/-2"));
        assert_eq!(chunks[0].meta.date.as_deref(), Some("2026-07-02"));
    }

    #[test]
    fn test_intent_chain_chunks() {
        let records = vec![
            IntentChainRecord {
                t: 1_782_864_000_000,
                file: "src/x.ts".to_string(),
                delta: crate::evidence::IntentDelta {
                    lines_added: 4,
                    lines_removed: 1,
                    net_change: 3,
                },
                intent_signal: Some("extend".to_string()),
                burst_id: None,
            },
            IntentChainRecord {
                t: 1_782_950_400_000,
                file: "src/x.ts".to_string(),
                delta: crate::evidence::IntentDelta {
                    lines_added: 0,
                    lines_removed: 3,
                    net_change: -3,
                },
                intent_signal: Some("revert".to_string()),
                burst_id: None,
            },
        ];

        let chunks = intent_chain_chunks(&records);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("(revert)"));
        assert_eq!(chunks[0].meta.file, "src/x.ts");
    }

    #[test]
    fn test_code_fallback_reads_live_when_uncovered() {
        let (_tmp, paths) = workspace();
        std::fs::write(paths.root().join("live.rs"), "fn live() {}\n").unwrap();

        let builder = IndexBuilder::new(paths.clone());
        let index = builder
            .build(&MemoryCache::new(), &DiskCache::for_workspace(&paths), 1_000)
            .unwrap();

        // No snapshot index at all: coverage 0 < 0.5, so the live file
        // is read directly and tagged as code.
        let code = index
            .chunks
            .iter()
            .find(|c| c.meta.source == SourceKind::Code)
            .unwrap();
        assert!(code.content.contains("fn live()"));
    }

    #[test]
    fn test_artifacts_excluded_from_code() {
        let (_tmp, paths) = workspace();
        std::fs::write(paths.root().join("app.min.js"), "var x=1;\n").unwrap();
        std::fs::write(paths.root().join("app.ts"), "const x = 1;\n").unwrap();

        let builder = IndexBuilder::new(paths.clone());
        let index = builder
            .build(&MemoryCache::new(), &DiskCache::for_workspace(&paths), 1_000)
            .unwrap();

        let code_files: Vec<&str> = index
            .chunks
            .iter()
            .filter(|c| c.meta.source == SourceKind::Code)
            .map(|c| c.meta.file.as_str())
            .collect();
        assert!(code_files.contains(&"app.ts"));
        assert!(!code_files.contains(&"app.min.js"));
    }
}
