//! Exposed engine operations.
//!
//! [`Engine`] is the transport-agnostic facade: every operation in the
//! external interface maps to one method. The engine owns the two-level
//! index cache, the ranker, the CRE log and state, the rate limiter,
//! and the 30-second last-selection cache that bridges `suggest_edit`
//! to `apply_edit`.

pub mod guardrail;
pub mod rate_limit;
pub mod sync;

pub use guardrail::{GuardrailKind, GuardrailVerdict, check as guardrail_check};
pub use rate_limit::RateLimiter;
pub use sync::{SyncSession, SyncTransport, TokenPair};

use crate::answer::{format_answer, related_questions};
use crate::core::{WorkspacePaths, WorkspaceRegistry};
use crate::cre::{
    CommitEvent, CreState, InterventionLog, Selection, SweepInputs, mine_lessons, resolve_pending,
    score_lessons, select_lessons,
};
use crate::error::{CommandError, Result, StoreError};
use crate::evidence::{
    ActivityRecord, AgentActionRecord, BurstRecord, CausalLinkRecord, CliRecord,
    IntentChainRecord, ScanConfig, read_jsonl, scan_workspace, tail_jsonl,
};
use crate::graph::{CouplingGraph, CouplingGraphBuilder};
use crate::index::{DiskCache, IndexBuilder, MemoryCache};
use crate::rank::{Filters, Searcher};
use crate::store::{BlobStore, SnapshotIndex, VersionMeta, content_hash};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// TTL of the cached last selection, bridging suggest → apply.
const SELECTION_TTL: Duration = Duration::from_secs(30);

/// Content cap for suggest_edit output.
const SUGGEST_CONTENT_CAP: usize = 6 * 1024;

/// JSONL streams above this size rotate into a gzip archive.
const ARCHIVE_THRESHOLD_BYTES: u64 = 4 * 1024 * 1024;

/// Default run_command timeout.
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Recent records considered when deriving commits and storms.
const RECENT_TAIL: usize = 500;

struct PendingSelection {
    file: String,
    selection: Selection,
    created: Instant,
    intervention_id: Option<String>,
}

/// The development-memory engine for one workspace.
pub struct Engine {
    paths: WorkspacePaths,
    builder: IndexBuilder,
    memory_cache: MemoryCache,
    disk_cache: DiskCache,
    searcher: Searcher,
    log: InterventionLog,
    limiter: RateLimiter,
    last_selection: Mutex<Option<PendingSelection>>,
    registry_path: Option<PathBuf>,
}

impl Engine {
    /// Opens the engine over a workspace root, creating the `.rl4`
    /// layout if missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let paths = WorkspacePaths::new(root);
        paths.ensure_layout()?;

        let builder = IndexBuilder::new(paths.clone());
        let disk_cache = DiskCache::for_workspace(&paths);
        let searcher = Searcher::new(paths.root().to_string_lossy().to_string());
        let log = InterventionLog::new(paths.interventions_log());

        Ok(Self {
            paths,
            builder,
            memory_cache: MemoryCache::new(),
            disk_cache,
            searcher,
            log,
            limiter: RateLimiter::new(),
            last_selection: Mutex::new(None),
            registry_path: None,
        })
    }

    /// Overrides scanner limits (tests, huge workspaces).
    #[must_use]
    pub fn with_scan_config(mut self, config: ScanConfig) -> Self {
        self.builder = IndexBuilder::new(self.paths.clone()).with_scan_config(config);
        self
    }

    /// Overrides the workspace-registry location (tests).
    #[must_use]
    pub fn with_registry_path(mut self, path: PathBuf) -> Self {
        self.registry_path = Some(path);
        self
    }

    /// Returns the workspace paths.
    #[must_use]
    pub const fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    #[allow(clippy::unused_self)]
    fn now_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .and_then(|d| i64::try_from(d.as_millis()).ok())
            .unwrap_or(0)
    }

    /// Appends one line to the agent-action audit log. Best effort:
    /// auditing never fails an operation.
    fn audit(&self, op: &str, args: &str, outcome: &str) {
        let record = AgentActionRecord {
            t: self.now_ms(),
            op: op.to_string(),
            args_digest: content_hash(args.as_bytes())[..12].to_string(),
            outcome: outcome.to_string(),
        };
        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };
        let appended = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.paths.agent_actions_stream())
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = appended {
            warn!(error = %e, "audit append failed");
        }
    }

    // --- dashboards -----------------------------------------------------

    /// Returns the aggregated evidence dashboard, rebuilding it when
    /// absent.
    pub fn get_evidence(&self) -> Result<String> {
        self.limiter.check("get_evidence")?;
        if !self.paths.evidence_md().exists() {
            crate::summarize::write_dashboards(&self.paths)?;
        }
        let text = crate::io::read_file(self.paths.evidence_md())?;
        self.audit("get_evidence", "", "ok");
        Ok(text)
    }

    /// Returns the timeline: a compact per-day index without a range, or
    /// the full day sections inside `[date_from, date_to]`.
    pub fn get_timeline(
        &self,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Result<String> {
        self.limiter.check("get_timeline")?;
        if !self.paths.timeline_md().exists() {
            crate::summarize::write_dashboards(&self.paths)?;
        }
        let text = crate::io::read_file(self.paths.timeline_md())?;

        let output = if date_from.is_none() && date_to.is_none() {
            let mut index = String::from("Timeline index (.rl4/timeline.md):\n");
            for line in text.lines() {
                if let Some(day) = line.strip_prefix("### ") {
                    let _ = writeln!(index, "- {day}");
                }
            }
            index
        } else {
            let mut bundle = String::new();
            let mut keep = false;
            for line in text.lines() {
                if let Some(day) = line.strip_prefix("### ") {
                    keep = date_from.is_none_or(|from| day >= from)
                        && date_to.is_none_or(|to| day <= to);
                }
                if keep {
                    bundle.push_str(line);
                    bundle.push('\n');
                }
            }
            if bundle.is_empty() {
                "No timeline entries in the requested range (.rl4/timeline.md).\n".to_string()
            } else {
                bundle
            }
        };

        self.audit("get_timeline", &format!("{date_from:?}..{date_to:?}"), "ok");
        Ok(output)
    }

    // --- coupling graph -------------------------------------------------

    /// Builds the coupling graph from the evidence streams.
    #[must_use]
    pub fn build_graph(&self) -> CouplingGraph {
        let mut builder = CouplingGraphBuilder::new();

        // Co-modifications: files saved within the same burst chain.
        let chains: Vec<IntentChainRecord> = read_jsonl(&self.paths.intent_chains_stream());
        let mut per_burst: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for record in &chains {
            if let Some(burst) = record.burst_id.as_deref() {
                per_burst.entry(burst).or_default().push(record.file.clone());
            }
        }
        for files in per_burst.values() {
            builder.add_co_modification(files);
        }

        // Shared prompts: files a chat thread was linked to.
        let links: Vec<CausalLinkRecord> = read_jsonl(&self.paths.causal_links_stream());
        let mut per_thread: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for link in &links {
            per_thread
                .entry(link.thread_id.as_str())
                .or_default()
                .push(link.file.clone());
        }
        for files in per_thread.values() {
            builder.add_shared_prompt(files);
        }

        // Burst co-edits.
        let bursts: Vec<BurstRecord> = read_jsonl(&self.paths.sessions_stream());
        for burst in &bursts {
            builder.add_burst(&burst.files);
        }

        builder.build()
    }

    /// Returns the intent graph as structured JSON: coupling pairs,
    /// per-file chains, and a summary.
    pub fn get_intent_graph(&self) -> Result<String> {
        self.limiter.check("get_intent_graph")?;
        let graph = self.build_graph();
        let chains: Vec<IntentChainRecord> = read_jsonl(&self.paths.intent_chains_stream());

        let mut per_file: BTreeMap<&str, (u32, i64, u32)> = BTreeMap::new();
        for record in &chains {
            let entry = per_file.entry(record.file.as_str()).or_default();
            entry.0 += 1;
            entry.1 += record.delta.net_change;
            if record
                .intent_signal
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("revert"))
            {
                entry.2 += 1;
            }
        }

        let file_chains: Vec<serde_json::Value> = per_file
            .iter()
            .map(|(file, (saves, net, reversals))| {
                serde_json::json!({
                    "file": file,
                    "saves": saves,
                    "netChange": net,
                    "hotScore": f64::from(*saves) + 2.0 * f64::from(*reversals),
                    "reversals": reversals,
                })
            })
            .collect();

        let total_reversals: u32 = per_file.values().map(|(_, _, r)| *r).sum();
        let value = serde_json::json!({
            "pairs": graph.edges(),
            "chains": file_chains,
            "summary": {
                "files": per_file.len(),
                "edges": graph.edges().len(),
                "reversals": total_reversals,
            },
        });

        let json = serde_json::to_string_pretty(&value).map_err(StoreError::from)?;
        crate::io::write_file(self.paths.intent_graph(), &json)?;
        self.audit("get_intent_graph", "", "ok");
        Ok(json)
    }

    // --- retrieval ------------------------------------------------------

    fn run_search(
        &self,
        query: &str,
        filters: &Filters,
        limit: Option<usize>,
        with_related: bool,
        with_stats: bool,
    ) -> Result<String> {
        let verdict = guardrail_check(query, GuardrailKind::Query);
        if !verdict.allowed {
            return Ok(format!(
                "Empty query: {}. Give me at least one word to search for.",
                verdict.reason.unwrap_or_default()
            ));
        }

        let started = Instant::now();
        let now_ms = self.now_ms();
        let index = self.builder.build(&self.memory_cache, &self.disk_cache, now_ms)?;
        let (analysis, outcome) = self.searcher.search(&index, query, filters, limit, now_ms);

        let related = if with_related {
            related_questions(&analysis, &outcome)
        } else {
            Vec::new()
        };
        let mut text = format_answer(&analysis, &outcome, &related);

        if with_stats {
            let _ = write!(
                text,
                "\n---\n{} chunks indexed, {} considered, cache {}, {} ms{}",
                outcome.total_chunks,
                outcome.considered,
                if outcome.cache_hit { "hit" } else { "miss" },
                started.elapsed().as_millis(),
                if index.truncated { ", scan truncated" } else { "" },
            );
        }
        Ok(text)
    }

    /// Full search over the corpus with metadata filters.
    pub fn search_context(&self, query: &str, filters: &Filters, limit: Option<usize>) -> Result<String> {
        self.limiter.check("search_context")?;
        let text = self.run_search(query, filters, limit, false, false)?;
        self.audit("search_context", query, "ok");
        Ok(text)
    }

    /// Search restricted to chat history.
    pub fn search_chats(&self, query: &str, limit: Option<usize>) -> Result<String> {
        self.limiter.check("search_chats")?;
        let filters = Filters::for_source(crate::core::SourceKind::Chat);
        let text = self.run_search(query, &filters, limit, false, false)?;
        self.audit("search_chats", query, "ok");
        Ok(text)
    }

    /// Search restricted to shell history.
    pub fn search_cli(&self, query: &str, limit: Option<usize>) -> Result<String> {
        self.limiter.check("search_cli")?;
        let filters = Filters::for_source(crate::core::SourceKind::Cli);
        let text = self.run_search(query, &filters, limit, false, false)?;
        self.audit("search_cli", query, "ok");
        Ok(text)
    }

    /// Full bundle: sources, synthesis directive, related questions,
    /// engine stats.
    pub fn ask(&self, query: &str, filters: &Filters, limit: Option<usize>) -> Result<String> {
        self.limiter.check("ask")?;
        let text = self.run_search(query, filters, limit, true, true)?;
        self.audit("ask", query, "ok");
        Ok(text)
    }

    // --- CRE ------------------------------------------------------------

    fn avg_days_between_saves(&self, file: &str) -> f64 {
        let saves: Vec<ActivityRecord> = read_jsonl(&self.paths.activity_stream());
        let mut times: Vec<i64> = saves.iter().filter(|s| s.path == file).map(|s| s.t).collect();
        times.sort_unstable();
        if times.len() < 2 {
            return 5.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let span_days = (times[times.len() - 1] - times[0]) as f64 / 86_400_000.0;
        #[allow(clippy::cast_precision_loss)]
        let gaps = (times.len() - 1) as f64;
        (span_days / gaps).max(0.01)
    }

    /// Selects lessons for an upcoming edit and returns the file
    /// content plus the selection with per-axis breakdowns.
    ///
    /// The selection is cached for 30 seconds so a following
    /// `apply_edit` can log it as an intervention.
    pub fn suggest_edit(&self, file_path: &str, intent: Option<&str>) -> Result<String> {
        self.limiter.check("suggest_edit")?;
        let now_ms = self.now_ms();

        let graph = self.build_graph();
        let lessons = mine_lessons(&self.paths, &graph, now_ms);
        let state = CreState::load(&self.paths.cre_state())?;
        let scored = score_lessons(
            &lessons,
            &graph,
            Some(&state),
            file_path,
            self.avg_days_between_saves(file_path),
            now_ms,
            &state.weights,
        );
        let selection = select_lessons(
            scored,
            &state.weights,
            &graph,
            crate::cre::DEFAULT_TOKEN_BUDGET,
        );

        let mut out = String::new();
        let absolute = self.paths.root().join(file_path);
        match crate::io::read_file(&absolute) {
            Ok(content) => {
                let shown = crate::io::truncate_graphemes(&content, SUGGEST_CONTENT_CAP);
                let _ = writeln!(out, "File: {file_path} ({} bytes)", content.len());
                if let Some(intent) = intent {
                    let _ = writeln!(out, "Intent: {intent}");
                }
                out.push_str("```\n");
                out.push_str(shown);
                if shown.len() < content.len() {
                    out.push_str("\n… (truncated)");
                }
                out.push_str("\n```\n");
            }
            Err(_) => {
                let _ = writeln!(out, "File: {file_path} (new file)");
            }
        }

        if state.safety.frozen {
            let _ = writeln!(
                out,
                "Note: lesson learning is paused ({}).",
                state.safety.frozen_reason.as_deref().unwrap_or("safety freeze")
            );
        }

        if selection.is_empty() {
            out.push_str("No lessons worth injecting for this file.\n");
        } else {
            let _ = writeln!(
                out,
                "Lessons ({} tokens of {} budget):",
                selection.used_tokens, selection.token_budget
            );
            for picked in &selection.selected {
                let axes = picked.scored.axes;
                let _ = writeln!(
                    out,
                    "{}. [{}] {} (score {:.3}: prox {:.2}, counter {:.2}, temporal {:.2}, gain {:.2})",
                    picked.rank,
                    picked.scored.lesson.kind,
                    picked.scored.lesson.text,
                    picked.scored.score,
                    axes.causal_proximity,
                    axes.counterfactual,
                    axes.temporal,
                    axes.info_gain,
                );
            }
        }

        if let Ok(mut slot) = self.last_selection.lock() {
            *slot = Some(PendingSelection {
                file: file_path.to_string(),
                selection,
                created: Instant::now(),
                intervention_id: None,
            });
        }

        self.audit("suggest_edit", file_path, "ok");
        Ok(out)
    }

    /// Applies an edit: backs up the pre-edit content into the blob
    /// store, writes the file, and logs the pending suggest-edit
    /// selection as an intervention.
    pub fn apply_edit(&self, file_path: &str, content: &str, description: &str) -> Result<String> {
        self.limiter.check("apply_edit")?;
        let now_ms = self.now_ms();
        let absolute = self.paths.root().join(file_path);

        // Mandatory backup of the pre-edit content.
        let store = BlobStore::open(self.paths.snapshots_dir())?;
        let mut snapshot = SnapshotIndex::load(&self.paths);
        let pre_hash = match std::fs::read(&absolute) {
            Ok(previous) => {
                let hash = store.write(&previous)?;
                let text = String::from_utf8_lossy(&previous);
                snapshot.record_version(
                    file_path,
                    &hash,
                    VersionMeta {
                        t: now_ms,
                        total_lines: u32::try_from(text.lines().count()).unwrap_or(u32::MAX),
                        lines_added: 0,
                        lines_removed: 0,
                        bytes: previous.len() as u64,
                    },
                );
                Some(hash)
            }
            Err(_) => None,
        };

        crate::io::write_file(&absolute, content)?;
        let post_hash = store.write(content.as_bytes())?;
        snapshot.record_version(
            file_path,
            &post_hash,
            VersionMeta {
                t: now_ms,
                total_lines: u32::try_from(content.lines().count()).unwrap_or(u32::MAX),
                lines_added: 0,
                lines_removed: 0,
                bytes: content.len() as u64,
            },
        );
        snapshot.save(&self.paths)?;

        // Log the fresh selection, if one is pending for this file.
        let intervention_id = self.consume_selection(file_path, now_ms)?;

        self.audit("apply_edit", file_path, "ok");
        Ok(format!(
            "applied: {file_path} ({description}) | pre-edit {} | intervention {}",
            pre_hash.as_deref().unwrap_or("none"),
            intervention_id.as_deref().unwrap_or("none"),
        ))
    }

    fn consume_selection(&self, file_path: &str, now_ms: i64) -> Result<Option<String>> {
        let pending = {
            let Ok(mut slot) = self.last_selection.lock() else {
                return Ok(None);
            };
            match slot.take() {
                Some(p) if p.file == file_path && p.created.elapsed() <= SELECTION_TTL => Some(p),
                Some(stale) => {
                    debug!(file = %stale.file, "dropping stale selection");
                    None
                }
                None => None,
            }
        };

        let Some(pending) = pending else {
            return Ok(None);
        };
        let burst_id = tail_jsonl::<BurstRecord>(&self.paths.sessions_stream(), 1)
            .pop()
            .map(|b| b.burst_id);
        let record = self
            .log
            .append(&pending.selection, file_path, burst_id.as_deref(), now_ms)?;
        Ok(record.map(|r| r.intervention_id))
    }

    /// Intervention id of the still-fresh pending selection for a file.
    #[must_use]
    pub fn pending_intervention(&self, file_path: &str) -> Option<String> {
        let slot = self.last_selection.lock().ok()?;
        slot.as_ref()
            .filter(|p| p.file == file_path && p.created.elapsed() <= SELECTION_TTL)
            .and_then(|p| p.intervention_id.clone())
    }

    /// Derives commit events from the shell history: each `git commit`
    /// claims the files saved in the preceding half hour.
    fn derive_commits(&self, saves: &[ActivityRecord]) -> Vec<CommitEvent> {
        let cli: Vec<CliRecord> = tail_jsonl(&self.paths.cli_history_stream(), RECENT_TAIL);
        cli.iter()
            .filter(|record| record.command.contains("git commit"))
            .map(|record| CommitEvent {
                t: record.t,
                files: saves
                    .iter()
                    .filter(|s| s.t <= record.t && s.t >= record.t - 30 * 60 * 1000)
                    .map(|s| s.path.clone())
                    .collect(),
            })
            .collect()
    }

    /// Resolves pending intervention outcomes and re-derives the CRE
    /// state from the log.
    ///
    /// Returns the number of records resolved by this sweep.
    pub fn resolve_outcomes(&self) -> Result<usize> {
        let now_ms = self.now_ms();
        let saves: Vec<ActivityRecord> = read_jsonl(&self.paths.activity_stream());
        let bursts: Vec<BurstRecord> = tail_jsonl(&self.paths.sessions_stream(), RECENT_TAIL);
        let commits = self.derive_commits(&saves);
        let snapshot = SnapshotIndex::load(&self.paths);

        let inputs = SweepInputs {
            saves: &saves,
            commits: &commits,
            bursts: &bursts,
            snapshot: &snapshot,
            now_ms,
        };
        let resolved = resolve_pending(&self.log, &inputs)?;

        // The state file is periodically re-derived: fold the full log,
        // then run the gated weight adaptation.
        let records = self.log.read_all()?;
        let mut state = CreState::recompute_from_logs(&records);
        crate::cre::maybe_adapt_weights(&mut state, &records, now_ms);
        state.save(&self.paths.cre_state())?;

        self.audit("resolve_outcomes", "", "ok");
        Ok(resolved.len())
    }

    // --- guardrail ------------------------------------------------------

    /// Checks a query or response against the guardrail, attaching the
    /// pending intervention id for the file when one exists.
    #[must_use]
    pub fn guardrail(
        &self,
        text: &str,
        kind: GuardrailKind,
        file_path: Option<&str>,
    ) -> GuardrailVerdict {
        let mut verdict = guardrail_check(text, kind);
        if let Some(file) = file_path {
            verdict.intervention_id = self.pending_intervention(file);
        }
        self.audit(
            "guardrail",
            text,
            if verdict.allowed { "ok" } else { "denied" },
        );
        verdict
    }

    // --- commands -------------------------------------------------------

    /// Runs a shell command with a timeout, returning
    /// `(exit_code, stdout, stderr)`.
    pub fn run_command(
        &self,
        command: &str,
        args: &[String],
        timeout_ms: Option<u64>,
    ) -> Result<(i32, String, String)> {
        self.limiter.check("run_command")?;
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS));

        let child = std::process::Command::new(command)
            .args(args)
            .current_dir(self.paths.root())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| CommandError::ExecutionFailed(format!("{command}: {e}")))?;

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(child.wait_with_output());
        });

        let output = match rx.recv_timeout(timeout) {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CommandError::ExecutionFailed(e.to_string()).into());
            }
            Err(_) => {
                self.audit("run_command", command, "timeout");
                return Err(CommandError::Timeout {
                    timeout_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
                }
                .into());
            }
        };

        self.audit("run_command", command, "ok");
        Ok((
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ))
    }

    // --- workspaces -----------------------------------------------------

    fn registry_location(&self) -> Option<PathBuf> {
        self.registry_path
            .clone()
            .or_else(WorkspaceRegistry::default_path)
    }

    /// Lists known workspaces, most recently used first.
    pub fn list_workspaces(&self) -> Result<String> {
        self.limiter.check("list_workspaces")?;
        let Some(location) = self.registry_location() else {
            return Ok("No workspace registry available.\n".to_string());
        };
        let mut registry = WorkspaceRegistry::load(&location);
        registry.touch(&self.paths, self.now_ms());
        registry.save(&location)?;

        let mut out = String::from("Workspaces:\n");
        for entry in &registry.workspaces {
            let marker = if registry.active.as_deref() == Some(entry.id.as_str()) {
                "*"
            } else {
                " "
            };
            let _ = writeln!(out, "{marker} {}  {}", entry.id, entry.root.display());
        }
        self.audit("list_workspaces", "", "ok");
        Ok(out)
    }

    /// Selects a workspace by id.
    pub fn set_workspace(&self, workspace_id: &str) -> Result<String> {
        self.limiter.check("set_workspace")?;
        let Some(location) = self.registry_location() else {
            return Err(StoreError::WorkspaceNotFound {
                id: workspace_id.to_string(),
            }
            .into());
        };
        let mut registry = WorkspaceRegistry::load(&location);
        let root = registry.select(workspace_id)?.root.clone();
        registry.save(&location)?;
        self.audit("set_workspace", workspace_id, "ok");
        Ok(format!("workspace {workspace_id} selected ({})", root.display()))
    }

    // --- snapshots ------------------------------------------------------

    /// Snapshots the current source tree into the blob store.
    pub fn run_snapshot(&self) -> Result<String> {
        self.limiter.check("run_snapshot")?;
        let now_ms = self.now_ms();
        let scan = scan_workspace(self.paths.root(), &ScanConfig::default());
        let store = BlobStore::open(self.paths.snapshots_dir())?;
        let mut snapshot = SnapshotIndex::load(&self.paths);

        let mut new_versions = 0_usize;
        for file in &scan.files {
            if crate::index::is_build_artifact(&file.rel_path) {
                continue;
            }
            let Ok(bytes) = std::fs::read(&file.abs_path) else {
                continue;
            };
            let hash = content_hash(&bytes);
            if snapshot.latest_hash(&file.rel_path) == Some(hash.as_str()) {
                continue;
            }
            store.write(&bytes)?;
            let text = String::from_utf8_lossy(&bytes);
            snapshot.record_version(
                &file.rel_path,
                &hash,
                VersionMeta {
                    t: now_ms,
                    total_lines: u32::try_from(text.lines().count()).unwrap_or(u32::MAX),
                    lines_added: 0,
                    lines_removed: 0,
                    bytes: bytes.len() as u64,
                },
            );
            new_versions += 1;
        }
        snapshot.save(&self.paths)?;

        self.audit("run_snapshot", "", "ok");
        Ok(format!(
            "snapshot: {} files scanned, {new_versions} new versions, {} tracked{}",
            scan.files.len(),
            snapshot.tracked_path_count(),
            if scan.truncated { " (scan truncated)" } else { "" },
        ))
    }

    /// Housekeeping: rotates oversized JSONL streams into gzip archives
    /// and prunes orphan blobs.
    pub fn finalize_snapshot(&self) -> Result<String> {
        self.limiter.check("finalize_snapshot")?;
        let now_ms = self.now_ms();
        let snapshot = SnapshotIndex::load(&self.paths);

        let mut rotated = 0_usize;
        for stream in [
            self.paths.chat_history_stream(),
            self.paths.cli_history_stream(),
            self.paths.activity_stream(),
        ] {
            let Ok(meta) = std::fs::metadata(&stream) else {
                continue;
            };
            if meta.len() < ARCHIVE_THRESHOLD_BYTES {
                continue;
            }
            let name = stream
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "stream".to_string());
            let archive = self
                .paths
                .archives_dir()
                .join(format!("{name}-{now_ms}.jsonl.gz"));
            let bytes = std::fs::read(&stream).map_err(|e| StoreError::ReadFailed {
                path: stream.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;

            let file = std::fs::File::create(&archive).map_err(|e| StoreError::WriteFailed {
                path: archive.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
            let mut encoder =
                flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder
                .write_all(&bytes)
                .and_then(|()| encoder.finish().map(|_| ()))
                .map_err(|e| StoreError::GzipFailed {
                    path: archive.to_string_lossy().to_string(),
                    reason: e.to_string(),
                })?;
            std::fs::write(&stream, "").map_err(|e| StoreError::WriteFailed {
                path: stream.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
            rotated += 1;
        }

        let store = BlobStore::open(self.paths.snapshots_dir())?;
        let pruned = store.prune_orphans(|hash| snapshot.references(hash))?;

        self.audit("finalize_snapshot", "", "ok");
        Ok(format!(
            "finalized: {rotated} streams archived, {pruned} orphan blobs pruned"
        ))
    }

    /// Rebuilds both dashboards from the streams.
    pub fn rebuild_dashboards(&self) -> Result<String> {
        crate::summarize::write_dashboards(&self.paths)?;
        self.audit("rebuild_dashboards", "", "ok");
        Ok("dashboards rebuilt (.rl4/evidence.md, .rl4/timeline.md)".to_string())
    }
}
