//! Evidence streams written by the editor host.
//!
//! Every stream under `.rl4/evidence/` is JSONL with host-defined
//! camelCase field names. The record types here are deliberately
//! tolerant: unknown fields are ignored and most fields default, so a
//! half-written or older-schema line either parses or is skipped by the
//! readers, never propagated as an error.

pub mod reader;
pub mod scanner;

pub use reader::{read_jsonl, read_jsonl_with_archives, tail_jsonl};
pub use scanner::{GitIgnore, ScanConfig, ScanResult, ScannedFile, scan_workspace};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File-save record from `activity.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Epoch-millisecond save timestamp.
    pub t: i64,
    /// Saved file path, workspace-relative.
    pub path: String,
    /// SHA-256 of the saved content.
    #[serde(default)]
    pub sha256: String,
    /// Lines added by this save.
    #[serde(rename = "linesAdded", default)]
    pub lines_added: u32,
    /// Lines removed by this save.
    #[serde(rename = "linesRemoved", default)]
    pub lines_removed: u32,
    /// Host-assigned save kind, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Burst pattern label from the host's classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternInfo {
    /// Pattern type, e.g. `refactor`, `feature`, `debug`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Classifier extras, preserved as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Burst record from `sessions.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstRecord {
    /// Burst identifier.
    pub burst_id: String,
    /// Epoch-millisecond burst start.
    pub t: i64,
    /// Files touched in the burst.
    #[serde(default)]
    pub files: Vec<String>,
    /// Pattern label, if classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternInfo>,
    /// Number of save events in the burst.
    #[serde(default)]
    pub events_count: u32,
    /// Burst duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl BurstRecord {
    /// Whether this burst carries a refactor pattern label.
    #[must_use]
    pub fn is_refactor(&self) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|p| p.kind.eq_ignore_ascii_case("refactor"))
    }
}

/// Chat message from `chat_history.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Thread identifier.
    pub thread_id: String,
    /// Epoch-millisecond message timestamp.
    #[serde(default)]
    pub timestamp: i64,
    /// Message role (`user`, `assistant`, ...).
    #[serde(default)]
    pub role: String,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// Chat provider name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Thread summary from `chat_threads.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatThread {
    /// Thread key.
    pub thread_key: String,
    /// Thread title.
    #[serde(default)]
    pub title: String,
    /// Message count.
    #[serde(default)]
    pub count: u32,
    /// Chat provider name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Epoch-millisecond first message timestamp.
    #[serde(rename = "firstMs", default)]
    pub first_ms: i64,
    /// Epoch-millisecond last message timestamp.
    #[serde(rename = "lastMs", default)]
    pub last_ms: i64,
    /// Topic keywords.
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Shell command record from `cli_history.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliRecord {
    /// Epoch-millisecond command timestamp.
    pub t: i64,
    /// Command line as typed.
    #[serde(default)]
    pub command: String,
    /// Tool name (shell, task runner, ...).
    #[serde(default)]
    pub tool: String,
    /// Exit code, if the command completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// First bytes of stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_preview: Option<String>,
    /// Terminal session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Decision record from `decisions.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Decision identifier.
    pub id: String,
    /// Intent text the decision answered.
    #[serde(default)]
    pub intent_text: String,
    /// Chosen option.
    #[serde(default)]
    pub chosen_option: String,
    /// Confidence gate at decision time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_gate: Option<f64>,
    /// ISO-8601 decision timestamp.
    #[serde(rename = "isoTimestamp", default)]
    pub iso_timestamp: String,
    /// Originating chat thread, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Per-save delta block inside an intent-chain record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDelta {
    /// Lines added.
    #[serde(rename = "linesAdded", default)]
    pub lines_added: i64,
    /// Lines removed.
    #[serde(rename = "linesRemoved", default)]
    pub lines_removed: i64,
    /// Net line change.
    #[serde(rename = "netChange", default)]
    pub net_change: i64,
}

/// Per-save file-change record from `intent_chains.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentChainRecord {
    /// Epoch-millisecond save timestamp.
    pub t: i64,
    /// Saved file path.
    pub file: String,
    /// Line-change delta.
    #[serde(default)]
    pub delta: IntentDelta,
    /// Host-inferred intent signal (`revert`, `extend`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_signal: Option<String>,
    /// Burst the save belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_id: Option<String>,
}

/// Chat-to-file causal inference from `.internal/causal_links.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalLinkRecord {
    /// Epoch-millisecond inference timestamp.
    #[serde(default)]
    pub t: i64,
    /// Chat thread the inference came from.
    #[serde(default)]
    pub thread_id: String,
    /// File the thread is inferred to have caused changes on.
    pub file: String,
    /// Inference text.
    #[serde(default)]
    pub inference: String,
}

/// Agent tool-call audit record for `agent_actions.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentActionRecord {
    /// Epoch-millisecond call timestamp.
    pub t: i64,
    /// Operation name.
    pub op: String,
    /// Short digest of the arguments.
    #[serde(default)]
    pub args_digest: String,
    /// `ok` or an error label.
    #[serde(default)]
    pub outcome: String,
}
