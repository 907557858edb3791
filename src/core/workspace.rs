//! Workspace layout and registry.
//!
//! All engine state for a workspace lives under `<workspace>/.rl4/`.
//! [`WorkspacePaths`] centralizes that layout so no other module spells
//! out a path, and the registry tracks known workspaces per user.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Name of the per-workspace state directory.
pub const RL4_DIR: &str = ".rl4";

/// Resolved paths for one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    /// Workspace root (the directory containing `.rl4/`).
    root: PathBuf,
}

impl WorkspacePaths {
    /// Creates paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Short stable workspace id derived from the root path.
    #[must_use]
    pub fn workspace_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.root.to_string_lossy().as_bytes());
        let digest = hasher.finalize();
        let mut id = String::with_capacity(12);
        for byte in &digest[..6] {
            id.push_str(&format!("{byte:02x}"));
        }
        id
    }

    /// `<root>/.rl4`.
    #[must_use]
    pub fn rl4_dir(&self) -> PathBuf {
        self.root.join(RL4_DIR)
    }

    /// Generated dashboard: `evidence.md`.
    #[must_use]
    pub fn evidence_md(&self) -> PathBuf {
        self.rl4_dir().join("evidence.md")
    }

    /// Generated journal: `timeline.md`.
    #[must_use]
    pub fn timeline_md(&self) -> PathBuf {
        self.rl4_dir().join("timeline.md")
    }

    /// Coupling pairs, chains, and summary: `intent_graph.json`.
    #[must_use]
    pub fn intent_graph(&self) -> PathBuf {
        self.rl4_dir().join("intent_graph.json")
    }

    /// Host-authored rules file: `skills.mdc`.
    #[must_use]
    pub fn skills_mdc(&self) -> PathBuf {
        self.rl4_dir().join("skills.mdc")
    }

    /// Evidence stream directory.
    #[must_use]
    pub fn evidence_dir(&self) -> PathBuf {
        self.rl4_dir().join("evidence")
    }

    /// File-save records.
    #[must_use]
    pub fn activity_stream(&self) -> PathBuf {
        self.evidence_dir().join("activity.jsonl")
    }

    /// Burst records.
    #[must_use]
    pub fn sessions_stream(&self) -> PathBuf {
        self.evidence_dir().join("sessions.jsonl")
    }

    /// Chat messages.
    #[must_use]
    pub fn chat_history_stream(&self) -> PathBuf {
        self.evidence_dir().join("chat_history.jsonl")
    }

    /// Chat thread summaries.
    #[must_use]
    pub fn chat_threads_stream(&self) -> PathBuf {
        self.evidence_dir().join("chat_threads.jsonl")
    }

    /// Shell command records.
    #[must_use]
    pub fn cli_history_stream(&self) -> PathBuf {
        self.evidence_dir().join("cli_history.jsonl")
    }

    /// Decision records.
    #[must_use]
    pub fn decisions_stream(&self) -> PathBuf {
        self.evidence_dir().join("decisions.jsonl")
    }

    /// Per-save file-change deltas.
    #[must_use]
    pub fn intent_chains_stream(&self) -> PathBuf {
        self.evidence_dir().join("intent_chains.jsonl")
    }

    /// Agent tool-call audit log.
    #[must_use]
    pub fn agent_actions_stream(&self) -> PathBuf {
        self.evidence_dir().join("agent_actions.jsonl")
    }

    /// Snapshot directory.
    #[must_use]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.rl4_dir().join("snapshots")
    }

    /// Path → ordered content-hash list.
    #[must_use]
    pub fn file_index(&self) -> PathBuf {
        self.snapshots_dir().join("file_index.json")
    }

    /// Content hash → version metadata.
    #[must_use]
    pub fn checksum_index(&self) -> PathBuf {
        self.snapshots_dir().join("checksum_index.json")
    }

    /// Blob path for a content hash; `gzipped` selects the `.gz` twin.
    #[must_use]
    pub fn blob_path(&self, hash: &str, gzipped: bool) -> PathBuf {
        let name = if gzipped {
            format!("{hash}.content.gz")
        } else {
            format!("{hash}.content")
        };
        self.snapshots_dir().join(name)
    }

    /// Internal engine directory.
    #[must_use]
    pub fn internal_dir(&self) -> PathBuf {
        self.rl4_dir().join(".internal")
    }

    /// Append-only intervention log.
    #[must_use]
    pub fn interventions_log(&self) -> PathBuf {
        self.internal_dir().join("cre_interventions.jsonl")
    }

    /// Periodically re-derived CRE state.
    #[must_use]
    pub fn cre_state(&self) -> PathBuf {
        self.internal_dir().join("cre_state.json")
    }

    /// Chat-to-file causal inferences.
    #[must_use]
    pub fn causal_links_stream(&self) -> PathBuf {
        self.internal_dir().join("causal_links.jsonl")
    }

    /// Rotated JSONL archives.
    #[must_use]
    pub fn archives_dir(&self) -> PathBuf {
        self.internal_dir().join("archives")
    }

    /// Cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.rl4_dir().join(".cache")
    }

    /// On-disk metadata-index cache.
    #[must_use]
    pub fn metadata_cache(&self) -> PathBuf {
        self.cache_dir().join("metadata_index.json")
    }

    /// The known evidence inputs whose mtimes feed the cache signature,
    /// in a fixed order.
    #[must_use]
    pub fn signature_inputs(&self) -> Vec<PathBuf> {
        vec![
            self.evidence_md(),
            self.timeline_md(),
            self.activity_stream(),
            self.sessions_stream(),
            self.chat_history_stream(),
            self.chat_threads_stream(),
            self.cli_history_stream(),
            self.decisions_stream(),
            self.intent_chains_stream(),
            self.file_index(),
        ]
    }

    /// Creates the full `.rl4` directory layout if missing.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            self.rl4_dir(),
            self.evidence_dir(),
            self.snapshots_dir(),
            self.internal_dir(),
            self.archives_dir(),
            self.cache_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::DirectoryFailed {
                path: dir.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

/// One entry in the per-user workspace registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    /// Stable workspace id.
    pub id: String,
    /// Workspace root path.
    pub root: PathBuf,
    /// Epoch-millisecond timestamp of last use.
    pub last_used: i64,
}

/// Per-user registry of known workspaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRegistry {
    /// Known workspaces, most recently used first.
    #[serde(default)]
    pub workspaces: Vec<WorkspaceEntry>,
    /// Currently selected workspace id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
}

impl WorkspaceRegistry {
    /// Default registry file location under the user state dir.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|d| d.join("rl4-rs").join("workspaces.json"))
    }

    /// Loads the registry, returning an empty one when the file is
    /// missing or unreadable.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    /// Persists the registry.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::DirectoryFailed {
                path: parent.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(StoreError::from)?;
        std::fs::write(path, json).map_err(|e| StoreError::WriteFailed {
            path: path.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Records a workspace as used now and marks it active.
    pub fn touch(&mut self, paths: &WorkspacePaths, now_ms: i64) {
        let id = paths.workspace_id();
        self.workspaces.retain(|w| w.id != id);
        self.workspaces.insert(
            0,
            WorkspaceEntry {
                id: id.clone(),
                root: paths.root().to_path_buf(),
                last_used: now_ms,
            },
        );
        self.active = Some(id);
    }

    /// Finds a workspace by id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&WorkspaceEntry> {
        self.workspaces.iter().find(|w| w.id == id)
    }

    /// Selects a workspace by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkspaceNotFound`] for unknown ids.
    pub fn select(&mut self, id: &str) -> Result<&WorkspaceEntry> {
        if self.workspaces.iter().any(|w| w.id == id) {
            self.active = Some(id.to_string());
            // Re-borrow immutably after the flag update.
            return self
                .workspaces
                .iter()
                .find(|w| w.id == id)
                .ok_or_else(|| {
                    StoreError::WorkspaceNotFound { id: id.to_string() }.into()
                });
        }
        Err(StoreError::WorkspaceNotFound { id: id.to_string() }.into())
    }
}
