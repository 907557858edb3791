//! Two-level metadata-index cache.
//!
//! Both levels are keyed by a [`CacheSignature`] over the workspace root,
//! the modification times of the known evidence files, and a proxy mtime
//! for the source tree. Any input mtime change changes the signature and
//! invalidates the previous cache; any consumer that might hold stale
//! data recomputes the signature at entry.

use crate::core::WorkspacePaths;
use crate::error::{Result, StoreError};
use crate::index::MetadataIndex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// Short hash identifying one state of all index inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheSignature(String);

impl CacheSignature {
    /// Computes the signature for a workspace.
    #[must_use]
    pub fn compute(paths: &WorkspacePaths) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(paths.root().to_string_lossy().as_bytes());

        for input in paths.signature_inputs() {
            hasher.update([0x1f]);
            hasher.update(mtime_millis(&input).to_le_bytes());
        }

        hasher.update([0x1f]);
        hasher.update(tree_proxy_mtime(paths.root()).to_le_bytes());

        let digest = hasher.finalize();
        let mut hex = String::with_capacity(16);
        for byte in &digest[..8] {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// Returns the signature as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a precomputed signature string (used when loading caches).
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for CacheSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn mtime_millis(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

/// Cheap proxy for "did the source tree change": the newest mtime among
/// the root itself and its immediate child directories.
fn tree_proxy_mtime(root: &Path) -> i64 {
    let mut newest = mtime_millis(root);
    if let Ok(entries) = std::fs::read_dir(root) {
        for entry in entries.flatten() {
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                newest = newest.max(mtime_millis(&entry.path()));
            }
        }
    }
    newest
}

/// In-memory cache level: one index per engine, replaced on signature
/// change. Reads are safe under concurrency; writes happen at most once
/// per signature change.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slot: Mutex<Option<(String, Arc<MetadataIndex>)>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached index when the signature matches.
    #[must_use]
    pub fn get(&self, signature: &CacheSignature) -> Option<Arc<MetadataIndex>> {
        let slot = self.slot.lock().ok()?;
        slot.as_ref()
            .filter(|(sig, _)| sig == signature.as_str())
            .map(|(_, index)| Arc::clone(index))
    }

    /// Installs an index for a signature.
    pub fn put(&self, signature: &CacheSignature, index: Arc<MetadataIndex>) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some((signature.as_str().to_string(), index));
        }
    }

    /// Drops any cached index.
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

/// On-disk cache level at `.rl4/.cache/metadata_index.json`.
#[derive(Debug, Clone)]
pub struct DiskCache {
    path: std::path::PathBuf,
}

impl DiskCache {
    /// Creates a disk cache for a workspace.
    #[must_use]
    pub fn for_workspace(paths: &WorkspacePaths) -> Self {
        Self {
            path: paths.metadata_cache(),
        }
    }

    /// Loads the cached index when its stored signature matches.
    ///
    /// A missing, unreadable, or mismatching cache yields `None`.
    #[must_use]
    pub fn load(&self, signature: &CacheSignature) -> Option<MetadataIndex> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        let index: MetadataIndex = serde_json::from_str(&text).ok()?;
        if index.signature == signature.as_str() {
            debug!(signature = %signature, "disk cache hit");
            Some(index)
        } else {
            debug!(
                cached = %index.signature,
                current = %signature,
                "disk cache stale"
            );
            None
        }
    }

    /// Persists an index.
    pub fn store(&self, index: &MetadataIndex) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::DirectoryFailed {
                path: parent.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
        }
        let json = serde_json::to_string(index).map_err(StoreError::from)?;
        std::fs::write(&self.path, json).map_err(|e| {
            StoreError::WriteFailed {
                path: self.path.to_string_lossy().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}
