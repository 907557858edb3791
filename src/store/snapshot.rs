//! Snapshot version history.
//!
//! Two JSON indices sit next to the blobs: `file_index.json` maps each
//! tracked path to its ordered content-hash list, and
//! `checksum_index.json` maps each hash to per-version metadata.
//! Both are append-only during snapshots.

use crate::core::WorkspacePaths;
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Per-version metadata recorded at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    /// Epoch-millisecond snapshot timestamp.
    pub t: i64,

    /// Total line count of this version.
    #[serde(rename = "totalLines")]
    pub total_lines: u32,

    /// Lines added relative to the previous version.
    #[serde(rename = "linesAdded")]
    pub lines_added: u32,

    /// Lines removed relative to the previous version.
    #[serde(rename = "linesRemoved")]
    pub lines_removed: u32,

    /// Byte size of this version.
    pub bytes: u64,
}

/// The per-path version history plus per-hash metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotIndex {
    /// Path → ordered list of content hashes, oldest first.
    #[serde(default)]
    pub files: BTreeMap<String, Vec<String>>,

    /// Content hash → version metadata.
    #[serde(default)]
    pub versions: BTreeMap<String, VersionMeta>,
}

impl SnapshotIndex {
    /// Loads both index files; missing files yield an empty index.
    #[must_use]
    pub fn load(paths: &WorkspacePaths) -> Self {
        let files = read_json_map(&paths.file_index());
        let versions = read_json_map(&paths.checksum_index());
        Self { files, versions }
    }

    /// Persists both index files.
    pub fn save(&self, paths: &WorkspacePaths) -> Result<()> {
        write_json(&paths.file_index(), &self.files)?;
        write_json(&paths.checksum_index(), &self.versions)?;
        Ok(())
    }

    /// Records a new version of `path`.
    ///
    /// Appends the hash to the path's history unless it already equals
    /// the latest entry; version metadata is written once per hash.
    pub fn record_version(&mut self, path: &str, hash: &str, meta: VersionMeta) {
        let history = self.files.entry(path.to_string()).or_default();
        if history.last().map(String::as_str) != Some(hash) {
            history.push(hash.to_string());
        }
        self.versions.entry(hash.to_string()).or_insert(meta);
    }

    /// Ordered version hashes for a path, oldest first.
    #[must_use]
    pub fn versions_of(&self, path: &str) -> &[String] {
        self.files.get(path).map_or(&[], Vec::as_slice)
    }

    /// Latest content hash for a path, if any.
    #[must_use]
    pub fn latest_hash(&self, path: &str) -> Option<&str> {
        self.files
            .get(path)
            .and_then(|v| v.last())
            .map(String::as_str)
    }

    /// Metadata for a content hash, if recorded.
    #[must_use]
    pub fn version_meta(&self, hash: &str) -> Option<&VersionMeta> {
        self.versions.get(hash)
    }

    /// Number of tracked paths.
    #[must_use]
    pub fn tracked_path_count(&self) -> usize {
        self.files.len()
    }

    /// Checks whether a hash is referenced by any path history.
    #[must_use]
    pub fn references(&self, hash: &str) -> bool {
        self.files.values().any(|v| v.iter().any(|h| h == hash))
    }

    /// Fraction of `scanned` paths that have at least one version.
    ///
    /// Used by the index builder to decide between snapshot blobs and a
    /// live read fallback.
    #[must_use]
    pub fn coverage(&self, scanned: &[String]) -> f64 {
        if scanned.is_empty() {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let covered = scanned
            .iter()
            .filter(|p| self.files.contains_key(p.as_str()))
            .count() as f64;
        #[allow(clippy::cast_precision_loss)]
        let total = scanned.len() as f64;
        covered / total
    }
}

fn read_json_map<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::DirectoryFailed {
            path: parent.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
    }
    let json = serde_json::to_string_pretty(value).map_err(StoreError::from)?;
    std::fs::write(path, json).map_err(|e| {
        StoreError::WriteFailed {
            path: path.to_string_lossy().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
