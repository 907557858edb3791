//! Content-addressed blob store.
//!
//! File snapshots are stored under `snapshots/` keyed by the SHA-256 of
//! their bytes, either as `<hash>.content` or as a gzipped
//! `<hash>.content.gz` twin. Writes are idempotent; blobs are never
//! overwritten.

use crate::error::{Result, StoreError};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Blobs at or above this size are gzipped on write.
const GZIP_THRESHOLD: usize = 4 * 1024;

/// Computes the full SHA-256 hex digest of a byte slice.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Content-addressed store over a snapshots directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Creates a store over `dir`, creating the directory if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::DirectoryFailed {
            path: dir.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { dir })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn plain_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.content"))
    }

    fn gz_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.content.gz"))
    }

    /// Writes a blob, returning its content hash.
    ///
    /// Re-writing an existing blob is a no-op. Large blobs are stored
    /// gzipped; readers transparently try both forms.
    pub fn write(&self, bytes: &[u8]) -> Result<String> {
        let hash = content_hash(bytes);
        if self.exists(&hash) {
            return Ok(hash);
        }

        if bytes.len() >= GZIP_THRESHOLD {
            let path = self.gz_path(&hash);
            let file = std::fs::File::create(&path).map_err(|e| StoreError::WriteFailed {
                path: path.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder
                .write_all(bytes)
                .and_then(|()| encoder.finish().map(|_| ()))
                .map_err(|e| StoreError::GzipFailed {
                    path: path.to_string_lossy().to_string(),
                    reason: e.to_string(),
                })?;
        } else {
            let path = self.plain_path(&hash);
            std::fs::write(&path, bytes).map_err(|e| StoreError::WriteFailed {
                path: path.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(hash)
    }

    /// Reads a blob by content hash, trying the plain form first and the
    /// gzipped twin second.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BlobNotFound`] when neither form exists.
    pub fn read(&self, hash: &str) -> Result<Vec<u8>> {
        let plain = self.plain_path(hash);
        if plain.exists() {
            return std::fs::read(&plain).map_err(|e| {
                StoreError::ReadFailed {
                    path: plain.to_string_lossy().to_string(),
                    reason: e.to_string(),
                }
                .into()
            });
        }

        let gz = self.gz_path(hash);
        if gz.exists() {
            let file = std::fs::File::open(&gz).map_err(|e| StoreError::ReadFailed {
                path: gz.to_string_lossy().to_string(),
                reason: e.to_string(),
            })?;
            let mut decoder = GzDecoder::new(file);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| StoreError::GzipFailed {
                    path: gz.to_string_lossy().to_string(),
                    reason: e.to_string(),
                })?;
            return Ok(out);
        }

        Err(StoreError::BlobNotFound {
            hash: hash.to_string(),
        }
        .into())
    }

    /// Reads a blob as UTF-8 text.
    pub fn read_text(&self, hash: &str) -> Result<String> {
        let bytes = self.read(hash)?;
        String::from_utf8(bytes).map_err(|e| {
            StoreError::ReadFailed {
                path: format!("{hash}.content"),
                reason: format!("invalid UTF-8: {e}"),
            }
            .into()
        })
    }

    /// Checks whether a blob exists in either form.
    #[must_use]
    pub fn exists(&self, hash: &str) -> bool {
        self.plain_path(hash).exists() || self.gz_path(hash).exists()
    }

    /// Removes blobs whose hash is not in `referenced`.
    ///
    /// Returns the number of orphans removed. Used by snapshot
    /// housekeeping; never touches non-blob files.
    pub fn prune_orphans<F>(&self, referenced: F) -> Result<usize>
    where
        F: Fn(&str) -> bool,
    {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::ReadFailed {
            path: self.dir.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let hash = name
                .strip_suffix(".content.gz")
                .or_else(|| name.strip_suffix(".content"));
            if let Some(hash) = hash
                && !referenced(hash)
                && std::fs::remove_file(entry.path()).is_ok()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, BlobStore) {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path().join("snapshots")).unwrap();
        (tmp, store)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_tmp, store) = store();
        let hash = store.write(b"fn main() {}").unwrap();
        assert_eq!(store.read(&hash).unwrap(), b"fn main() {}");
    }

    #[test]
    fn test_write_read_roundtrip_gzipped() {
        let (_tmp, store) = store();
        let big = "x".repeat(GZIP_THRESHOLD + 1);
        let hash = store.write(big.as_bytes()).unwrap();
        // Stored as the gz twin, read back transparently.
        assert!(store.dir().join(format!("{hash}.content.gz")).exists());
        assert!(!store.dir().join(format!("{hash}.content")).exists());
        assert_eq!(store.read(&hash).unwrap(), big.as_bytes());
    }

    #[test]
    fn test_write_is_idempotent() {
        let (_tmp, store) = store();
        let h1 = store.write(b"same bytes").unwrap();
        let h2 = store.write(b"same bytes").unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        let hash = content_hash(b"");
        assert_eq!(hash.len(), 64);
        // SHA-256 of the empty string.
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_tmp, store) = store();
        let err = store.read("deadbeef").unwrap_err();
        assert!(err.to_string().contains("blob not found"));
    }

    #[test]
    fn test_exists() {
        let (_tmp, store) = store();
        let hash = store.write(b"abc").unwrap();
        assert!(store.exists(&hash));
        assert!(!store.exists("0000"));
    }

    #[test]
    fn test_read_text() {
        let (_tmp, store) = store();
        let hash = store.write("héllo".as_bytes()).unwrap();
        assert_eq!(store.read_text(&hash).unwrap(), "héllo");
    }

    #[test]
    fn test_prune_orphans() {
        let (_tmp, store) = store();
        let keep = store.write(b"keep me").unwrap();
        let drop = store.write(b"drop me").unwrap();

        let removed = store.prune_orphans(|h| h == keep).unwrap();
        assert_eq!(removed, 1);
        assert!(store.exists(&keep));
        assert!(!store.exists(&drop));
    }
}
