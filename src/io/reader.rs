//! File reading utilities with memory mapping support.
//!
//! All workspace reads go through [`FileReader`], which enforces a size
//! cap and picks the read strategy by file size: small files are read
//! directly, large ones through a read-only memory map.

// Memory mapping requires unsafe but is limited to read-only maps.
#![allow(unsafe_code)]

use crate::error::{Result, StoreError};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Threshold for using memory mapping (1MB).
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Maximum file size to read into memory (256MB).
const MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Bounded file reader.
///
/// # Examples
///
/// ```no_run
/// use rl4_rs::io::FileReader;
///
/// let reader = FileReader::open("notes.md").unwrap();
/// let content = reader.read_to_string().unwrap();
/// ```
pub struct FileReader {
    /// File handle.
    file: File,
    /// File size in bytes.
    size: u64,
    /// File path for error messages.
    path: String,
}

impl FileReader {
    /// Opens a file for reading with the default size cap.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, can't be opened, or
    /// exceeds the cap.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_capped(path, MAX_FILE_SIZE)
    }

    /// Opens a file for reading, rejecting files larger than `cap` bytes.
    pub fn open_capped<P: AsRef<Path>>(path: P, cap: u64) -> Result<Self> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy().to_string();

        if !path_ref.exists() {
            return Err(StoreError::FileNotFound { path: path_str }.into());
        }

        let file = File::open(path_ref).map_err(|e| StoreError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let metadata = file.metadata().map_err(|e| StoreError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let size = metadata.len();
        if size > cap {
            return Err(StoreError::ReadFailed {
                path: path_str,
                reason: format!("file too large: {size} bytes (cap: {cap} bytes)"),
            }
            .into());
        }

        Ok(Self {
            file,
            size,
            path: path_str,
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reads the file content as a string.
    pub fn read_to_string(&self) -> Result<String> {
        let bytes = self.read_to_bytes()?;
        String::from_utf8(bytes).map_err(|e| {
            StoreError::ReadFailed {
                path: self.path.clone(),
                reason: format!("invalid UTF-8: {e}"),
            }
            .into()
        })
    }

    /// Reads the file content as bytes, memory-mapping large files.
    pub fn read_to_bytes(&self) -> Result<Vec<u8>> {
        if self.size >= MMAP_THRESHOLD {
            // Safety: the map is read-only and dropped before return.
            let mmap = unsafe {
                Mmap::map(&self.file).map_err(|e| StoreError::MmapFailed {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })?
            };
            Ok(mmap.to_vec())
        } else {
            let mut file = &self.file;
            #[allow(clippy::cast_possible_truncation)]
            let mut buffer = Vec::with_capacity(self.size as usize);
            file.read_to_end(&mut buffer)
                .map_err(|e| StoreError::ReadFailed {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })?;
            Ok(buffer)
        }
    }
}

/// Reads a file to string, automatically choosing the best method.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<String> {
    FileReader::open(path)?.read_to_string()
}

/// Reads a file to string, rejecting files larger than `cap` bytes.
pub fn read_file_capped<P: AsRef<Path>>(path: P, cap: u64) -> Result<String> {
    FileReader::open_capped(path, cap)?.read_to_string()
}

/// Writes content to a file, creating parent directories if needed.
pub fn write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    let path_ref = path.as_ref();
    let path_str = path_ref.to_string_lossy().to_string();

    if let Some(parent) = path_ref.parent()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::DirectoryFailed {
            path: parent.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;
    }

    std::fs::write(path_ref, content).map_err(|e| {
        StoreError::WriteFailed {
            path: path_str,
            reason: e.to_string(),
        }
        .into()
    })
}
