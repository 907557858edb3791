//! Error types for RL4 operations.
//!
//! This module provides a comprehensive error hierarchy using `thiserror` for
//! all engine operations including the blob store, evidence ingestion,
//! indexing, retrieval, the causal relevance engine, and CLI commands.

use thiserror::Error;

/// Result type alias for RL4 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for RL4 operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Blob store and snapshot index errors.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Evidence stream and workspace scan errors.
    #[error("evidence error: {0}")]
    Evidence(#[from] EvidenceError),

    /// Index build and cache errors.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Query analysis and retrieval errors.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Causal relevance engine errors.
    #[error("CRE error: {0}")]
    Cre(#[from] CreError),

    /// Remote context-sync errors.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Exposed-operation and CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Invalid state errors.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state.
        message: String,
    },

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Blob store and snapshot errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Blob not found by content hash.
    #[error("blob not found: {hash}")]
    BlobNotFound {
        /// Content hash that was not found.
        hash: String,
    },

    /// Workspace not found in the registry.
    #[error("workspace not found: {id}")]
    WorkspaceNotFound {
        /// Workspace identifier that was not found.
        id: String,
    },

    /// File not found on disk.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was not found.
        path: String,
    },

    /// Failed to read a file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write a file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Directory creation error.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Gzip compression or decompression error.
    #[error("gzip error: {path}: {reason}")]
    GzipFailed {
        /// Path to the archive or blob.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Serialization/deserialization of an index file failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Evidence stream errors.
///
/// Malformed JSONL lines are skipped by the readers and never surface
/// here; these variants cover failures that cannot be isolated to one
/// record.
#[derive(Error, Debug)]
pub enum EvidenceError {
    /// Evidence stream file could not be opened.
    #[error("failed to open stream: {path}: {reason}")]
    StreamOpenFailed {
        /// Path to the stream.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Archive read failure.
    #[error("failed to read archive: {path}: {reason}")]
    ArchiveFailed {
        /// Path to the archive.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Workspace scan failed before producing any entries.
    #[error("workspace scan failed: {reason}")]
    ScanFailed {
        /// Reason for failure.
        reason: String,
    },
}

/// Index build and cache errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Neither cache level matched the current signature.
    ///
    /// Internal: the builder treats this as "rebuild", never a failure.
    #[error("cache miss for signature {signature}")]
    CacheMiss {
        /// Signature that missed.
        signature: String,
    },

    /// The on-disk cache file exists but could not be decoded.
    #[error("cache file corrupt: {reason}")]
    CacheCorrupt {
        /// Reason for failure.
        reason: String,
    },

    /// Index build failure.
    #[error("index build failed: {reason}")]
    BuildFailed {
        /// Reason for failure.
        reason: String,
    },
}

/// Query analysis and retrieval errors.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The query was empty after normalization.
    #[error("empty query")]
    Empty,

    /// The query exceeded the guardrail length limit.
    #[error("query too long: {length} chars (max {max})")]
    TooLong {
        /// Actual length in characters.
        length: usize,
        /// Maximum allowed length.
        max: usize,
    },

    /// Regex compilation error in the analyzer.
    #[error("regex error: {0}")]
    Regex(String),
}

/// Causal relevance engine errors.
#[derive(Error, Debug)]
pub enum CreError {
    /// The safety guard froze learning updates.
    ///
    /// Non-fatal: selection continues while frozen.
    #[error("learning frozen: {reason}")]
    SafetyFrozen {
        /// Reason recorded at freeze time.
        reason: String,
    },

    /// Fatal I/O on the intervention log.
    ///
    /// Correctness depends on the log, so this always bubbles up.
    #[error("intervention log I/O failed: {path}: {reason}")]
    LogIo {
        /// Path to the log.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// An intervention record could not be encoded.
    #[error("intervention encoding failed: {0}")]
    Encoding(String),

    /// State file could not be decoded.
    #[error("state file corrupt: {reason}")]
    StateCorrupt {
        /// Reason for failure.
        reason: String,
    },
}

/// Remote context-sync errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Access token expired; one mutex-guarded refresh is attempted.
    #[error("authentication expired")]
    AuthExpired,

    /// Refresh already failed once; the user must reconnect.
    #[error("session invalid, reconnect required")]
    ReconnectRequired,

    /// Remote store returned an error.
    #[error("remote error: {0}")]
    Remote(String),

    /// Network deadline exceeded.
    #[error("network deadline exceeded after {seconds}s")]
    Deadline {
        /// Deadline that was exceeded, in seconds.
        seconds: u64,
    },
}

/// Exposed-operation and CLI command errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Unknown command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// Per-tool fixed-window rate limit exceeded.
    #[error("rate limited: {tool} ({limit} calls per {window_secs}s)")]
    RateLimited {
        /// Tool name that was limited.
        tool: String,
        /// Calls allowed per window.
        limit: u32,
        /// Window length in seconds.
        window_secs: u64,
    },

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// Command execution exceeded its timeout.
    #[error("command timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Output format error.
    #[error("output format error: {0}")]
    OutputFormat(String),
}

// Implement From traits for standard library errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Store(StoreError::ReadFailed {
            path: String::new(),
            reason: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(StoreError::Serialization(err.to_string()))
    }
}

impl From<regex::Error> for QueryError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidState {
            message: "test error".to_string(),
        };
        assert_eq!(err.to_string(), "invalid state: test error");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::BlobNotFound {
            hash: "abc123".to_string(),
        };
        assert_eq!(err.to_string(), "blob not found: abc123");

        let err = StoreError::WorkspaceNotFound {
            id: "ws-1".to_string(),
        };
        assert_eq!(err.to_string(), "workspace not found: ws-1");
    }

    #[test]
    fn test_cre_error_display() {
        let err = CreError::SafetyFrozen {
            reason: "reversal rate 0.40 > 0.20 + 0.15".to_string(),
        };
        assert!(err.to_string().contains("frozen"));

        let err = CreError::LogIo {
            path: "/tmp/log.jsonl".to_string(),
            reason: "disk full".to_string(),
        };
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_sync_error_display() {
        assert_eq!(SyncError::AuthExpired.to_string(), "authentication expired");
        assert!(
            SyncError::ReconnectRequired
                .to_string()
                .contains("reconnect")
        );
    }

    #[test]
    fn test_command_error_rate_limited() {
        let err = CommandError::RateLimited {
            tool: "search_context".to_string(),
            limit: 30,
            window_secs: 60,
        };
        assert!(err.to_string().contains("search_context"));
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn test_query_error_too_long() {
        let err = QueryError::TooLong {
            length: 2500,
            max: 2000,
        };
        assert!(err.to_string().contains("2500"));
        assert!(err.to_string().contains("2000"));
    }

    #[test]
    fn test_error_from_store() {
        let store_err = StoreError::BlobNotFound {
            hash: "deadbeef".to_string(),
        };
        let err: Error = store_err.into();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn test_error_from_evidence() {
        let ev_err = EvidenceError::ScanFailed {
            reason: "boom".to_string(),
        };
        let err: Error = ev_err.into();
        assert!(matches!(err, Error::Evidence(_)));
    }

    #[test]
    fn test_error_from_index() {
        let idx_err = IndexError::CacheMiss {
            signature: "0011aabb".to_string(),
        };
        let err: Error = idx_err.into();
        assert!(matches!(err, Error::Index(_)));
    }

    #[test]
    fn test_error_from_cre() {
        let cre_err = CreError::Encoding("bad record".to_string());
        let err: Error = cre_err.into();
        assert!(matches!(err, Error::Cre(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_from_regex_error_to_query_error() {
        let regex_err = regex::Regex::new("[invalid").unwrap_err();
        let err: QueryError = regex_err.into();
        assert!(matches!(err, QueryError::Regex(_)));
    }

    #[test]
    fn test_index_error_display() {
        let err = IndexError::CacheMiss {
            signature: "ffff".to_string(),
        };
        assert!(err.to_string().contains("ffff"));

        let err = IndexError::CacheCorrupt {
            reason: "truncated json".to_string(),
        };
        assert!(err.to_string().contains("truncated json"));
    }

    #[test]
    fn test_command_error_timeout() {
        let err = CommandError::Timeout { timeout_ms: 5000 };
        assert!(err.to_string().contains("5000"));
    }
}
