//! Tail-safe, malformed-tolerant JSONL readers.
//!
//! The host appends to the live streams while the engine reads them, so
//! every reader here tolerates a partially-written final line and skips
//! malformed lines silently. Rotated archives are gzipped and read in
//! chronological order before the live stream.

use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Buffer size for the tail reader (64KB).
const TAIL_BUFFER_SIZE: u64 = 64 * 1024;

/// Parses one JSONL line, returning `None` for blank or malformed input.
fn parse_line<T: DeserializeOwned>(line: &str) -> Option<T> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Reads every valid record from a JSONL file.
///
/// A missing file yields an empty vector; malformed lines are skipped.
#[must_use]
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let Ok(file) = File::open(path) else {
        return Vec::new();
    };

    let reader = BufReader::new(file);
    reader
        .lines()
        .map_while(std::result::Result::ok)
        .filter_map(|line| parse_line(&line))
        .collect()
}

/// Returns the last `n` valid records of a JSONL file.
///
/// Seeks to `end - buffer_size` and parses forward, discarding the first
/// fragment unless the whole file fits in the buffer. Cost is
/// O(`buffer_size`), independent of file length.
#[must_use]
pub fn tail_jsonl<T: DeserializeOwned>(path: &Path, n: usize) -> Vec<T> {
    tail_jsonl_buffered(path, n, TAIL_BUFFER_SIZE)
}

/// [`tail_jsonl`] with an explicit buffer size.
#[must_use]
pub fn tail_jsonl_buffered<T: DeserializeOwned>(path: &Path, n: usize, buffer_size: u64) -> Vec<T> {
    let Ok(mut file) = File::open(path) else {
        return Vec::new();
    };
    let Ok(len) = file.metadata().map(|m| m.len()) else {
        return Vec::new();
    };

    let whole_file = len <= buffer_size;
    let start = len.saturating_sub(buffer_size);
    if file.seek(SeekFrom::Start(start)).is_err() {
        return Vec::new();
    }

    let mut text = String::new();
    if file.take(buffer_size).read_to_string(&mut text).is_err() {
        return Vec::new();
    }

    let mut lines: Vec<&str> = text.split('\n').collect();
    // The first split piece is a fragment of a line that started before
    // the seek point, unless we read the whole file.
    if !whole_file && !lines.is_empty() {
        lines.remove(0);
    }

    let mut records: Vec<T> = lines.iter().filter_map(|line| parse_line(line)).collect();
    if records.len() > n {
        records.drain(..records.len() - n);
    }
    records
}

/// Reads a full stream including its rotated archives.
///
/// Archives under `archives_dir` named `<prefix>-*.jsonl.gz` are read in
/// lexical (chronological) order before the live file. Unreadable
/// archives are skipped.
#[must_use]
pub fn read_jsonl_with_archives<T: DeserializeOwned>(
    live: &Path,
    archives_dir: &Path,
    prefix: &str,
) -> Vec<T> {
    let mut records = Vec::new();

    let mut archive_paths: Vec<_> = std::fs::read_dir(archives_dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".jsonl.gz"))
                })
                .collect()
        })
        .unwrap_or_default();
    archive_paths.sort();

    for archive in archive_paths {
        let Ok(file) = File::open(&archive) else {
            debug!(path = %archive.display(), "skipping unreadable archive");
            continue;
        };
        let reader = BufReader::new(GzDecoder::new(file));
        records.extend(
            reader
                .lines()
                .map_while(std::result::Result::ok)
                .filter_map(|line| parse_line::<T>(&line)),
        );
    }

    records.extend(read_jsonl::<T>(live));
    records
}
