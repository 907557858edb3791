//! Chat transcript chunker.
//!
//! Messages are grouped by thread and flushed into chunks by a
//! byte-budget accumulator: a chunk closes when the next message would
//! push it over the budget (~4KB) or when the per-chunk message cap is
//! reached. Each chunk records the first and last timestamp of its
//! window, and its range string incorporates the thread id plus index
//! bounds so re-chunking the same input reproduces the same ids.

use crate::chunker::ms_to_iso_date;
use crate::core::{Chunk, ChunkMeta, SourceKind};
use crate::evidence::ChatMessage;
use std::collections::BTreeMap;

/// Byte budget per chat chunk.
pub const CHAT_BYTE_BUDGET: usize = 4 * 1024;

/// Default message cap per chat chunk.
pub const CHAT_MESSAGE_CAP: usize = 20;

/// Chunks chat messages with the default budget and cap.
#[must_use]
pub fn chunk_chat(messages: &[ChatMessage], file: &str) -> Vec<Chunk> {
    chunk_chat_with(messages, file, CHAT_BYTE_BUDGET, CHAT_MESSAGE_CAP)
}

/// Chunks chat messages with an explicit byte budget and message cap.
#[must_use]
pub fn chunk_chat_with(
    messages: &[ChatMessage],
    file: &str,
    byte_budget: usize,
    message_cap: usize,
) -> Vec<Chunk> {
    // Group by thread, preserving stream order within each thread.
    let mut threads: BTreeMap<&str, Vec<(usize, &ChatMessage)>> = BTreeMap::new();
    for (index, message) in messages.iter().enumerate() {
        threads
            .entry(message.thread_id.as_str())
            .or_default()
            .push((index, message));
    }

    let mut chunks = Vec::new();
    for (thread_id, thread_messages) in threads {
        let mut window: Vec<(usize, &ChatMessage)> = Vec::new();
        let mut window_bytes = 0_usize;

        for (index, message) in thread_messages {
            let rendered_len = rendered_message_len(message);
            let over_budget =
                !window.is_empty() && window_bytes + rendered_len > byte_budget;
            let over_cap = window.len() >= message_cap;

            if over_budget || over_cap {
                flush_window(&mut chunks, file, thread_id, &window);
                window.clear();
                window_bytes = 0;
            }

            window_bytes += rendered_len;
            window.push((index, message));
        }
        flush_window(&mut chunks, file, thread_id, &window);
    }
    chunks
}

fn rendered_message(message: &ChatMessage) -> String {
    let role = if message.role.is_empty() {
        "?"
    } else {
        message.role.as_str()
    };
    format!("[{role}] {}", message.content)
}

fn rendered_message_len(message: &ChatMessage) -> usize {
    // "[role] content" plus the joining newline.
    rendered_message(message).len() + 1
}

fn flush_window(chunks: &mut Vec<Chunk>, file: &str, thread_id: &str, window: &[(usize, &ChatMessage)]) {
    if window.is_empty() {
        return;
    }

    let content: String = window
        .iter()
        .map(|(_, m)| rendered_message(m))
        .collect::<Vec<_>>()
        .join("\n");

    let first_ts = window.iter().map(|(_, m)| m.timestamp).min().unwrap_or(0);
    let last_ts = window.iter().map(|(_, m)| m.timestamp).max().unwrap_or(0);
    let first_index = window[0].0;
    let last_index = window[window.len() - 1].0;

    let mut meta = ChunkMeta::new(SourceKind::Chat, file)
        .thread(thread_id)
        .window(first_ts, last_ts);
    meta.date = ms_to_iso_date(first_ts);

    let range = format!("{thread_id}:{first_index}-{last_index}");
    chunks.push(Chunk::new(content, meta, &range));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(thread: &str, ts: i64, role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            thread_id: thread.to_string(),
            timestamp: ts,
            role: role.to_string(),
            content: content.to_string(),
            provider: Some("claude".to_string()),
        }
    }

    #[test]
    fn test_single_thread_single_chunk() {
        let messages = vec![
            message("t1", 100, "user", "why is the cache stale?"),
            message("t1", 200, "assistant", "the signature ignores mtimes"),
        ];
        let chunks = chunk_chat(&messages, "chat.jsonl");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].meta.thread_id.as_deref(), Some("t1"));
        assert_eq!(chunks[0].meta.first_ts, Some(100));
        assert_eq!(chunks[0].meta.last_ts, Some(200));
        assert!(chunks[0].content.contains("[user] why is the cache stale?"));
        assert!(chunks[0].content.contains("[assistant]"));
    }

    #[test]
    fn test_threads_are_separated() {
        let messages = vec![
            message("t1", 1, "user", "a"),
            message("t2", 2, "user", "b"),
            message("t1", 3, "user", "c"),
        ];
        let chunks = chunk_chat(&messages, "chat.jsonl");

        assert_eq!(chunks.len(), 2);
        let t1 = chunks.iter().find(|c| c.meta.thread_id.as_deref() == Some("t1")).unwrap();
        assert_eq!(t1.content, "[user] a\n[user] c");
    }

    #[test]
    fn test_byte_budget_flush() {
        let big = "x".repeat(3000);
        let messages = vec![
            message("t1", 1, "user", &big),
            message("t1", 2, "user", &big),
            message("t1", 3, "user", "small"),
        ];
        let chunks = chunk_chat(&messages, "chat.jsonl");

        // Each big message is ~3KB rendered; two exceed the 4KB budget.
        assert_eq!(chunks.len(), 3);
        assert!(chunks[2].content.contains("small"));
    }

    #[test]
    fn test_message_cap_flush() {
        let messages: Vec<ChatMessage> = (0..45)
            .map(|i| message("t1", i, "user", "hi"))
            .collect();
        let chunks = chunk_chat_with(&messages, "chat.jsonl", CHAT_BYTE_BUDGET, 20);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].meta.first_ts, Some(0));
        assert_eq!(chunks[0].meta.last_ts, Some(19));
        assert_eq!(chunks[2].meta.last_ts, Some(44));
    }

    #[test]
    fn test_oversized_single_message_still_chunked() {
        let huge = "y".repeat(10_000);
        let messages = vec![message("t1", 1, "assistant", &huge)];
        let chunks = chunk_chat(&messages, "chat.jsonl");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_range_includes_thread_and_bounds() {
        let messages = vec![
            message("t1", 1, "user", "a"),
            message("t1", 2, "user", "b"),
        ];
        let once = chunk_chat(&messages, "chat.jsonl");
        let twice = chunk_chat(&messages, "chat.jsonl");
        assert_eq!(once[0].id, twice[0].id);

        // Same content in a different thread yields a different id.
        let other = vec![
            message("t9", 1, "user", "a"),
            message("t9", 2, "user", "b"),
        ];
        let other_chunks = chunk_chat(&other, "chat.jsonl");
        assert_ne!(once[0].id, other_chunks[0].id);
    }

    #[test]
    fn test_date_from_first_timestamp() {
        let messages = vec![message("t1", 1_782_864_000_000, "user", "hello")];
        let chunks = chunk_chat(&messages, "chat.jsonl");
        assert_eq!(chunks[0].meta.date.as_deref(), Some("2026-07-01"));
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_chat(&[], "chat.jsonl").is_empty());
    }
}
