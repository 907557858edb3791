//! Core domain types for the development-memory engine.

pub mod chunk;
pub mod lesson;
pub mod workspace;

pub use chunk::{Chunk, ChunkMeta, Citation, SourceKind, stable_chunk_id};
pub use lesson::{Lesson, LessonKind, lesson_id, simhash64, text_fingerprint};
pub use workspace::{RL4_DIR, WorkspaceEntry, WorkspacePaths, WorkspaceRegistry};
