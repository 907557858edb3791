//! # RL4-RS
//!
//! Proof-based development-memory engine for AI coding agents.
//!
//! RL4-RS ingests the evidence an editor host records under
//! `<workspace>/.rl4/` (file saves with content hashes, chat
//! transcripts, shell history, decisions), builds a queryable chunk
//! corpus over it plus the source tree, and answers questions with
//! cited source bundles. A causal relevance engine scores and selects
//! "lessons" to inject before edits, logs each intervention, resolves
//! its outcome from later save signals, and learns from the result.
//!
//! ## Features
//!
//! - **Retrieval**: multi-source chunking, a two-level signature-keyed
//!   cache, BM25 + TF-IDF fused by RRF, a feature reranker
//! - **Explainable by construction**: classical sparse retrieval and
//!   hand-weighted features only; no embeddings, no model calls
//! - **Causal relevance**: coupling-graph proximity, beta-binomial
//!   counterfactuals, deterministic replay, safety freezing

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod answer;
pub mod chunker;
pub mod cli;
pub mod core;
pub mod cre;
pub mod error;
pub mod evidence;
pub mod graph;
pub mod index;
pub mod io;
pub mod ops;
pub mod query;
pub mod rank;
pub mod store;
pub mod summarize;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use crate::core::{Chunk, ChunkMeta, Citation, Lesson, LessonKind, SourceKind, WorkspacePaths};

// Re-export the engine facade
pub use ops::{Engine, GuardrailKind, GuardrailVerdict};

// Re-export retrieval types
pub use index::{CacheSignature, IndexBuilder, MetadataIndex};
pub use rank::{Filters, RankEngine, ScoredChunk, SearchOutcome, Searcher, Tier};

// Re-export CRE types
pub use cre::{
    CreState, InterventionLog, InterventionRecord, Outcome, ScoringWeights, Selection,
};
