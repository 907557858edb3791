//! Hybrid ranker: BM25 + TF-IDF fused by RRF, then feature-reranked.
//!
//! The hot path. A [`RankEngine`] is built per filter-set and reused
//! while both the index signature and the cheap filtered-set identity
//! (size, first id, last id) match. Query results are memoized in a
//! bounded LRU keyed by (workspace root, normalized query, filters,
//! limit).

pub mod bm25;
pub mod rerank;
pub mod rrf;
pub mod tfidf;

pub use bm25::Bm25Index;
pub use rerank::{RerankConfig, Tier, rerank};
pub use rrf::{RrfConfig, reciprocal_rank_fusion};
pub use tfidf::TfIdfIndex;

use crate::core::{Chunk, SourceKind};
use crate::index::MetadataIndex;
use crate::query::{QueryAnalysis, analyze};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// Default result limit.
pub const DEFAULT_LIMIT: usize = 10;

/// Maximum result limit.
pub const MAX_LIMIT: usize = 20;

/// Candidate window taken from each retriever and from the fused list.
const CANDIDATE_WINDOW: usize = 50;

/// Maximum memoized query results.
const QUERY_CACHE_CAPACITY: usize = 64;

/// Metadata pre-filter applied before ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    /// Restrict to one source kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceKind>,
    /// Restrict to chunks carrying this tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Restrict to chunks whose file path contains this substring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Inclusive ISO-date lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    /// Inclusive ISO-date upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

impl Filters {
    /// Filter restricted to one source kind.
    #[must_use]
    pub fn for_source(source: SourceKind) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    /// Whether a chunk passes this filter.
    #[must_use]
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if self.source.is_some_and(|s| s != chunk.meta.source) {
            return false;
        }
        if let Some(tag) = &self.tag
            && chunk.meta.tag.as_deref() != Some(tag.as_str())
        {
            return false;
        }
        if let Some(file) = &self.file
            && !chunk.meta.file.contains(file.as_str())
        {
            return false;
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            // ISO dates compare lexicographically; dateless chunks fall
            // outside any date window.
            let Some(date) = chunk.meta.date.as_deref() else {
                return false;
            };
            if self.date_from.as_deref().is_some_and(|from| date < from) {
                return false;
            }
            if self.date_to.as_deref().is_some_and(|to| date > to) {
                return false;
            }
        }
        true
    }

    /// Stable string form for cache keys.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.source.map_or("-", SourceKind::as_str),
            self.tag.as_deref().unwrap_or("-"),
            self.file.as_deref().unwrap_or("-"),
            self.date_from.as_deref().unwrap_or("-"),
            self.date_to.as_deref().unwrap_or("-"),
        )
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The chunk itself.
    pub chunk: Chunk,
    /// Fused RRF score.
    pub rrf_score: f64,
    /// Post-rerank score.
    pub rerank_score: f64,
    /// Relevance normalized to [0, 1] against the top result.
    pub relevance: f64,
    /// Relevance tier.
    pub tier: Tier,
}

/// Result of one query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Ranked results, best first.
    pub results: Vec<ScoredChunk>,
    /// Overall confidence in [0, 1].
    pub confidence: f64,
    /// Size of the filtered candidate set.
    pub considered: usize,
    /// Size of the whole index.
    pub total_chunks: usize,
    /// Whether this outcome came from the query cache.
    pub cache_hit: bool,
    /// Explanation when no results could be produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SearchOutcome {
    fn empty(considered: usize, total: usize, note: &str) -> Self {
        Self {
            results: Vec::new(),
            confidence: 0.0,
            considered,
            total_chunks: total,
            cache_hit: false,
            note: Some(note.to_string()),
        }
    }
}

/// Reusable per-filter-set retrieval engine.
#[derive(Debug)]
pub struct RankEngine {
    signature: String,
    set_len: usize,
    first_id: String,
    last_id: String,
    bm25: Bm25Index,
    tfidf: TfIdfIndex,
    chunks: Vec<Chunk>,
    by_id: HashMap<String, usize>,
}

impl RankEngine {
    /// Builds an engine over a filtered chunk list.
    ///
    /// Chunks with duplicate ids are dropped before indexing: the same
    /// file can be indexed through both the snapshot and live-scan
    /// paths, and BM25 must see each document once.
    #[must_use]
    pub fn build(signature: &str, filtered: &[Chunk]) -> Self {
        let set_len = filtered.len();
        let first_id = filtered.first().map(|c| c.id.clone()).unwrap_or_default();
        let last_id = filtered.last().map(|c| c.id.clone()).unwrap_or_default();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut chunks: Vec<Chunk> = Vec::with_capacity(filtered.len());
        for chunk in filtered {
            if seen.insert(chunk.id.as_str()) {
                chunks.push(chunk.clone());
            }
        }

        let mut bm25 = Bm25Index::new();
        let mut tfidf = TfIdfIndex::new();
        let mut by_id = HashMap::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            bm25.add_document(&chunk.id, &chunk.content, chunk.meta.tag.as_deref());
            tfidf.add_document(&chunk.id, &chunk.content);
            by_id.insert(chunk.id.clone(), index);
        }

        debug!(docs = chunks.len(), signature, "rank engine built");
        Self {
            signature: signature.to_string(),
            set_len,
            first_id,
            last_id,
            bm25,
            tfidf,
            chunks,
            by_id,
        }
    }

    /// Cheap engine-identity check: signature plus (size, first id,
    /// last id) of the filtered set.
    #[must_use]
    pub fn matches(&self, signature: &str, filtered: &[Chunk]) -> bool {
        self.signature == signature
            && self.set_len == filtered.len()
            && filtered.first().map(|c| c.id.as_str()).unwrap_or_default() == self.first_id
            && filtered.last().map(|c| c.id.as_str()).unwrap_or_default() == self.last_id
    }

    /// Executes the ranked retrieval pipeline.
    #[must_use]
    pub fn query(
        &self,
        analysis: &QueryAnalysis,
        limit: usize,
        now_ms: i64,
    ) -> (Vec<ScoredChunk>, f64) {
        let bm25_hits = self.bm25.search(&analysis.expanded_terms, CANDIDATE_WINDOW);
        let tfidf_hits = self.tfidf.search(&analysis.expanded_terms, CANDIDATE_WINDOW);

        let bm25_ranked: Vec<&str> = bm25_hits.iter().map(|(id, _)| id.as_str()).collect();
        let tfidf_ranked: Vec<&str> = tfidf_hits.iter().map(|(id, _)| id.as_str()).collect();

        let fused = reciprocal_rank_fusion(&[&bm25_ranked, &tfidf_ranked], &RrfConfig::default());
        let top_rrf = fused.first().map_or(0.0, |(_, score)| *score);
        let rrf_by_id: HashMap<&str, f64> = fused.iter().map(|(id, s)| (*id, *s)).collect();

        let candidates: Vec<&Chunk> = fused
            .iter()
            .take(CANDIDATE_WINDOW)
            .filter_map(|(id, _)| self.by_id.get(*id).map(|&index| &self.chunks[index]))
            .collect();

        let reranked = rerank(&candidates, analysis, &RerankConfig::default(), now_ms);
        let top_rerank = reranked.first().map_or(0.0, |(_, score)| *score);

        let results: Vec<ScoredChunk> = reranked
            .into_iter()
            .take(limit)
            .filter_map(|(id, rerank_score)| {
                let index = *self.by_id.get(id.as_str())?;
                let relevance = if top_rerank > 0.0 {
                    (rerank_score / top_rerank).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                Some(ScoredChunk {
                    chunk: self.chunks[index].clone(),
                    rrf_score: rrf_by_id.get(id.as_str()).copied().unwrap_or(0.0),
                    rerank_score,
                    relevance,
                    tier: Tier::from_relevance(relevance),
                })
            })
            .collect();

        // Confidence against the best possible single-source agreement:
        // an item ranked first in both lists scores 2/(k+1).
        let k = f64::from(RrfConfig::default().k);
        let confidence = (top_rrf / (2.0 / (k + 1.0))).min(1.0);
        (results, confidence)
    }
}

/// Bounded LRU memo of query outcomes.
#[derive(Debug)]
struct QueryCache {
    capacity: usize,
    map: HashMap<String, SearchOutcome>,
    order: VecDeque<String>,
}

impl QueryCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<SearchOutcome> {
        if let Some(outcome) = self.map.get(key) {
            let outcome = outcome.clone();
            self.order.retain(|k| k != key);
            self.order.push_back(key.to_string());
            return Some(outcome);
        }
        None
    }

    fn put(&mut self, key: String, outcome: SearchOutcome) {
        if self.map.len() >= self.capacity
            && !self.map.contains_key(&key)
            && let Some(evicted) = self.order.pop_front()
        {
            self.map.remove(&evicted);
        }
        self.order.retain(|k| k != &key);
        self.order.push_back(key.clone());
        self.map.insert(key, outcome);
    }
}

/// Query entry point owning the engine slot and the semantic cache.
#[derive(Debug)]
pub struct Searcher {
    root: String,
    engine: Mutex<Option<RankEngine>>,
    cache: Mutex<QueryCache>,
}

impl Searcher {
    /// Creates a searcher for a workspace root.
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            engine: Mutex::new(None),
            cache: Mutex::new(QueryCache::new(QUERY_CACHE_CAPACITY)),
        }
    }

    /// Runs a query against the current index.
    #[must_use]
    pub fn search(
        &self,
        index: &MetadataIndex,
        query: &str,
        filters: &Filters,
        limit: Option<usize>,
        now_ms: i64,
    ) -> (QueryAnalysis, SearchOutcome) {
        let analysis = analyze(query);
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        if analysis.terms.is_empty() {
            let outcome =
                SearchOutcome::empty(0, index.len(), "empty query after normalization");
            return (analysis, outcome);
        }

        let cache_key = format!(
            "{}|{}|{}|{}",
            self.root,
            analysis.normalized,
            filters.cache_key(),
            limit
        );
        if let Ok(mut cache) = self.cache.lock()
            && let Some(mut outcome) = cache.get(&cache_key)
        {
            debug!(key = %cache_key, "query cache hit");
            outcome.cache_hit = true;
            return (analysis, outcome);
        }

        let filtered: Vec<Chunk> = index
            .chunks
            .iter()
            .filter(|c| filters.matches(c))
            .cloned()
            .collect();
        if filtered.is_empty() {
            let outcome = SearchOutcome::empty(
                0,
                index.len(),
                "no chunks match the requested filters",
            );
            return (analysis, outcome);
        }

        let (results, confidence) = {
            let mut slot = match self.engine.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            let reusable = slot
                .as_ref()
                .is_some_and(|e| e.matches(&index.signature, &filtered));
            if !reusable {
                *slot = Some(RankEngine::build(&index.signature, &filtered));
            }
            #[allow(clippy::unwrap_used)]
            let engine = slot.as_ref().unwrap();
            engine.query(&analysis, limit, now_ms)
        };

        let considered = filtered.len();
        let outcome = SearchOutcome {
            results,
            confidence,
            considered,
            total_chunks: index.len(),
            cache_hit: false,
            note: None,
        };
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(cache_key, outcome.clone());
        }
        (analysis, outcome)
    }
}
