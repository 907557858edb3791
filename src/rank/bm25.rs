//! In-memory Okapi BM25 index.
//!
//! One document per chunk with two fields: `content` and `tag`. Tag
//! tokens are weighted double so a FIX-tagged chunk outranks a chunk
//! that merely mentions "fix" in passing. The index lives only as long
//! as its ranker engine, so everything stays in plain maps.

use crate::query::tokenize;
use std::collections::HashMap;

/// BM25 k1 parameter (term-frequency saturation).
const K1: f64 = 1.2;

/// BM25 b parameter (length normalization).
const B: f64 = 0.75;

/// Weight applied to tokens from the tag field.
const TAG_FIELD_WEIGHT: f64 = 2.0;

/// A ranked search hit.
pub type Hit = (String, f64);

/// In-memory BM25 index over chunk documents.
#[derive(Debug, Default)]
pub struct Bm25Index {
    /// Document ids, in insertion order.
    ids: Vec<String>,
    /// Weighted document lengths.
    lengths: Vec<f64>,
    /// term → (doc index, weighted term frequency) postings.
    postings: HashMap<String, Vec<(usize, f64)>>,
    /// Sum of weighted document lengths.
    total_length: f64,
}

impl Bm25Index {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Adds one document with `content` and an optional `tag` field.
    pub fn add_document(&mut self, id: &str, content: &str, tag: Option<&str>) {
        let doc_index = self.ids.len();
        self.ids.push(id.to_string());

        let mut term_weights: HashMap<String, f64> = HashMap::new();
        for token in tokenize(content) {
            *term_weights.entry(token).or_insert(0.0) += 1.0;
        }
        if let Some(tag) = tag {
            for token in tokenize(tag) {
                *term_weights.entry(token).or_insert(0.0) += TAG_FIELD_WEIGHT;
            }
        }

        let length: f64 = term_weights.values().sum();
        self.lengths.push(length);
        self.total_length += length;

        for (term, weight) in term_weights {
            self.postings.entry(term).or_default().push((doc_index, weight));
        }
    }

    /// Returns the top `limit` documents for the query terms, scored by
    /// Okapi BM25 and sorted descending with insertion-order ties.
    #[must_use]
    pub fn search(&self, query_terms: &[String], limit: usize) -> Vec<Hit> {
        if self.ids.is_empty() || query_terms.is_empty() {
            return Vec::new();
        }

        #[allow(clippy::cast_precision_loss)]
        let n = self.ids.len() as f64;
        let avgdl = (self.total_length / n).max(1.0);
        let mut scores: Vec<f64> = vec![0.0; self.ids.len()];

        for term in query_terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let df = postings.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for &(doc_index, tf) in postings {
                let norm = K1 * (1.0 - B + B * self.lengths[doc_index] / avgdl);
                scores[doc_index] += idf * (tf * (K1 + 1.0)) / (tf + norm);
            }
        }

        let mut hits: Vec<Hit> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .map(|(doc_index, score)| (self.ids[doc_index].clone(), score))
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> Bm25Index {
        let mut index = Bm25Index::new();
        index.add_document("doc-fox", "the quick brown fox jumps over the lazy dog", None);
        index.add_document("doc-ml", "machine learning is a subset of artificial intelligence", None);
        index.add_document("doc-rust", "rust is a systems programming language", None);
        index
    }

    #[test]
    fn test_search_finds_matching_doc() {
        let index = sample_index();
        let hits = index.search(&["fox".to_string()], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "doc-fox");
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn test_search_no_match_is_empty() {
        let index = sample_index();
        assert!(index.search(&["nonexistent".to_string()], 10).is_empty());
        assert!(index.search(&[], 10).is_empty());
    }

    #[test]
    fn test_rare_terms_outscore_common_ones() {
        let mut index = Bm25Index::new();
        index.add_document("a", "cache cache cache common", None);
        index.add_document("b", "cache common", None);
        index.add_document("c", "common only here", None);

        // "cache" appears in 2 of 3 docs, "common" in all 3: for a doc
        // containing both, the rarer term contributes more.
        let cache_hits = index.search(&["cache".to_string()], 10);
        let common_hits = index.search(&["common".to_string()], 10);
        assert!(cache_hits[0].1 > common_hits[0].1);
    }

    #[test]
    fn test_term_frequency_saturates() {
        let mut index = Bm25Index::new();
        index.add_document("once", "retry and other words here", None);
        index.add_document("many", "retry retry retry retry retry retry retry retry", None);

        let hits = index.search(&["retry".to_string()], 10);
        assert_eq!(hits.len(), 2);
        // Higher tf still wins, but by far less than 8x.
        let ratio = hits[0].1 / hits[1].1;
        assert!(ratio < 3.0);
    }

    #[test]
    fn test_tag_field_weighted() {
        let mut index = Bm25Index::new();
        index.add_document("tagged", "unrelated body text", Some("FIX"));
        index.add_document("mention", "a fix in the body text", None);

        let hits = index.search(&["fix".to_string()], 10);
        assert_eq!(hits[0].0, "tagged");
    }

    #[test]
    fn test_search_limit() {
        let mut index = Bm25Index::new();
        for i in 0..20 {
            index.add_document(&format!("d{i}"), "shared token here", None);
        }
        let hits = index.search(&["shared".to_string()], 5);
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn test_multi_term_query_accumulates() {
        let index = sample_index();
        let hits = index.search(&["rust".to_string(), "programming".to_string()], 10);
        assert_eq!(hits[0].0, "doc-rust");

        let single = index.search(&["rust".to_string()], 10);
        assert!(hits[0].1 > single[0].1);
    }

    #[test]
    fn test_len_and_empty() {
        let index = Bm25Index::new();
        assert!(index.is_empty());
        let index = sample_index();
        assert_eq!(index.len(), 3);
    }
}
