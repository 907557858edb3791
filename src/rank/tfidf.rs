//! Pre-tokenized TF-IDF structure.
//!
//! Term-frequency maps and term sets are computed once per chunk when
//! the engine is built, so query scoring costs
//! O((unique query terms × N) + (N × |query|)) with no re-tokenization.

use crate::query::tokenize;
use std::collections::{HashMap, HashSet};

/// A ranked search hit.
pub type Hit = (String, f64);

/// Cached TF-IDF index over chunk documents.
#[derive(Debug, Default)]
pub struct TfIdfIndex {
    /// Document ids, in insertion order.
    ids: Vec<String>,
    /// Per-document term frequency, normalized by document length.
    term_freqs: Vec<HashMap<String, f64>>,
    /// Per-document term sets for document-frequency lookups.
    term_sets: Vec<HashSet<String>>,
}

impl TfIdfIndex {
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

    /// Adds one document, tokenizing and caching its term structure.
    pub fn add_document(&mut self, id: &str, content: &str) {
        let tokens = tokenize(content);
        #[allow(clippy::cast_precision_loss)]
        let doc_len = (tokens.len() as f64).max(1.0);

        let mut counts: HashMap<String, f64> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        for value in counts.values_mut() {
            *value /= doc_len;
        }

        self.ids.push(id.to_string());
        self.term_sets.push(counts.keys().cloned().collect());
        self.term_freqs.push(counts);
    }

    /// Inverse document frequency: `ln(N / df)`, 0 for unseen terms.
    #[must_use]
    pub fn idf(&self, term: &str) -> f64 {
        if self.ids.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.ids.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let df = self
            .term_sets
            .iter()
            .filter(|set| set.contains(term))
            .count() as f64;
        if df == 0.0 { 0.0 } else { (n / df).ln() }
    }

    /// Returns the top `limit` documents by `Σ tf(t, d) · idf(t)`,
    /// sorted descending with insertion-order ties.
    #[must_use]
    pub fn search(&self, query_terms: &[String], limit: usize) -> Vec<Hit> {
        if self.ids.is_empty() || query_terms.is_empty() {
            return Vec::new();
        }

        // IDF once per unique query term.
        let unique: HashSet<&String> = query_terms.iter().collect();
        let idfs: HashMap<&String, f64> =
            unique.into_iter().map(|term| (term, self.idf(term))).collect();

        let mut hits: Vec<Hit> = self
            .ids
            .iter()
            .enumerate()
            .filter_map(|(doc_index, id)| {
                let freqs = &self.term_freqs[doc_index];
                let score: f64 = idfs
                    .iter()
                    .map(|(term, idf)| freqs.get(term.as_str()).copied().unwrap_or(0.0) * idf)
                    .sum();
                (score > 0.0).then(|| (id.clone(), score))
            })
            .collect();

        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> TfIdfIndex {
        let mut index = TfIdfIndex::new();
        index.add_document("a", "fn alpha beta gamma");
        index.add_document("b", "alpha alpha beta");
        index.add_document("c", "unrelated words entirely");
        index
    }

    #[test]
    fn test_idf_rare_beats_common() {
        let index = sample_index();
        // gamma appears in 1 doc, alpha in 2.
        assert!(index.idf("gamma") > index.idf("alpha"));
        assert!((index.idf("missing") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_search_ranks_by_tf_and_idf() {
        let index = sample_index();
        let hits = index.search(&["alpha".to_string()], 10);
        assert_eq!(hits.len(), 2);
        // Doc b has higher normalized tf for alpha.
        assert_eq!(hits[0].0, "b");
    }

    #[test]
    fn test_search_empty_inputs() {
        let index = sample_index();
        assert!(index.search(&[], 10).is_empty());
        assert!(TfIdfIndex::new().search(&["x".to_string()], 10).is_empty());
    }

    #[test]
    fn test_search_no_hits_for_unknown_terms() {
        let index = sample_index();
        assert!(index.search(&["zzz".to_string()], 10).is_empty());
    }

    #[test]
    fn test_duplicate_query_terms_counted_once() {
        let index = sample_index();
        let once = index.search(&["gamma".to_string()], 10);
        let twice = index.search(&["gamma".to_string(), "gamma".to_string()], 10);
        assert!((once[0].1 - twice[0].1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_search_limit() {
        let mut index = TfIdfIndex::new();
        for i in 0..10 {
            index.add_document(&format!("d{i}"), "token shared");
        }
        assert_eq!(index.search(&["shared".to_string()], 3).len(), 3);
    }

    #[test]
    fn test_len_and_empty() {
        assert!(TfIdfIndex::new().is_empty());
        assert_eq!(sample_index().len(), 3);
    }
}
