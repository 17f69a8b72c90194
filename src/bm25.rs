//! Keyword index (C6): an inverted index scored with Okapi BM25
//! (k1=1.2, b=0.75 by default).
//!
//! A counting tokenizer backs both the inverted index and chunk token
//! estimates, so scoring and budgeting always agree on what a "token" is.

use crate::util::tokenize_counts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Posting {
    doc_id: String,
    term_frequency: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TermEntry {
    postings: Vec<Posting>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordHit {
    pub id: String,
    pub score: f32,
}

/// Document count / average length / term count, the `getStats`-equivalent
/// snapshot of the index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeywordIndexStats {
    pub document_count: usize,
    pub average_document_length: f32,
    pub term_count: usize,
}

/// The inverted index plus the per-document bookkeeping BM25 needs
/// (document length, corpus size, average document length).
///
/// Documents are indexed one per chunk, keyed by `chunk.id`, mirroring the
/// vector store's granularity; `file_documents` tracks which doc ids came
/// from which file so a whole file's postings can be dropped ahead of
/// re-ingesting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordIndex {
    params: Option<Bm25Params>,
    terms: HashMap<String, TermEntry>,
    doc_lengths: HashMap<String, usize>,
    total_doc_length: usize,
    #[serde(default)]
    file_documents: HashMap<String, Vec<String>>,
}

impl KeywordIndex {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params: Some(params),
            ..Default::default()
        }
    }

    fn params(&self) -> Bm25Params {
        self.params.unwrap_or_default()
    }

    /// Replaces any existing document with the same id.
    pub fn add_document(&mut self, id: &str, text: &str) {
        self.remove_document(id);

        let mut counts = HashMap::new();
        let doc_len = tokenize_counts(text, &mut counts);
        if doc_len == 0 {
            return;
        }

        for (term, term_frequency) in counts {
            self.terms.entry(term).or_default().postings.push(Posting {
                doc_id: id.to_string(),
                term_frequency,
            });
        }
        self.doc_lengths.insert(id.to_string(), doc_len);
        self.total_doc_length += doc_len;
    }

    pub fn add_documents(&mut self, docs: &[(String, String)]) {
        for (id, text) in docs {
            self.add_document(id, text);
        }
    }

    /// Indexes one chunk document and records it against `file_path`, so a
    /// later `remove_file(file_path)` can drop it along with the rest of
    /// that file's chunks.
    pub fn add_chunk_document(&mut self, file_path: &str, id: &str, text: &str) {
        self.add_document(id, text);
        self.file_documents.entry(file_path.to_string()).or_default().push(id.to_string());
    }

    /// Leaves state equivalent to `id` never having been added.
    pub fn remove_document(&mut self, id: &str) {
        if let Some(doc_len) = self.doc_lengths.remove(id) {
            self.total_doc_length -= doc_len;
        } else {
            return;
        }
        self.terms.retain(|_, entry| {
            entry.postings.retain(|p| p.doc_id != id);
            !entry.postings.is_empty()
        });
    }

    /// Drop every chunk document indexed for `file_path`, ahead of
    /// re-ingesting or deleting it.
    pub fn remove_file(&mut self, file_path: &str) {
        if let Some(ids) = self.file_documents.remove(file_path) {
            for id in ids {
                self.remove_document(&id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.terms.clear();
        self.doc_lengths.clear();
        self.total_doc_length = 0;
        self.file_documents.clear();
    }

    pub fn size(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn stats(&self) -> KeywordIndexStats {
        KeywordIndexStats {
            document_count: self.doc_lengths.len(),
            average_document_length: self.avg_doc_length(),
            term_count: self.terms.len(),
        }
    }

    fn avg_doc_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_doc_length as f32 / self.doc_lengths.len() as f32
        }
    }

    /// Descending by BM25 score; an empty query token stream yields no
    /// results.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<KeywordHit> {
        let query_terms = crate::util::tokenize(query);
        if query_terms.is_empty() || self.doc_lengths.is_empty() {
            return Vec::new();
        }

        let params = self.params();
        let n = self.doc_lengths.len() as f32;
        let avg_len = self.avg_doc_length().max(1.0);

        let mut scores: HashMap<String, f32> = HashMap::new();
        for term in &query_terms {
            let Some(entry) = self.terms.get(term) else {
                continue;
            };
            let df = entry.postings.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for posting in &entry.postings {
                let doc_len = *self.doc_lengths.get(&posting.doc_id).unwrap_or(&0) as f32;
                let tf = posting.term_frequency as f32;
                let denom = tf + params.k1 * (1.0 - params.b + params.b * (doc_len / avg_len));
                let score = idf * (tf * (params.k1 + 1.0)) / denom.max(1e-9);
                *scores.entry(posting.doc_id.clone()).or_insert(0.0) += score;
            }
        }

        let mut hits: Vec<KeywordHit> = scores
            .into_iter()
            .map(|(id, score)| KeywordHit { id, score })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        hits
    }

    pub fn serialize(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn deserialize(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_term_scores_higher_than_single_occurrence() {
        let mut index = KeywordIndex::new(Bm25Params::default());
        index.add_document("a", "user user user user user");
        index.add_document("b", "user");
        let hits = index.search("user", None);
        let score_a = hits.iter().find(|h| h.id == "a").unwrap().score;
        let score_b = hits.iter().find(|h| h.id == "b").unwrap().score;
        assert!(score_a > score_b);
    }

    #[test]
    fn exact_multi_term_match_outscores_partial_match() {
        let mut index = KeywordIndex::new(Bm25Params::default());
        index.add_document("full", "fast user lookup by id");
        index.add_document("partial", "fast lookup only");
        let hits = index.search("user lookup by id", None);
        assert_eq!(hits[0].id, "full");
    }

    #[test]
    fn readding_same_id_leaves_exactly_one_document() {
        let mut index = KeywordIndex::new(Bm25Params::default());
        index.add_document("a", "first content");
        index.add_document("a", "second content only");
        assert_eq!(index.size(), 1);
        assert!(index.search("first", None).is_empty());
        assert!(!index.search("second", None).is_empty());
    }

    #[test]
    fn removal_is_equivalent_to_never_added() {
        let mut empty = KeywordIndex::new(Bm25Params::default());
        let mut added_then_removed = KeywordIndex::new(Bm25Params::default());
        added_then_removed.add_document("a", "some content here");
        added_then_removed.remove_document("a");

        empty.add_document("b", "probe");
        added_then_removed.add_document("b", "probe");
        assert_eq!(empty.search("probe", None).len(), added_then_removed.search("probe", None).len());
        assert_eq!(added_then_removed.size(), empty.size());
    }

    #[test]
    fn empty_query_yields_no_results() {
        let mut index = KeywordIndex::new(Bm25Params::default());
        index.add_document("a", "some content");
        assert!(index.search("   ", None).is_empty());
    }

    #[test]
    fn remove_file_drops_every_chunk_document_for_that_file() {
        let mut index = KeywordIndex::new(Bm25Params::default());
        index.add_chunk_document("a.ts", "chunk1", "user lookup");
        index.add_chunk_document("a.ts", "chunk2", "user create");
        index.add_chunk_document("b.ts", "chunk3", "user delete");
        assert_eq!(index.size(), 3);

        index.remove_file("a.ts");
        assert_eq!(index.size(), 1);
        assert!(index.search("lookup", None).is_empty());
        assert!(!index.search("delete", None).is_empty());
    }

    #[test]
    fn stats_reports_document_and_term_counts() {
        let mut index = KeywordIndex::new(Bm25Params::default());
        index.add_chunk_document("a.ts", "chunk1", "user lookup by id");
        let stats = index.stats();
        assert_eq!(stats.document_count, 1);
        assert!(stats.term_count >= 3);
        assert!(stats.average_document_length > 0.0);
    }
}
