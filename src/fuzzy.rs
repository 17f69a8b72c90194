//! Fuzzy symbol index (C7): normalized-name Levenshtein matching over
//! indexed declarations, scored as
//! `1 - editDistance(normQuery, normName) / max(|normQuery|, |normName|)`.

use crate::util::normalize_symbol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolEntry {
    pub symbol: String,
    pub file_path: String,
    pub kind: String,
    pub line: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolHit {
    pub symbol: String,
    pub score: f32,
    pub metadata: SymbolEntry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuzzySymbolIndex {
    entries: HashMap<String, SymbolEntry>,
}

impl FuzzySymbolIndex {
    pub fn add_symbol(&mut self, entry: SymbolEntry) {
        self.entries.insert(entry.symbol.clone(), entry);
    }

    pub fn remove_symbol(&mut self, symbol: &str) {
        self.entries.remove(symbol);
    }

    /// Drop every symbol defined in `file_path`, ahead of re-ingesting or
    /// deleting it — otherwise a renamed or removed symbol lingers forever.
    pub fn remove_file(&mut self, file_path: &str) {
        self.entries.retain(|_, entry| entry.file_path != file_path);
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn get_symbols(&self) -> Vec<&SymbolEntry> {
        self.entries.values().collect()
    }

    /// `score = 1 - editDistance(normQuery, normName) / max(|normQuery|, |normName|)`;
    /// results below `threshold` are dropped.
    pub fn search(
        &self,
        pattern: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
        types_filter: Option<&[String]>,
    ) -> Vec<SymbolHit> {
        let threshold = threshold.unwrap_or(DEFAULT_THRESHOLD);
        let normalized_query = normalize_symbol(pattern);

        let mut hits: Vec<SymbolHit> = self
            .entries
            .values()
            .filter(|entry| {
                types_filter
                    .map(|types| types.iter().any(|t| t == &entry.kind))
                    .unwrap_or(true)
            })
            .filter_map(|entry| {
                let normalized_name = normalize_symbol(&entry.symbol);
                let distance = strsim::levenshtein(&normalized_query, &normalized_name) as f32;
                let max_len = normalized_query.chars().count().max(normalized_name.chars().count()) as f32;
                let score = if max_len == 0.0 { 1.0 } else { 1.0 - distance / max_len };
                if score < threshold {
                    None
                } else {
                    Some(SymbolHit {
                        symbol: entry.symbol.clone(),
                        score,
                        metadata: entry.clone(),
                    })
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
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

    fn entry(symbol: &str) -> SymbolEntry {
        SymbolEntry {
            symbol: symbol.to_string(),
            file_path: "a.ts".to_string(),
            kind: "function".to_string(),
            line: Some(1),
        }
    }

    #[test]
    fn exact_match_scores_one() {
        let mut index = FuzzySymbolIndex::default();
        index.add_symbol(entry("getUserById"));
        let hits = index.search("getUserById", None, None, None);
        assert_eq!(hits[0].score, 1.0);
    }

    #[test]
    fn fuzzy_prefix_hits_above_threshold() {
        let mut index = FuzzySymbolIndex::default();
        index.add_symbol(entry("getUserById"));
        let hits = index.search("getUsr", None, None, None);
        assert!(!hits.is_empty());
        assert!(hits[0].symbol.to_lowercase().contains("user"));
        assert!(hits[0].score > DEFAULT_THRESHOLD);
    }

    #[test]
    fn levenshtein_is_symmetric_and_zero_for_equal_strings() {
        assert_eq!(strsim::levenshtein("abc", "abc"), 0);
        assert_eq!(strsim::levenshtein("abc", "abd"), strsim::levenshtein("abd", "abc"));
    }
}
