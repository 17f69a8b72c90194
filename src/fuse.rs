//! Hybrid fuser + re-ranker (C9): combine semantic and keyword result lists
//! (weighted-sum or RRF), then optionally re-rank by a multi-factor score.
//!
//! The re-ranker scores by a linear combination of weighted bonuses, the
//! same shape as a relevance scorer that blends several independent
//! signals into one number.

use std::collections::HashMap;

pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.7;
const RRF_K: usize = 60;

/// One entry in a ranked result list, ordered by descending relevance.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub id: String,
    pub rank: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    pub k: usize,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { k: RRF_K }
    }
}

/// Merge ranked lists using Reciprocal Rank Fusion:
/// `score(id) = sum(1 / (k + rank(id) + 1))` over every list `id` appears
/// in.
pub fn rrf_fusion(result_lists: Vec<Vec<RankedResult>>, config: RrfConfig, limit: usize) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    for results in result_lists {
        for result in results {
            let score = 1.0 / (config.k + result.rank + 1) as f32;
            *scores.entry(result.id).or_default() += score;
        }
    }
    let mut merged: Vec<_> = scores.into_iter().collect();
    merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    merged
}

pub fn to_ranked_results<T: AsRef<str>>(results: &[(T, f32)]) -> Vec<RankedResult> {
    results
        .iter()
        .enumerate()
        .map(|(rank, (id, _))| RankedResult {
            id: id.as_ref().to_string(),
            rank,
        })
        .collect()
}

fn min_max_normalize(scores: &HashMap<String, f32>) -> HashMap<String, f32> {
    let min = scores.values().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.values().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !min.is_finite() || !max.is_finite() || (max - min).abs() < 1e-9 {
        return scores.keys().map(|k| (k.clone(), 1.0)).collect();
    }
    scores.iter().map(|(k, v)| (k.clone(), (v - min) / (max - min))).collect()
}

/// Weighted-sum fusion: each list is min-max normalized to `[0, 1]`, then
/// combined as `w*s + (1-w)*k`. An id missing from one list contributes 0
/// from that list.
pub fn weighted_sum_fusion(
    semantic: &[(String, f32)],
    keyword: &[(String, f32)],
    semantic_weight: f32,
    limit: usize,
) -> Vec<(String, f32)> {
    let semantic_map: HashMap<String, f32> = semantic.iter().cloned().collect();
    let keyword_map: HashMap<String, f32> = keyword.iter().cloned().collect();
    let norm_semantic = min_max_normalize(&semantic_map);
    let norm_keyword = min_max_normalize(&keyword_map);

    let mut ids: Vec<String> = norm_semantic.keys().chain(norm_keyword.keys()).cloned().collect();
    ids.sort();
    ids.dedup();

    let w = semantic_weight.clamp(0.0, 1.0);
    let mut combined: Vec<(String, f32)> = ids
        .into_iter()
        .map(|id| {
            let s = norm_semantic.get(&id).copied().unwrap_or(0.0);
            let k = norm_keyword.get(&id).copied().unwrap_or(0.0);
            (id, w * s + (1.0 - w) * k)
        })
        .collect();

    combined.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    combined.truncate(limit);
    combined
}

/// Signals feeding the re-ranker.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankingFactors {
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub git_recency_score: f32,
    pub is_exported: bool,
    pub is_entry_point: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RerankerWeights {
    pub semantic: f32,
    pub keyword: f32,
    pub recency: f32,
    pub exported: f32,
    pub entry_point: f32,
}

impl Default for RerankerWeights {
    fn default() -> Self {
        Self {
            semantic: 0.5,
            keyword: 0.2,
            recency: 0.1,
            exported: 0.1,
            entry_point: 0.1,
        }
    }
}

impl RerankerWeights {
    /// Normalize so the weights sum to 1 if they don't already.
    pub fn normalized(self) -> Self {
        let total = self.semantic + self.keyword + self.recency + self.exported + self.entry_point;
        if total <= 0.0 || (total - 1.0).abs() < 1e-6 {
            return self;
        }
        Self {
            semantic: self.semantic / total,
            keyword: self.keyword / total,
            recency: self.recency / total,
            exported: self.exported / total,
            entry_point: self.entry_point / total,
        }
    }
}

/// `final = clamp01(w_sem*s + w_kw*k + w_rec*r + w_exp*exported + w_ent*entry)`.
pub fn rerank_score(factors: &RankingFactors, weights: &RerankerWeights) -> f32 {
    let weights = weights.normalized();
    let score = weights.semantic * factors.semantic_score
        + weights.keyword * factors.keyword_score
        + weights.recency * factors.git_recency_score
        + weights.exported * if factors.is_exported { 1.0 } else { 0.0 }
        + weights.entry_point * if factors.is_entry_point { 1.0 } else { 0.0 };
    score.clamp(0.0, 1.0)
}

/// Exponential decay over days since modification; unknown date -> 0.5,
/// future date -> 1.0.
pub fn git_recency_score(modified_at_ms: Option<u64>, now_ms: u64, half_life_days: f32) -> f32 {
    let Some(modified_at_ms) = modified_at_ms else {
        return 0.5;
    };
    if modified_at_ms > now_ms {
        return 1.0;
    }
    let age_days = (now_ms - modified_at_ms) as f32 / (1000.0 * 60.0 * 60.0 * 24.0);
    0.5_f32.powf(age_days / half_life_days.max(1e-6))
}

/// Basename (any supported extension) matches index/main/app/server.
pub fn is_entry_point(relative_path: &str) -> bool {
    let filename = relative_path.rsplit('/').next().unwrap_or(relative_path);
    let stem = filename.split('.').next().unwrap_or(filename);
    matches!(stem, "index" | "main" | "app" | "server")
}

/// Regex probe for language-appropriate export markers.
pub fn is_exported(code: &str, language: &str) -> bool {
    match language {
        "python" => code.contains("__all__"),
        "go" => code
            .lines()
            .any(|l| {
                let trimmed = l.trim_start();
                (trimmed.starts_with("func ") || trimmed.starts_with("type ") || trimmed.starts_with("var "))
                    && trimmed
                        .split_whitespace()
                        .nth(1)
                        .and_then(|s| s.chars().next())
                        .map(|c| c.is_uppercase())
                        .unwrap_or(false)
            }),
        "rust" => code.contains("pub "),
        _ => code.contains("export "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrf_boosts_consensus_documents() {
        let list1 = vec![
            RankedResult { id: "doc1".to_string(), rank: 0 },
            RankedResult { id: "doc2".to_string(), rank: 1 },
        ];
        let list2 = vec![
            RankedResult { id: "doc1".to_string(), rank: 0 },
            RankedResult { id: "doc3".to_string(), rank: 1 },
        ];
        let merged = rrf_fusion(vec![list1, list2], RrfConfig::default(), 10);
        assert_eq!(merged[0].0, "doc1");
    }

    #[test]
    fn weighted_fusion_prefers_document_in_both_lists() {
        let semantic = vec![("a".to_string(), 0.9), ("b".to_string(), 0.9)];
        let keyword = vec![("a".to_string(), 0.9)];
        let fused = weighted_sum_fusion(&semantic, &keyword, 0.7, 10);
        assert_eq!(fused[0].0, "a");
    }

    #[test]
    fn reranker_output_is_within_unit_interval() {
        let factors = RankingFactors {
            semantic_score: 1.0,
            keyword_score: 1.0,
            git_recency_score: 1.0,
            is_exported: true,
            is_entry_point: true,
        };
        let score = rerank_score(&factors, &RerankerWeights::default());
        assert!((0.0..=1.0).contains(&score));
        assert!(score > 0.99);
    }

    #[test]
    fn entry_point_detection_matches_basenames() {
        assert!(is_entry_point("src/index.ts"));
        assert!(is_entry_point("cmd/main.go"));
        assert!(!is_entry_point("src/utils/helper.ts"));
    }

    #[test]
    fn unknown_recency_date_is_neutral() {
        assert_eq!(git_recency_score(None, 1_000, 60.0), 0.5);
    }

    #[test]
    fn future_recency_date_is_maximal() {
        assert_eq!(git_recency_score(Some(2_000), 1_000, 60.0), 1.0);
    }
}
