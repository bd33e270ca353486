//! Hybrid search engine (§4.7): query compaction, lexical + vector
//! retrieval, graph augmentation, and reranking, tuned differently for
//! interactive "typing" queries versus deliberate "deep" queries.

pub mod graph;
pub mod reranker;

use chrono::Utc;
use std::collections::{HashMap, HashSet};

use crate::config::RetrievalOverrides;
use crate::embedding::EmbeddingRuntime;
use crate::error::Result;
use crate::models::{Partition, SourceType, Suggestion};
use crate::store::{SourceFilters, Store};

use graph::{GraphAugmentor, GraphTuning};
use reranker::Reranker;

const MAX_COMPACTED_LEN: usize = 260;
const KEYWORD_DERIVE_THRESHOLD: usize = 180;
const MAX_DERIVED_KEYWORDS: usize = 14;

#[derive(Debug, Clone, Copy)]
pub struct RetrievalTuning {
    pub vector_top_k: usize,
    pub vector_scan_limit: usize,
    pub cold_fallback_top_k: usize,
    pub cold_fallback_scan_limit: usize,
    pub cold_fallback_trigger: usize,
    pub similarity_floor: f32,
    pub lexical_limit: usize,
    pub rerank_keep: usize,
}

impl RetrievalTuning {
    pub fn typing() -> Self {
        Self {
            vector_top_k: 180,
            vector_scan_limit: 480,
            cold_fallback_top_k: 220,
            cold_fallback_scan_limit: 640,
            cold_fallback_trigger: 36,
            similarity_floor: 0.20,
            lexical_limit: 64,
            rerank_keep: 24,
        }
    }

    pub fn deep() -> Self {
        Self {
            vector_top_k: 360,
            vector_scan_limit: 960,
            cold_fallback_top_k: 420,
            cold_fallback_scan_limit: 1200,
            cold_fallback_trigger: 36,
            similarity_floor: 0.14,
            lexical_limit: 128,
            rerank_keep: 60,
        }
    }

    /// Applies the configured per-field overrides so the constants above
    /// are tunable without a rebuild.
    pub fn apply_overrides(mut self, overrides: &RetrievalOverrides, typing_mode: bool) -> Self {
        if typing_mode {
            if let Some(v) = overrides.vector_top_k_typing {
                self.vector_top_k = v;
            }
            if let Some(v) = overrides.vector_scan_limit_typing {
                self.vector_scan_limit = v;
            }
            if let Some(v) = overrides.similarity_floor_typing {
                self.similarity_floor = v as f32;
            }
        } else {
            if let Some(v) = overrides.vector_top_k_deep {
                self.vector_top_k = v;
            }
            if let Some(v) = overrides.vector_scan_limit_deep {
                self.vector_scan_limit = v;
            }
            if let Some(v) = overrides.similarity_floor_deep {
                self.similarity_floor = v as f32;
            }
        }
        self
    }
}

pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub source_filters: SourceFilters,
    pub limit: usize,
    pub typing_mode: bool,
    pub include_cold_partition_fallback: bool,
    pub retrieval_overrides: &'a RetrievalOverrides,
}

pub struct HybridSearchEngine<'a> {
    store: &'a Store,
    embedding: &'a EmbeddingRuntime,
}

impl<'a> HybridSearchEngine<'a> {
    pub fn new(store: &'a Store, embedding: &'a EmbeddingRuntime) -> Self {
        Self { store, embedding }
    }

    pub async fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<Suggestion>> {
        let compacted = compact_query(request.query);
        let tuning = if request.typing_mode {
            RetrievalTuning::typing()
        } else {
            RetrievalTuning::deep()
        }
        .apply_overrides(request.retrieval_overrides, request.typing_mode);

        let lexical_partitions: Vec<Partition> = if request.typing_mode {
            vec![Partition::Hot, Partition::Warm]
        } else {
            vec![Partition::Hot, Partition::Warm, Partition::Cold]
        };
        let lexical_hits = self
            .store
            .lexical_search(&compacted, &request.source_filters, &lexical_partitions, tuning.lexical_limit)
            .await?;

        let (query_vectors, _backend) = self.embedding.embed(vec![compacted.clone()]).await;
        let query_vector = query_vectors.into_iter().next().unwrap_or_default();

        let mut vector_hits = self
            .store
            .top_chunk_vectors_by_similarity(
                &query_vector,
                &[Partition::Hot, Partition::Warm],
                tuning.vector_top_k,
                tuning.vector_scan_limit,
                tuning.similarity_floor,
            )
            .await?;

        if vector_hits.len() < tuning.cold_fallback_trigger && request.include_cold_partition_fallback {
            vector_hits = self
                .store
                .top_chunk_vectors_by_similarity(
                    &query_vector,
                    &[Partition::Hot, Partition::Warm, Partition::Cold],
                    tuning.cold_fallback_top_k,
                    tuning.cold_fallback_scan_limit,
                    tuning.similarity_floor,
                )
                .await?;
        }

        let now = Utc::now();
        let mut merged: HashMap<String, Suggestion> = HashMap::new();

        for (rank, hit) in lexical_hits.iter().enumerate() {
            let recency = recency_weight(hit.updated_at);
            let score = (1.0 / (rank as f64 + 1.0)) * 0.72 + recency * 0.12;
            merged.insert(
                hit.document_id.clone(),
                Suggestion {
                    id: hit.document_id.clone(),
                    document_id: hit.document_id.clone(),
                    source_type: hit.source_type,
                    title: hit.title.clone(),
                    snippet: hit.snippet.clone(),
                    file_path: file_path_for(hit.source_type, &hit.source_path_or_handle),
                    score,
                    reasons: vec!["lexical".to_string(), "recency".to_string()],
                    updated_at: hit.updated_at,
                },
            );
        }

        for hit in &vector_hits {
            let recency = recency_weight(hit.updated_at);
            let score = hit.similarity as f64 * 0.62 + recency * 0.06;
            merged
                .entry(hit.document_id.clone())
                .and_modify(|existing| {
                    existing.score = existing.score.max(score) + existing.score.min(score) * 0.2;
                    existing.updated_at = hit.updated_at;
                    if !existing.reasons.contains(&"vector".to_string()) {
                        existing.reasons.push("vector".to_string());
                    }
                })
                .or_insert_with(|| Suggestion {
                    id: hit.document_id.clone(),
                    document_id: hit.document_id.clone(),
                    source_type: hit.source_type,
                    title: hit.title.clone(),
                    snippet: hit.chunk_text.clone(),
                    file_path: file_path_for(hit.source_type, &hit.source_path_or_handle),
                    score,
                    reasons: vec!["vector".to_string()],
                    updated_at: hit.updated_at,
                });
        }

        self.apply_graph_boost(&mut merged, request.typing_mode).await;

        let suggestions: Vec<Suggestion> = merged.into_values().collect();
        let reranked = Reranker::rerank(request.query, suggestions, tuning.rerank_keep, now);

        let mut truncated = reranked;
        truncated.truncate(request.limit);
        Ok(truncated)
    }

    async fn apply_graph_boost(&self, merged: &mut HashMap<String, Suggestion>, typing_mode: bool) {
        let tuning = if typing_mode { GraphTuning::typing() } else { GraphTuning::deep() };
        let eligibility_floor = tuning.eligibility_similarity_floor;

        let mut seeds: Vec<(String, f64)> = merged.iter().map(|(id, s)| (id.clone(), s.score)).collect();
        seeds.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let seed_ids: Vec<String> = seeds.into_iter().map(|(id, _)| id).collect();

        let augmentor = GraphAugmentor::new(self.store);
        let graph_scores = augmentor.score(&seed_ids, &tuning).await;

        for (id, graph_score) in &graph_scores {
            if let Some(suggestion) = merged.get_mut(id) {
                let eligible = suggestion.reasons.iter().any(|r| r == "lexical") || suggestion.score >= eligibility_floor;
                let boost = GraphAugmentor::boost_for(*graph_score, suggestion.score, eligible, &tuning);
                if boost > 0.0 {
                    suggestion.score += boost;
                    suggestion.reasons.push("graph".to_string());
                }
            }
        }
    }
}

/// `sourcePathOrHandle` is a real filesystem path only for file-backed
/// documents; for other source types it's an opaque handle, not
/// something a caller should treat as an attachable file.
fn file_path_for(source_type: SourceType, source_path_or_handle: &str) -> Option<String> {
    (source_type == SourceType::File).then(|| source_path_or_handle.to_string())
}

/// Linear decay: documents updated "now" weight 1.0, documents older
/// than 180 days weight ~0 (matches the hot/warm/cold partition
/// horizon used elsewhere so recency weighting stays consistent with
/// partitioning).
fn recency_weight(updated_at: chrono::DateTime<Utc>) -> f64 {
    let age_days = (Utc::now() - updated_at).num_seconds() as f64 / 86_400.0;
    (1.0 - (age_days / 180.0)).clamp(0.0, 1.0)
}

/// Normalizes whitespace, strips punctuation except `_-`; for long
/// queries, derives up to 14 unique non-stopword keywords (length >=
/// 3) and uses the joined keyword string if it's long enough to be a
/// meaningful anchor, else falls back to a 260-char prefix of the
/// cleaned text.
fn compact_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() || c == '_' || c == '-' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.len() < KEYWORD_DERIVE_THRESHOLD {
        return cleaned.chars().take(MAX_COMPACTED_LEN).collect();
    }

    const STOPWORDS: &[&str] = &["the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "is", "with"];
    let mut seen = HashSet::new();
    let keywords: Vec<String> = cleaned
        .split_whitespace()
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .filter(|w| seen.insert(w.to_lowercase()))
        .take(MAX_DERIVED_KEYWORDS)
        .map(|w| w.to_string())
        .collect();

    let keyword_string = keywords.join(" ");
    if keyword_string.len() >= 24 {
        keyword_string
    } else {
        cleaned.chars().take(MAX_COMPACTED_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_query_strips_punctuation() {
        let compacted = compact_query("hello, world! (test)");
        assert_eq!(compacted, "hello world test");
    }

    #[test]
    fn compact_query_short_text_passes_through() {
        let compacted = compact_query("rust ownership");
        assert_eq!(compacted, "rust ownership");
    }

    #[test]
    fn compact_query_derives_keywords_for_long_text() {
        let long_query = "the ".repeat(50) + &"meaningful keyword phrase about ownership and borrowing semantics ".repeat(3);
        let compacted = compact_query(&long_query);
        assert!(compacted.len() <= MAX_COMPACTED_LEN);
    }

    #[test]
    fn recency_weight_decays_with_age() {
        let now_weight = recency_weight(Utc::now());
        let old_weight = recency_weight(Utc::now() - chrono::Duration::days(365));
        assert!(now_weight > old_weight);
        assert_eq!(old_weight, 0.0);
    }

    #[test]
    fn typing_tuning_is_tighter_than_deep() {
        let typing = RetrievalTuning::typing();
        let deep = RetrievalTuning::deep();
        assert!(typing.vector_top_k < deep.vector_top_k);
        assert!(typing.similarity_floor > deep.similarity_floor);
    }
}
