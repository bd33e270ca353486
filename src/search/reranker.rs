//! Final reranking pass (§4.7 step 6): title/snippet token overlap plus
//! a linear freshness decay, applied on top of the merged retrieval
//! score before truncating to the caller's requested limit.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::Suggestion;

const FRESHNESS_WINDOW_DAYS: i64 = 7;

pub struct Reranker;

impl Reranker {
    /// Keeps the top `keep` candidates by current score, recomputes
    /// each one's final score by adding overlap/freshness terms, then
    /// resorts.
    pub fn rerank(query: &str, mut suggestions: Vec<Suggestion>, keep: usize, now: DateTime<Utc>) -> Vec<Suggestion> {
        suggestions.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        suggestions.truncate(keep);

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return suggestions;
        }

        for s in &mut suggestions {
            let title_tokens = tokenize(s.title.as_deref().unwrap_or_default());
            let snippet_tokens = tokenize(&s.snippet);
            let title_overlap = overlap_fraction(&query_tokens, &title_tokens);
            let snippet_overlap = overlap_fraction(&query_tokens, &snippet_tokens);
            let freshness = freshness_boost(s.updated_at, now);

            s.score += title_overlap * 0.22 + snippet_overlap * 0.30 + freshness * 0.12;
        }

        suggestions.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        suggestions
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn overlap_fraction(query_tokens: &HashSet<String>, field_tokens: &HashSet<String>) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let intersection = query_tokens.intersection(field_tokens).count();
    intersection as f64 / query_tokens.len() as f64
}

/// Linear decay over `FRESHNESS_WINDOW_DAYS`: 1.0 at age 0, 0.0 at or
/// beyond the window.
fn freshness_boost(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - updated_at).num_seconds() as f64 / 86_400.0;
    if age_days <= 0.0 {
        1.0
    } else if age_days >= FRESHNESS_WINDOW_DAYS as f64 {
        0.0
    } else {
        1.0 - age_days / FRESHNESS_WINDOW_DAYS as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use chrono::Duration;

    fn suggestion(id: &str, title: &str, snippet: &str, score: f64, age_days: i64, now: DateTime<Utc>) -> Suggestion {
        Suggestion {
            id: id.to_string(),
            document_id: id.to_string(),
            source_type: SourceType::File,
            title: Some(title.to_string()),
            snippet: snippet.to_string(),
            file_path: None,
            score,
            reasons: vec!["lexical".to_string()],
            updated_at: now - Duration::days(age_days),
        }
    }

    #[test]
    fn fresh_exact_title_match_outranks_stale_unrelated() {
        let now = Utc::now();
        let fresh = suggestion("a", "rust ownership guide", "explains ownership", 0.5, 0, now);
        let stale = suggestion("b", "unrelated document", "nothing relevant", 0.5, 30, now);
        let ranked = Reranker::rerank("rust ownership", vec![stale, fresh], 10, now);
        assert_eq!(ranked[0].id, "a");
    }

    #[test]
    fn freshness_decays_to_zero_past_window() {
        let now = Utc::now();
        assert_eq!(freshness_boost(now - Duration::days(10), now), 0.0);
        assert_eq!(freshness_boost(now, now), 1.0);
    }

    #[test]
    fn truncates_to_keep_before_scoring() {
        let now = Utc::now();
        let many: Vec<Suggestion> = (0..5)
            .map(|i| suggestion(&i.to_string(), "doc", "text", 1.0 - i as f64 * 0.1, 0, now))
            .collect();
        let ranked = Reranker::rerank("doc", many, 2, now);
        assert_eq!(ranked.len(), 2);
    }
}
