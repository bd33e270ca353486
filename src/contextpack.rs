//! ContextPackAssembler + RedactionService (§6): builds a redacted,
//! mode-tagged [`ContextPack`] from a set of previously-suggested
//! documents and persists it to disk as a pretty-printed JSON blob.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};
use crate::models::{ContextPack, ContextPackItem, InjectionMode, Suggestion};

/// A request to assemble a pack: the query the suggestions came from, the
/// subset of suggestion IDs the caller selected, and any per-item
/// injection-mode overrides.
pub struct ContextPackRequest<'a> {
    pub query: &'a str,
    pub selected_suggestion_ids: &'a [String],
    pub mode_overrides: &'a HashMap<String, InjectionMode>,
}

pub struct ContextPackAssembler {
    packs_dir: PathBuf,
}

impl ContextPackAssembler {
    pub fn new(packs_dir: impl Into<PathBuf>) -> Self {
        Self { packs_dir: packs_dir.into() }
    }

    /// Builds a pack from the cached suggestions for `request.query`,
    /// picking each selected suggestion out of `suggestion_cache` by ID.
    /// Returns `MissingSuggestion(id)` for the first selected ID that
    /// isn't present in the cache (§7).
    pub fn assemble(
        &self,
        request: &ContextPackRequest<'_>,
        suggestion_cache: &HashMap<String, Suggestion>,
        pack_id: String,
    ) -> Result<ContextPack> {
        let mut items = Vec::with_capacity(request.selected_suggestion_ids.len());
        let mut attachment_paths = Vec::new();
        let mut inline_prompt_blocks = Vec::new();

        for id in request.selected_suggestion_ids {
            let suggestion = suggestion_cache
                .get(id)
                .ok_or_else(|| ErrorKind::MissingSuggestion(id.clone()))?;

            let mode = request
                .mode_overrides
                .get(id)
                .copied()
                .unwrap_or_else(|| InjectionMode::default_for(suggestion.source_type));

            let redacted_text = redact(&suggestion.snippet);

            match mode {
                InjectionMode::FileRef => {
                    if let Some(path) = &suggestion.file_path {
                        attachment_paths.push(path.clone());
                    }
                }
                InjectionMode::InlineSnippet | InjectionMode::StructuredSummary => {
                    inline_prompt_blocks.push(redacted_text.clone());
                }
            }

            let mut metadata = serde_json::Map::new();
            metadata.insert("score".to_string(), serde_json::json!(suggestion.score));
            metadata.insert("reasons".to_string(), serde_json::json!(suggestion.reasons));

            items.push(ContextPackItem {
                source_type: suggestion.source_type,
                mode,
                title: suggestion.title.clone(),
                text: redacted_text,
                file_path: suggestion.file_path.clone(),
                metadata,
            });
        }

        Ok(ContextPack {
            id: pack_id,
            query: request.query.to_string(),
            items,
            attachment_paths,
            inline_prompt_blocks,
        })
    }

    /// Writes `pack` to `{packs_dir}/{id}.json` as pretty-printed JSON,
    /// creating the directory if needed.
    pub fn persist(&self, pack: &ContextPack) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.packs_dir)?;
        let path = self.packs_dir.join(format!("{}.json", pack.id));
        let json = serde_json::to_string_pretty(pack)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn packs_dir(&self) -> &Path {
        &self.packs_dir
    }
}

const REDACTION_MARKER: &str = "[REDACTED]";

/// Line-oriented keyword/pattern scan matching the risk-scoring markers
/// used when a document is first ingested (see `store::risk_for_body`):
/// `key=value`-shaped secrets and a short list of sensitive labels get
/// their value replaced, never just flagged.
pub fn redact(text: &str) -> String {
    const KEY_MARKERS: &[&str] = &["password", "api_key", "secret_key", "ssn", "ssn:"];

    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&redact_line(line, KEY_MARKERS));
    }
    out
}

fn redact_line(line: &str, key_markers: &[&str]) -> String {
    let lower = line.to_lowercase();
    for marker in key_markers {
        if let Some(pos) = lower.find(marker) {
            if let Some(eq_offset) = line[pos..].find(['=', ':']) {
                let value_start = pos + eq_offset + 1;
                let value_end = line[value_start..]
                    .find(char::is_whitespace)
                    .map(|w| value_start + w)
                    .unwrap_or(line.len());
                let mut redacted = String::new();
                redacted.push_str(&line[..value_start]);
                redacted.push_str(REDACTION_MARKER);
                redacted.push_str(&line[value_end..]);
                return redacted;
            }
        }
    }
    line.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use chrono::Utc;
    use tempfile::tempdir;

    fn suggestion(id: &str, source_type: SourceType, snippet: &str, file_path: Option<&str>) -> Suggestion {
        Suggestion {
            id: id.to_string(),
            document_id: id.to_string(),
            source_type,
            title: Some("doc title".to_string()),
            snippet: snippet.to_string(),
            file_path: file_path.map(|p| p.to_string()),
            score: 0.9,
            reasons: vec!["lexical".to_string()],
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn redacts_password_assignment() {
        let redacted = redact("auth line: password=hunter2secret end");
        assert!(redacted.contains(REDACTION_MARKER));
        assert!(!redacted.contains("hunter2secret"));
    }

    #[test]
    fn leaves_unrelated_text_untouched() {
        assert_eq!(redact("just a normal sentence"), "just a normal sentence");
    }

    #[test]
    fn missing_suggestion_id_errors() {
        let dir = tempdir().unwrap();
        let assembler = ContextPackAssembler::new(dir.path());
        let cache = HashMap::new();
        let overrides = HashMap::new();
        let selected = vec!["doc_missing".to_string()];
        let request = ContextPackRequest {
            query: "q",
            selected_suggestion_ids: &selected,
            mode_overrides: &overrides,
        };
        let err = assembler.assemble(&request, &cache, "pack_1".to_string()).unwrap_err();
        match err {
            ErrorKind::MissingSuggestion(id) => assert_eq!(id, "doc_missing"),
            other => panic!("expected MissingSuggestion, got {other:?}"),
        }
    }

    #[test]
    fn file_goes_to_attachments_not_inline_blocks() {
        let dir = tempdir().unwrap();
        let assembler = ContextPackAssembler::new(dir.path());
        let mut cache = HashMap::new();
        cache.insert(
            "doc_a".to_string(),
            suggestion("doc_a", SourceType::File, "body text", Some("/tmp/a.txt")),
        );
        let overrides = HashMap::new();
        let selected = vec!["doc_a".to_string()];
        let request = ContextPackRequest {
            query: "q",
            selected_suggestion_ids: &selected,
            mode_overrides: &overrides,
        };
        let pack = assembler.assemble(&request, &cache, "pack_2".to_string()).unwrap();
        assert_eq!(pack.attachment_paths, vec!["/tmp/a.txt".to_string()]);
        assert!(pack.inline_prompt_blocks.is_empty());
    }

    #[test]
    fn mail_defaults_to_structured_summary_inline() {
        let dir = tempdir().unwrap();
        let assembler = ContextPackAssembler::new(dir.path());
        let mut cache = HashMap::new();
        cache.insert(
            "doc_b".to_string(),
            suggestion("doc_b", SourceType::Email, "password=hunter2secret", None),
        );
        let overrides = HashMap::new();
        let selected = vec!["doc_b".to_string()];
        let request = ContextPackRequest {
            query: "q",
            selected_suggestion_ids: &selected,
            mode_overrides: &overrides,
        };
        let pack = assembler.assemble(&request, &cache, "pack_3".to_string()).unwrap();
        assert_eq!(pack.items[0].mode, InjectionMode::StructuredSummary);
        assert!(pack.inline_prompt_blocks[0].contains(REDACTION_MARKER));
        assert!(!pack.inline_prompt_blocks[0].contains("hunter2secret"));
    }

    #[test]
    fn persist_writes_pretty_json_file() {
        let dir = tempdir().unwrap();
        let assembler = ContextPackAssembler::new(dir.path());
        let pack = ContextPack {
            id: "pack_4".to_string(),
            query: "q".to_string(),
            items: vec![],
            attachment_paths: vec![],
            inline_prompt_blocks: vec![],
        };
        let path = assembler.persist(&pack).unwrap();
        assert!(path.exists());
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("\"pack_4\""));
    }
}
