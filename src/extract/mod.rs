//! Extraction service (§4.3): dispatches a file to the first extractor
//! in an ordered chain that can handle it, under a per-file wall-clock
//! timeout, then normalizes and classifies the result.

mod image_ocr;
mod metadata_fallback;
mod office_openxml;
mod pdf;
mod plain_text;
mod richtext;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policy::IndexingPolicy;

const STILL_SUCCESS_WARNINGS: &[&str] = &["text_truncated_large_file"];
const UNSUPPORTED_WITHOUT_SOURCE_TEXT: &[&str] =
    &["scanned_pdf_text_unavailable", "image_too_large_for_ocr", "metadata_only_fallback"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Success,
    Partial,
    Failed,
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub title: Option<String>,
    pub warnings: Vec<&'static str>,
    pub was_ocr_used: bool,
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub searchable_body: String,
    pub outcome: ExtractionOutcome,
    pub warnings: Vec<&'static str>,
    pub detail: Option<String>,
    pub was_ocr_used: bool,
}

pub struct ExtractionService {
    max_extracted_characters: usize,
}

impl ExtractionService {
    pub fn new(max_extracted_characters: usize) -> Self {
        Self {
            max_extracted_characters,
        }
    }

    /// Runs the extractor chain for `path` on a blocking worker thread,
    /// racing it against a timeout equal to `policy.maxExtractionSecondsPerFile`.
    /// Whichever completes first wins; the loser's result is discarded.
    pub async fn extract(&self, path: &Path, policy: &IndexingPolicy) -> ExtractionResult {
        let timeout = Duration::from_secs(policy.max_extraction_seconds_per_file);
        let path_buf = path.to_path_buf();
        let hard_cap = policy.hard_file_size_cap_bytes;
        let max_chars = self.max_extracted_characters;
        let max_pdf_pages = policy.max_pdf_pages_to_ocr;
        let max_image_pixels = policy.max_image_pixel_count_for_ocr;
        let max_image_dimension = policy.max_image_dimension_for_ocr;

        let work = tokio::task::spawn_blocking(move || {
            run_chain(&path_buf, hard_cap, max_chars, max_pdf_pages, max_image_pixels, max_image_dimension)
        });

        let raw = match tokio::time::timeout(timeout, work).await {
            Ok(Ok(content)) => content,
            Ok(Err(join_err)) => {
                return failed_result(format!("extraction task panicked: {join_err}"));
            }
            Err(_) => {
                return failed_result(format!(
                    "extraction exceeded {}s timeout",
                    policy.max_extraction_seconds_per_file
                ));
            }
        };

        normalize_and_classify(raw, self.max_extracted_characters)
    }
}

fn failed_result(detail: String) -> ExtractionResult {
    ExtractionResult {
        searchable_body: String::new(),
        outcome: ExtractionOutcome::Failed,
        warnings: Vec::new(),
        detail: Some(detail),
        was_ocr_used: false,
    }
}

/// Runs on a blocking thread: selects and runs the first extractor in
/// the chain that applies to this path. Never panics on extractor
/// failure — failures surface as an empty body with a synthetic
/// `"extractor_error:..."` warning rather than unwinding, so the
/// timeout race always has a well-formed value to return.
fn run_chain(
    path: &Path,
    hard_cap: u64,
    max_chars: usize,
    max_pdf_pages: usize,
    max_image_pixels: u64,
    max_image_dimension: u32,
) -> ExtractedContent {
    let title = path.file_name().map(|n| n.to_string_lossy().to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if is_plain_text_extension(&ext) {
        return match plain_text::extract_plain_text(path, hard_cap, max_chars) {
            Ok(result) => ExtractedContent {
                text: result.text,
                title,
                warnings: if result.truncated {
                    vec!["text_truncated_large_file"]
                } else {
                    Vec::new()
                },
                was_ocr_used: false,
            },
            Err(e) => extractor_error(title, e),
        };
    }

    if ext == "pdf" {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => return extractor_error(title, e),
        };
        return match pdf::extract_pdf(&bytes) {
            Ok(result) => {
                let _ = max_pdf_pages;
                ExtractedContent {
                    text: result.text,
                    title,
                    warnings: result.warnings,
                    was_ocr_used: false,
                }
            }
            Err(e) => extractor_error(title, e),
        };
    }

    if is_image_extension(&ext) {
        return match image_ocr::extract_image_text(path, max_image_pixels, max_image_dimension) {
            Ok(result) => ExtractedContent {
                text: result.text,
                title,
                warnings: result.warnings,
                was_ocr_used: result.was_ocr_used,
            },
            Err(e) => extractor_error(title, e),
        };
    }

    if ext == "docx" || ext == "pptx" || ext == "xlsx" {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => return extractor_error(title, e),
        };
        let parsed = match ext.as_str() {
            "docx" => office_openxml::extract_docx(&bytes),
            "pptx" => office_openxml::extract_pptx(&bytes),
            _ => office_openxml::extract_xlsx(&bytes),
        };
        return match parsed {
            Ok(text) => ExtractedContent {
                text,
                title,
                warnings: Vec::new(),
                was_ocr_used: false,
            },
            Err(e) => extractor_error(title, e),
        };
    }

    if is_richtext_extension(&ext) {
        let bytes = std::fs::read(path).unwrap_or_default();
        let result = richtext::extract_richtext(&bytes);
        return ExtractedContent {
            text: result.text,
            title,
            warnings: result.warnings,
            was_ocr_used: false,
        };
    }

    let fallback = metadata_fallback::extract_metadata_only(path);
    ExtractedContent {
        text: fallback.text,
        title,
        warnings: fallback.warnings,
        was_ocr_used: false,
    }
}

/// An extractor that errors (I/O failure, malformed archive, decode
/// failure) degrades to the metadata-only outcome rather than
/// unwinding — only a task panic or the timeout race produces `failed`.
fn extractor_error(title: Option<String>, e: impl std::fmt::Display) -> ExtractedContent {
    tracing::debug!(error = %e, "extractor failed, degrading to metadata-only");
    ExtractedContent {
        text: String::new(),
        title,
        warnings: vec!["metadata_only_fallback"],
        was_ocr_used: false,
    }
}

fn is_plain_text_extension(ext: &str) -> bool {
    matches!(
        ext,
        "txt" | "md" | "markdown" | "json" | "yaml" | "yml" | "toml" | "csv" | "log" | "rs" | "py"
            | "js" | "ts" | "go" | "java" | "c" | "cpp" | "h" | "sh"
    )
}

fn is_image_extension(ext: &str) -> bool {
    matches!(ext, "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tiff")
}

fn is_richtext_extension(ext: &str) -> bool {
    matches!(ext, "rtf" | "html" | "htm" | "doc" | "pages")
}

fn normalize_and_classify(content: ExtractedContent, max_chars: usize) -> ExtractionResult {
    let searchable_body = normalize_body(&content, max_chars);
    let outcome = classify_outcome(&searchable_body, &content.warnings);

    ExtractionResult {
        searchable_body,
        outcome,
        warnings: content.warnings,
        detail: None,
        was_ocr_used: content.was_ocr_used,
    }
}

fn normalize_body(content: &ExtractedContent, max_chars: usize) -> String {
    let collapsed = content.text.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed: String = collapsed
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    let mut body = trimmed;
    if let Some(title) = &content.title {
        body.push_str(&format!("\n\n[source: {title}]"));
    }

    if body.chars().count() > max_chars {
        body = body.chars().take(max_chars).collect();
    }
    body
}

fn classify_outcome(body: &str, warnings: &[&'static str]) -> ExtractionOutcome {
    let body_is_empty = body.trim().is_empty()
        || (warnings.len() == 1 && warnings[0] == "metadata_only_fallback" && body.trim().is_empty());

    if warnings.iter().any(|w| UNSUPPORTED_WITHOUT_SOURCE_TEXT.contains(w)) && body.trim().is_empty() {
        return ExtractionOutcome::Unsupported;
    }
    if body_is_empty {
        return ExtractionOutcome::Unsupported;
    }
    if warnings.is_empty() {
        return ExtractionOutcome::Success;
    }
    if warnings.iter().all(|w| STILL_SUCCESS_WARNINGS.contains(w)) {
        return ExtractionOutcome::Success;
    }
    ExtractionOutcome::Partial
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndexingProfile, PolicyOverrides};
    use std::fs;

    fn test_policy() -> IndexingPolicy {
        IndexingPolicy::resolve(IndexingProfile::Developer, vec![PathBuf::from("/")], &PolicyOverrides::default())
    }

    #[tokio::test]
    async fn extracts_plain_text_successfully() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("note.txt");
        fs::write(&path, "hello world").unwrap();

        let service = ExtractionService::new(10_000);
        let result = service.extract(&path, &test_policy()).await;
        assert_eq!(result.outcome, ExtractionOutcome::Success);
        assert!(result.searchable_body.contains("hello world"));
    }

    #[tokio::test]
    async fn missing_file_yields_unsupported_not_panic() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ghost.bin");

        let service = ExtractionService::new(10_000);
        let result = service.extract(&path, &test_policy()).await;
        assert_eq!(result.outcome, ExtractionOutcome::Unsupported);
    }

    #[tokio::test]
    async fn unknown_extension_falls_back_to_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mystery.xyz");
        fs::write(&path, b"binary content").unwrap();

        let service = ExtractionService::new(10_000);
        let result = service.extract(&path, &test_policy()).await;
        assert_eq!(result.warnings, vec!["metadata_only_fallback"]);
    }

    #[test]
    fn classify_no_warnings_is_success() {
        assert_eq!(classify_outcome("hello", &[]), ExtractionOutcome::Success);
    }

    #[test]
    fn classify_truncated_only_is_still_success() {
        assert_eq!(
            classify_outcome("hello", &["text_truncated_large_file"]),
            ExtractionOutcome::Success
        );
    }

    #[test]
    fn classify_empty_body_is_unsupported() {
        assert_eq!(classify_outcome("   ", &[]), ExtractionOutcome::Unsupported);
    }

    #[test]
    fn classify_mixed_warnings_is_partial() {
        assert_eq!(
            classify_outcome("hello", &["text_truncated_large_file", "binary_document_best_effort_scan"]),
            ExtractionOutcome::Partial
        );
    }

    #[test]
    fn normalize_truncates_to_max_chars() {
        let content = ExtractedContent {
            text: "a".repeat(100),
            title: None,
            warnings: Vec::new(),
            was_ocr_used: false,
        };
        let body = normalize_body(&content, 10);
        assert_eq!(body.chars().count(), 10);
    }
}
