//! Metadata-only fallback extractor (§4.3 step 6).
//!
//! Used when every other extractor in the chain declines or fails:
//! produces no body text, just a warning plus whatever filesystem
//! metadata is available, so the document is still indexable by title
//! and path even when its content can't be read.

use std::path::Path;

pub struct MetadataFallbackResult {
    pub text: String,
    pub warnings: Vec<&'static str>,
}

pub fn extract_metadata_only(path: &Path) -> MetadataFallbackResult {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    MetadataFallbackResult {
        text: format!("{name} ({size} bytes)"),
        warnings: vec!["metadata_only_fallback"],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_warning_and_filename_stub() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mystery.bin");
        std::fs::write(&path, b"12345").unwrap();
        let result = extract_metadata_only(&path);
        assert!(result.text.contains("mystery.bin"));
        assert_eq!(result.warnings, vec!["metadata_only_fallback"]);
    }
}
