//! `IndexingPolicy`: decides, per candidate path, whether to index it (and
//! into which partition), defer it, or skip it (§4.1).
//!
//! Three presets (`developer`, `personal`, `balanced`) pick concrete
//! values; any field can be overridden individually in configuration.

use crate::config::{IndexingProfile, PolicyOverrides};
use crate::models::Partition;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Index(Partition),
    Deferred(&'static str),
    Skip(&'static str),
}

#[derive(Debug, Clone)]
pub struct IndexingPolicy {
    pub allowlist_roots: Vec<PathBuf>,
    pub exclude_tokens: Vec<String>,
    pub allowed_extensions: Vec<String>,
    pub non_searchable_extensions: Vec<String>,
    pub skip_unknown_mime: bool,
    pub first_pass_file_size_cap_bytes: u64,
    pub hard_file_size_cap_bytes: u64,
    pub max_chunks_per_document: usize,
    pub max_extracted_characters_per_document: usize,
    pub max_pdf_pages_to_ocr: usize,
    pub max_image_pixel_count_for_ocr: u64,
    pub max_image_dimension_for_ocr: u32,
    pub max_extraction_seconds_per_file: u64,
    pub stage1_recent_cutoff_days: i64,
    pub quiet_window_seconds: u64,
}

impl IndexingPolicy {
    /// Resolve a named preset, then apply any explicit per-field overrides.
    pub fn resolve(
        profile: IndexingProfile,
        allowlist_roots: Vec<PathBuf>,
        overrides: &PolicyOverrides,
    ) -> Self {
        let mut policy = match profile {
            IndexingProfile::Developer => Self::developer_preset(allowlist_roots),
            IndexingProfile::Personal => Self::personal_preset(allowlist_roots),
            IndexingProfile::Balanced => Self::balanced_preset(allowlist_roots),
        };

        if let Some(v) = &overrides.exclude_tokens {
            policy.exclude_tokens = v.clone();
        }
        if let Some(v) = &overrides.allowed_extensions {
            policy.allowed_extensions = v.clone();
        }
        if let Some(v) = &overrides.non_searchable_extensions {
            policy.non_searchable_extensions = v.clone();
        }
        if let Some(v) = overrides.skip_unknown_mime {
            policy.skip_unknown_mime = v;
        }
        if let Some(v) = overrides.first_pass_file_size_cap_bytes {
            policy.first_pass_file_size_cap_bytes = v;
        }
        if let Some(v) = overrides.hard_file_size_cap_bytes {
            policy.hard_file_size_cap_bytes = v;
        }
        if let Some(v) = overrides.max_chunks_per_document {
            policy.max_chunks_per_document = v;
        }
        if let Some(v) = overrides.max_extracted_characters_per_document {
            policy.max_extracted_characters_per_document = v;
        }
        if let Some(v) = overrides.max_pdf_pages_to_ocr {
            policy.max_pdf_pages_to_ocr = v;
        }
        if let Some(v) = overrides.max_image_pixel_count_for_ocr {
            policy.max_image_pixel_count_for_ocr = v;
        }
        if let Some(v) = overrides.max_image_dimension_for_ocr {
            policy.max_image_dimension_for_ocr = v;
        }
        if let Some(v) = overrides.max_extraction_seconds_per_file {
            policy.max_extraction_seconds_per_file = v;
        }
        if let Some(v) = overrides.stage1_recent_cutoff_days {
            policy.stage1_recent_cutoff_days = v;
        }
        if let Some(v) = overrides.quiet_window_seconds {
            policy.quiet_window_seconds = v;
        }

        policy
    }

    /// Favors source-control-adjacent text: code, config, docs. Tighter
    /// quiet window for fast feedback while editing.
    fn developer_preset(allowlist_roots: Vec<PathBuf>) -> Self {
        Self {
            allowlist_roots,
            exclude_tokens: default_exclude_tokens(),
            allowed_extensions: vec![
                "rs", "py", "js", "ts", "tsx", "jsx", "go", "java", "c", "h", "cpp", "hpp",
                "rb", "md", "txt", "toml", "yaml", "yml", "json",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            non_searchable_extensions: vec!["lock".to_string()],
            skip_unknown_mime: true,
            first_pass_file_size_cap_bytes: 2 * 1024 * 1024,
            hard_file_size_cap_bytes: 20 * 1024 * 1024,
            max_chunks_per_document: 200,
            max_extracted_characters_per_document: 200_000,
            max_pdf_pages_to_ocr: 8,
            max_image_pixel_count_for_ocr: 8_000_000,
            max_image_dimension_for_ocr: 2048,
            max_extraction_seconds_per_file: 10,
            stage1_recent_cutoff_days: 7,
            quiet_window_seconds: 2,
        }
    }

    /// Favors documents, mail attachments, and photos. Looser cutoffs and
    /// larger size caps than `developer`.
    fn personal_preset(allowlist_roots: Vec<PathBuf>) -> Self {
        Self {
            allowlist_roots,
            exclude_tokens: default_exclude_tokens(),
            allowed_extensions: vec![
                "pdf", "docx", "pptx", "xlsx", "doc", "ppt", "xls", "txt", "md", "rtf", "png",
                "jpg", "jpeg",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            non_searchable_extensions: Vec::new(),
            skip_unknown_mime: true,
            first_pass_file_size_cap_bytes: 10 * 1024 * 1024,
            hard_file_size_cap_bytes: 75 * 1024 * 1024,
            max_chunks_per_document: 150,
            max_extracted_characters_per_document: 150_000,
            max_pdf_pages_to_ocr: 8,
            max_image_pixel_count_for_ocr: 12_000_000,
            max_image_dimension_for_ocr: 2048,
            max_extraction_seconds_per_file: 20,
            stage1_recent_cutoff_days: 30,
            quiet_window_seconds: 5,
        }
    }

    /// Default preset: the union of the developer/personal extension sets
    /// at the more conservative of each numeric bound.
    fn balanced_preset(allowlist_roots: Vec<PathBuf>) -> Self {
        let mut allowed = Self::developer_preset(Vec::new()).allowed_extensions;
        allowed.extend(Self::personal_preset(Vec::new()).allowed_extensions);
        allowed.sort();
        allowed.dedup();

        Self {
            allowlist_roots,
            exclude_tokens: default_exclude_tokens(),
            allowed_extensions: allowed,
            non_searchable_extensions: vec!["lock".to_string()],
            skip_unknown_mime: true,
            first_pass_file_size_cap_bytes: 5 * 1024 * 1024,
            hard_file_size_cap_bytes: 50 * 1024 * 1024,
            max_chunks_per_document: 150,
            max_extracted_characters_per_document: 175_000,
            max_pdf_pages_to_ocr: 8,
            max_image_pixel_count_for_ocr: 10_000_000,
            max_image_dimension_for_ocr: 2048,
            max_extraction_seconds_per_file: 15,
            stage1_recent_cutoff_days: 14,
            quiet_window_seconds: 3,
        }
    }

    pub fn evaluate(&self, path: &Path, size: u64, modified_at: DateTime<Utc>) -> Decision {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if !self
            .allowlist_roots
            .iter()
            .any(|root| canonical.starts_with(root))
        {
            return Decision::Skip("not_in_allowlist");
        }

        if self.should_skip_path(&canonical) {
            return Decision::Skip("excluded_path");
        }

        let extension = canonical
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        let extension = match extension {
            Some(e) if !e.is_empty() => e,
            _ => return Decision::Skip("unsupported_file_type"),
        };
        if !self.allowed_extensions.iter().any(|a| *a == extension) {
            return Decision::Skip("unsupported_file_type");
        }

        if self.skip_unknown_mime && mime_for_extension(&extension).is_none() {
            return Decision::Skip("unknown_content_type");
        }

        if size > self.hard_file_size_cap_bytes {
            return Decision::Skip("hard_size_cap");
        }
        if size > self.first_pass_file_size_cap_bytes {
            return Decision::Deferred("deferred_large_file");
        }

        if is_generated_or_minified(&canonical) {
            return Decision::Skip("generated_or_minified");
        }

        let cutoff = Utc::now() - chrono::Duration::days(self.stage1_recent_cutoff_days);
        if modified_at >= cutoff {
            Decision::Index(Partition::Hot)
        } else {
            Decision::Index(Partition::Warm)
        }
    }

    /// True if any path component equals an exclude token, matches a
    /// `prefix*suffix` glob on a component, or ends with a `.build`-style
    /// suffix token. Tokens containing `/` are matched as substrings of
    /// the full path instead of per-component.
    pub fn should_skip_path(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        for token in &self.exclude_tokens {
            if token.contains('/') {
                if path_str.contains(token.as_str()) {
                    return true;
                }
                continue;
            }
            for component in path.components() {
                let comp_str = component.as_os_str().to_string_lossy();
                if glob_component_match(token, &comp_str) {
                    return true;
                }
            }
        }
        false
    }
}

fn glob_component_match(token: &str, component: &str) -> bool {
    if let Some(star) = token.find('*') {
        let prefix = &token[..star];
        let suffix = &token[star + 1..];
        component.starts_with(prefix) && component.ends_with(suffix)
    } else {
        component == token
    }
}

fn is_generated_or_minified(path: &Path) -> bool {
    let s = path.to_string_lossy();
    s.contains(".min.") || s.contains("generated") || s.contains("bundle.js")
}

fn default_exclude_tokens() -> Vec<String> {
    vec![
        ".git".to_string(),
        "target".to_string(),
        "node_modules".to_string(),
        ".cache".to_string(),
        "dist".to_string(),
        "build".to_string(),
    ]
}

fn mime_for_extension(extension: &str) -> Option<&'static str> {
    Some(match extension {
        "txt" | "md" | "rtf" => "text/plain",
        "json" => "application/json",
        "toml" | "yaml" | "yml" => "text/plain",
        "rs" | "py" | "js" | "ts" | "tsx" | "jsx" | "go" | "java" | "c" | "h" | "cpp" | "hpp"
        | "rb" => "text/plain",
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "doc" => "application/msword",
        "ppt" => "application/vnd.ms-powerpoint",
        "xls" => "application/vnd.ms-excel",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "lock" => return None,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyOverrides;
    use chrono::Duration;

    fn policy_with_root(root: &Path) -> IndexingPolicy {
        IndexingPolicy::resolve(
            IndexingProfile::Developer,
            vec![root.to_path_buf()],
            &PolicyOverrides::default(),
        )
    }

    #[test]
    fn rejects_paths_outside_allowlist() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_with_root(tmp.path());
        let outside = Path::new("/definitely/not/allowed/plan.txt");
        assert_eq!(
            policy.evaluate(outside, 10, Utc::now()),
            Decision::Skip("not_in_allowlist")
        );
    }

    #[test]
    fn skips_excluded_path_components() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_with_root(tmp.path());
        let excluded = tmp.path().join("node_modules").join("pkg").join("index.js");
        std::fs::create_dir_all(excluded.parent().unwrap()).unwrap();
        std::fs::write(&excluded, "content").unwrap();
        assert_eq!(
            policy.evaluate(&excluded, 10, Utc::now()),
            Decision::Skip("excluded_path")
        );
    }

    #[test]
    fn skips_unsupported_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_with_root(tmp.path());
        let file = tmp.path().join("binary.exe");
        std::fs::write(&file, "content").unwrap();
        assert_eq!(
            policy.evaluate(&file, 10, Utc::now()),
            Decision::Skip("unsupported_file_type")
        );
    }

    #[test]
    fn hard_cap_skips_and_first_pass_cap_defers() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_with_root(tmp.path());
        let file = tmp.path().join("notes.txt");
        std::fs::write(&file, "content").unwrap();

        assert_eq!(
            policy.evaluate(&file, policy.hard_file_size_cap_bytes + 1, Utc::now()),
            Decision::Skip("hard_size_cap")
        );
        assert_eq!(
            policy.evaluate(
                &file,
                policy.first_pass_file_size_cap_bytes + 1,
                Utc::now()
            ),
            Decision::Deferred("deferred_large_file")
        );
    }

    #[test]
    fn recent_file_is_hot_old_file_is_warm() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_with_root(tmp.path());
        let file = tmp.path().join("plan.txt");
        std::fs::write(&file, "Launch the beta on 2025-11-01 with team QR-7").unwrap();

        assert_eq!(
            policy.evaluate(&file, 10, Utc::now()),
            Decision::Index(Partition::Hot)
        );
        assert_eq!(
            policy.evaluate(&file, 10, Utc::now() - Duration::days(30)),
            Decision::Index(Partition::Warm)
        );
    }

    #[test]
    fn generated_file_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = policy_with_root(tmp.path());
        let file = tmp.path().join("app.bundle.js");
        std::fs::write(&file, "content").unwrap();
        assert_eq!(
            policy.evaluate(&file, 10, Utc::now()),
            Decision::Skip("generated_or_minified")
        );
    }

    #[test]
    fn overrides_replace_preset_values() {
        let tmp = tempfile::tempdir().unwrap();
        let overrides = PolicyOverrides {
            hard_file_size_cap_bytes: Some(100),
            ..Default::default()
        };
        let policy = IndexingPolicy::resolve(
            IndexingProfile::Balanced,
            vec![tmp.path().to_path_buf()],
            &overrides,
        );
        assert_eq!(policy.hard_file_size_cap_bytes, 100);
    }
}
