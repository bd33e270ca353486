//! Configuration parsing and validation.
//!
//! The daemon is configured via a TOML file (default: `config/daemon.toml`).
//! The top-level shape mirrors the `Configuration` record: `host`, `port`,
//! `authToken`, `indexingProfile`, `startupAllowlistRoots`, `queueBatchSize`,
//! plus nested tables for the database path, embedding backend selection,
//! and retrieval tuning overrides (candidate budgets, similarity floors) so
//! the constants in the hybrid search engine are tunable without a rebuild.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub auth_token: String,
    #[serde(default)]
    pub indexing_profile: IndexingProfile,
    pub startup_allowlist_roots: Vec<PathBuf>,
    #[serde(default = "default_queue_batch_size")]
    pub queue_batch_size: usize,

    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalOverrides,
    /// Explicit overrides of individual `indexingProfile` preset fields.
    #[serde(default)]
    pub policy: PolicyOverrides,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7420
}
fn default_queue_batch_size() -> usize {
    64
}

/// Named `IndexingPolicy` presets. `Balanced` is the default.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexingProfile {
    Developer,
    Personal,
    #[default]
    Balanced,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Per-field overrides of the resolved `IndexingProfile` preset. Any field
/// left `None` takes the preset's value.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PolicyOverrides {
    pub exclude_tokens: Option<Vec<String>>,
    pub allowed_extensions: Option<Vec<String>>,
    pub non_searchable_extensions: Option<Vec<String>>,
    pub skip_unknown_mime: Option<bool>,
    pub first_pass_file_size_cap_bytes: Option<u64>,
    pub hard_file_size_cap_bytes: Option<u64>,
    pub max_chunks_per_document: Option<usize>,
    pub max_extracted_characters_per_document: Option<usize>,
    pub max_pdf_pages_to_ocr: Option<usize>,
    pub max_image_pixel_count_for_ocr: Option<u64>,
    pub max_image_dimension_for_ocr: Option<u32>,
    pub max_extraction_seconds_per_file: Option<u64>,
    pub stage1_recent_cutoff_days: Option<i64>,
    pub quiet_window_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}

/// Overrides for the hybrid search engine's tuning constants. Any `None`
/// field falls back to the literal values.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RetrievalOverrides {
    pub vector_top_k_typing: Option<usize>,
    pub vector_top_k_deep: Option<usize>,
    pub vector_scan_limit_typing: Option<usize>,
    pub vector_scan_limit_deep: Option<usize>,
    pub similarity_floor_typing: Option<f64>,
    pub similarity_floor_deep: Option<f64>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: Config =
        toml::from_str(&content).with_context(|| "failed to parse config file")?;

    if config.auth_token.trim().is_empty() {
        anyhow::bail!("auth_token must not be empty");
    }
    if config.startup_allowlist_roots.is_empty() {
        anyhow::bail!("startup_allowlist_roots must contain at least one root");
    }
    if config.queue_batch_size == 0 {
        anyhow::bail!("queue_batch_size must be > 0");
    }
    if let Some(floor) = config.retrieval.similarity_floor_typing {
        if !(0.0..=1.0).contains(&floor) {
            anyhow::bail!("retrieval.similarity_floor_typing must be in [0.0, 1.0]");
        }
    }
    if let Some(floor) = config.retrieval.similarity_floor_deep {
        if !(0.0..=1.0).contains(&floor) {
            anyhow::bail!("retrieval.similarity_floor_deep must be in [0.0, 1.0]");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_minimal_config(extra: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
auth_token = "secret"
startup_allowlist_roots = ["/tmp"]

[db]
path = "/tmp/daemon.sqlite"
{extra}
"#
        )
        .unwrap();
        file
    }

    #[test]
    fn load_minimal_config_applies_defaults() {
        let file = write_minimal_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7420);
        assert_eq!(config.indexing_profile, IndexingProfile::Balanced);
        assert_eq!(config.queue_batch_size, 64);
    }

    #[test]
    fn rejects_empty_auth_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
auth_token = ""
startup_allowlist_roots = ["/tmp"]

[db]
path = "/tmp/daemon.sqlite"
"#
        )
        .unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn rejects_empty_allowlist() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
auth_token = "secret"
startup_allowlist_roots = []

[db]
path = "/tmp/daemon.sqlite"
"#
        )
        .unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn rejects_out_of_range_similarity_floor() {
        let file = write_minimal_config(
            r#"
[retrieval]
similarity_floor_typing = 1.5
"#,
        );
        assert!(load_config(file.path()).is_err());
    }
}
