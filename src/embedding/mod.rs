//! Embedding backend abstraction and the runtime that sits in front of it.
//!
//! `EmbeddingRuntime::embed` is the contract described in §4.4: given a
//! batch of texts, return one L2-normalized vector of fixed dimension `D`
//! per text, plus which backend produced them. Two backends exist behind
//! the same trait:
//! - [`LocalBackend`] (feature `local-embeddings`, default-on) — a small
//!   sentence-embedding model run locally through `fastembed`.
//! - [`HashBackend`] — a deterministic bucketed-hash fallback that can
//!   never fail, used when the local backend isn't available or errors.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors.
//! - [`vec_to_blob`] / [`blob_to_vec`] — pack/unpack a vector as a SQLite
//!   BLOB of little-endian `f32` values, with transparent decoding of the
//!   legacy JSON-array representation.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::EmbeddingConfig;

/// Native dimensionality of the hash fallback. Chosen to match the
/// smallest supported local-model dimension so blobs stay interchangeable
/// in tests regardless of which backend produced them.
pub const HASH_FALLBACK_DIMS: usize = 256;

/// A backend that turns text into fixed-dimension, L2-normalized vectors.
pub trait EmbeddingBackend: Send + Sync {
    fn dims(&self) -> usize;
    fn name(&self) -> &'static str;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Deterministic bucketed-hash embedder. Never fails for any input,
/// including non-ASCII text — every byte of the UTF-8 encoding is hashed.
pub struct HashBackend {
    dims: usize,
}

impl HashBackend {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0.0f32; self.dims];
        for token in text.split_whitespace() {
            let mut hasher = Sha256::new();
            hasher.update(token.as_bytes());
            let digest = hasher.finalize();
            for (i, byte) in digest.iter().enumerate() {
                let bucket = (*byte as usize + i) % self.dims;
                buckets[bucket] += *byte as f32 - 128.0;
            }
        }
        l2_normalize(&mut buckets);
        buckets
    }
}

impl EmbeddingBackend for HashBackend {
    fn dims(&self) -> usize {
        self.dims
    }
    fn name(&self) -> &'static str {
        "hash"
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Local sentence-embedding backend via `fastembed`.
#[cfg(feature = "local-embeddings")]
pub struct LocalBackend {
    model: parking_lot::Mutex<fastembed::TextEmbedding>,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalBackend {
    pub fn try_new(config: &EmbeddingConfig) -> Result<Self> {
        let fastembed_model = config_to_fastembed_model(&config.model)?;
        let dims = dims_for_model(&config.model);
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
        )?;
        Ok(Self {
            model: parking_lot::Mutex::new(model),
            dims,
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings")]
impl EmbeddingBackend for LocalBackend {
    fn dims(&self) -> usize {
        self.dims
    }
    fn name(&self) -> &'static str {
        "local"
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut model = self.model.lock();
        let embeddings = model.embed(texts.to_vec(), Some(self.batch_size))?;
        Ok(embeddings
            .into_iter()
            .map(|mut v| {
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

#[cfg(feature = "local-embeddings")]
fn dims_for_model(name: &str) -> usize {
    match name {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5"
        | "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    use anyhow::bail;
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => bail!("unknown local embedding model: '{other}'"),
    }
}

/// Batch-embedding contract in front of the selected backend. Construction
/// tries the local backend first (when the feature is enabled) and falls
/// back to the hash backend on any initialization failure; `embed()` never
/// propagates a backend error to its caller — it falls back to the hash
/// backend for that call instead.
pub struct EmbeddingRuntime {
    backend: Arc<dyn EmbeddingBackend>,
    fallback: Arc<HashBackend>,
}

impl EmbeddingRuntime {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let fallback = Arc::new(HashBackend::new(HASH_FALLBACK_DIMS));

        #[cfg(feature = "local-embeddings")]
        {
            match LocalBackend::try_new(config) {
                Ok(backend) => {
                    return Self {
                        backend: Arc::new(backend),
                        fallback,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "local embedding backend unavailable, using hash fallback");
                }
            }
        }
        #[cfg(not(feature = "local-embeddings"))]
        {
            let _ = config;
        }

        Self {
            backend: fallback.clone(),
            fallback,
        }
    }

    pub fn dims(&self) -> usize {
        self.backend.dims()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Embed a batch of texts. Never fails: a backend error is logged and
    /// the hash fallback is used for that call instead.
    pub async fn embed(&self, texts: Vec<String>) -> (Vec<Vec<f32>>, &'static str) {
        let backend = self.backend.clone();
        let fallback = self.fallback.clone();
        let texts_for_fallback = texts.clone();
        let result = tokio::task::spawn_blocking(move || backend.embed_batch(&texts))
            .await
            .unwrap_or_else(|e| Err(anyhow::anyhow!("embedding task panicked: {e}")));

        match result {
            Ok(vectors) => (vectors, self.backend.name()),
            Err(e) => {
                tracing::warn!(error = %e, "embedding backend failed, using hash fallback");
                let vectors = fallback
                    .embed_batch(&texts_for_fallback)
                    .expect("hash backend never fails");
                (vectors, "hash-fallback")
            }
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Transparently decodes the
/// legacy JSON-array representation (`[1.0,2.0,...]`) when the first
/// non-whitespace byte is `[`; otherwise reads packed little-endian f32s.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    if let Some(&first) = blob.iter().find(|b| !b.is_ascii_whitespace()) {
        if first == b'[' {
            if let Ok(text) = std::str::from_utf8(blob) {
                if let Ok(values) = serde_json::from_str::<Vec<f64>>(text) {
                    return values.into_iter().map(|v| v as f32).collect();
                }
            }
        }
    }
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched-length
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn blob_to_vec_decodes_legacy_json_array() {
        let json = b"[1.0, -2.5, 3.125]".to_vec();
        let restored = blob_to_vec(&json);
        assert_eq!(restored, vec![1.0f32, -2.5, 3.125]);
    }

    #[test]
    fn blob_to_vec_decodes_legacy_json_array_with_leading_whitespace() {
        let json = b"  \n[1.0, 2.0]".to_vec();
        let restored = blob_to_vec(&json);
        assert_eq!(restored, vec![1.0f32, 2.0]);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn hash_backend_is_deterministic_and_normalized() {
        let backend = HashBackend::new(HASH_FALLBACK_DIMS);
        let a = backend.embed_one("Launch the beta on 2025-11-01 with team QR-7");
        let b = backend.embed_one("Launch the beta on 2025-11-01 with team QR-7");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_FALLBACK_DIMS);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[test]
    fn hash_backend_differs_for_different_text() {
        let backend = HashBackend::new(HASH_FALLBACK_DIMS);
        let a = backend.embed_one("alpha beta gamma");
        let b = backend.embed_one("completely different content here");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn runtime_without_local_feature_uses_hash_backend() {
        let config = EmbeddingConfig {
            model: "all-minilm-l6-v2".to_string(),
            batch_size: 8,
        };
        let runtime = EmbeddingRuntime::new(&config);
        let (vectors, _backend) = runtime
            .embed(vec!["hello world".to_string(), "second text".to_string()])
            .await;
        assert_eq!(vectors.len(), 2);
        for v in &vectors {
            assert_eq!(v.len(), runtime.dims());
        }
    }
}
