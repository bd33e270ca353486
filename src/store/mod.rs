//! Persistent store (§4.5): a single-writer SQLite database accessed
//! through a `SqlitePool`, with FTS5 lexical search, packed-blob vector
//! similarity search, and the graph/checkpoint/audit tables that back
//! the scheduler and search engine.

use chrono::{DateTime, TimeZone, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use sqlx::{Row, SqlitePool};
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{ErrorKind, Result};
use crate::models::{
    BackfillCheckpoint, CheckpointStatus, Chunk, Document, GraphEdge, Partition, RiskLabel, SourceType,
};

const VECTOR_DECODE_CACHE_CAPACITY: usize = 16_384;
const DELETE_BATCH_SIZE: usize = 300;

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub document_id: String,
    pub chunk_id: String,
    pub rank: f64,
    pub snippet: String,
    pub source_type: SourceType,
    pub title: Option<String>,
    pub source_path_or_handle: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub document_id: String,
    pub chunk_id: String,
    pub similarity: f32,
    pub updated_at: DateTime<Utc>,
    pub chunk_text: String,
    pub source_type: SourceType,
    pub title: Option<String>,
    pub source_path_or_handle: String,
}

#[derive(Debug, Clone, Default)]
pub struct SourceFilters {
    pub source_types: Vec<SourceType>,
}

pub struct Store {
    pool: SqlitePool,
    vector_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            vector_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(VECTOR_DECODE_CACHE_CAPACITY).unwrap(),
            )),
        }
    }

    pub fn document_id_for(source_type: SourceType, source_id: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(source_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(source_id.as_bytes());
        let digest = hasher.finalize();
        format!("doc_{}", hex_prefix(&digest, 24))
    }

    /// Upsert a document plus its chunks and chunk vectors in a single
    /// transaction. A new deterministic document ID never re-keys an
    /// existing row found by `(source_type, source_id)` — the existing
    /// persisted ID always wins.
    pub async fn upsert_document(
        &self,
        mut doc: Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<String> {
        let mut tx = self.pool.begin().await.map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

        let existing_id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM documents WHERE source_type = ? AND source_id = ?",
        )
        .bind(doc.source_type.as_str())
        .bind(&doc.source_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

        let persisted_id = existing_id.unwrap_or_else(|| Self::document_id_for(doc.source_type, &doc.source_id));
        doc.id = persisted_id.clone();

        sqlx::query(
            r#"
            INSERT INTO documents (id, source_type, source_id, title, body, source_path_or_handle, updated_at, risk, partition_label, searchable)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_type, source_id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                source_path_or_handle = excluded.source_path_or_handle,
                updated_at = excluded.updated_at,
                risk = excluded.risk,
                partition_label = excluded.partition_label,
                searchable = excluded.searchable
            "#,
        )
        .bind(&persisted_id)
        .bind(doc.source_type.as_str())
        .bind(&doc.source_id)
        .bind(&doc.title)
        .bind(&doc.body)
        .bind(&doc.source_path_or_handle)
        .bind(doc.updated_at.timestamp() as f64)
        .bind(doc.risk.as_str())
        .bind(doc.partition.as_str())
        .bind(doc.searchable as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

        sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
            .bind(&persisted_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(&persisted_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_id = format!("{persisted_id}:{}", chunk.index);
            sqlx::query(
                "INSERT INTO chunks_fts (chunk_id, document_id, source_type, title, text) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk_id)
            .bind(&persisted_id)
            .bind(doc.source_type.as_str())
            .bind(&doc.title)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

            if let Some(vector) = vectors.get(i) {
                let blob = vec_to_blob(vector);
                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, document_id, chunk_index, vector_blob) VALUES (?, ?, ?, ?)",
                )
                .bind(&chunk_id)
                .bind(&persisted_id)
                .bind(chunk.index)
                .bind(blob)
                .execute(&mut *tx)
                .await
                .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
            }
        }

        tx.commit().await.map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(persisted_id)
    }

    /// Standalone document-row upsert, used to publish progress before
    /// the heavier chunk/embedding work completes.
    pub async fn upsert_document_record(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, source_type, source_id, title, body, source_path_or_handle, updated_at, risk, partition_label, searchable)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_type, source_id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                source_path_or_handle = excluded.source_path_or_handle,
                updated_at = excluded.updated_at,
                risk = excluded.risk,
                partition_label = excluded.partition_label,
                searchable = excluded.searchable
            "#,
        )
        .bind(&doc.id)
        .bind(doc.source_type.as_str())
        .bind(&doc.source_id)
        .bind(&doc.title)
        .bind(&doc.body)
        .bind(&doc.source_path_or_handle)
        .bind(doc.updated_at.timestamp() as f64)
        .bind(doc.risk.as_str())
        .bind(doc.partition.as_str())
        .bind(doc.searchable as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(())
    }

    pub async fn is_document_current(
        &self,
        source_type: SourceType,
        source_id: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let persisted: Option<f64> = sqlx::query_scalar(
            "SELECT updated_at FROM documents WHERE source_type = ? AND source_id = ?",
        )
        .bind(source_type.as_str())
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

        Ok(match persisted {
            Some(ts) => ts >= updated_at.timestamp() as f64,
            None => false,
        })
    }

    /// FTS5 BM25 lexical search. Builds an FTS MATCH expression from
    /// `query_text` (dropping stopwords, quoting terms, ANDing "anchor"
    /// tokens against a "content" disjunction when both kinds are
    /// present), runs it against `chunks_fts`, then appends a
    /// path/title substring-anchor pass so title/filename hits aren't
    /// lost to BM25 alone.
    pub async fn lexical_search(
        &self,
        query_text: &str,
        source_filters: &SourceFilters,
        partitions: &[Partition],
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        let Some(match_expression) = build_fts_match_expression(query_text) else {
            return Ok(Vec::new());
        };

        let mut query = String::from(
            r#"
            SELECT f.chunk_id, f.document_id, rank AS score,
                   snippet(chunks_fts, 4, '>>>', '<<<', '...', 48) AS snippet,
                   d.source_type, d.title, d.source_path_or_handle, d.updated_at
            FROM chunks_fts f
            JOIN documents d ON d.id = f.document_id
            WHERE chunks_fts MATCH ? AND d.searchable = 1
            "#,
        );
        if !source_filters.source_types.is_empty() {
            let list = source_filters
                .source_types
                .iter()
                .map(|s| format!("'{}'", s.as_str()))
                .collect::<Vec<_>>()
                .join(",");
            query.push_str(&format!(" AND d.source_type IN ({list})"));
        }
        if !partitions.is_empty() {
            let list = partitions
                .iter()
                .map(|p| format!("'{}'", p.as_str()))
                .collect::<Vec<_>>()
                .join(",");
            query.push_str(&format!(" AND d.partition_label IN ({list})"));
        }
        query.push_str(" ORDER BY rank LIMIT ?");

        let raw_limit = (limit * 8).max(limit) as i64;
        let rows = sqlx::query(&query)
            .bind(&match_expression)
            .bind(raw_limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        let mut content_hits = Vec::new();
        for row in rows {
            let document_id: String = row.get("document_id");
            if !seen.insert(document_id.clone()) {
                continue;
            }
            let source_type = SourceType::parse(&row.get::<String, _>("source_type")).unwrap_or(SourceType::File);
            let updated_at_raw: f64 = row.get("updated_at");
            let updated_at = Utc.timestamp_opt(updated_at_raw as i64, 0).single().unwrap_or_else(Utc::now);
            content_hits.push(LexicalHit {
                document_id,
                chunk_id: row.get("chunk_id"),
                rank: -row.get::<f64, _>("score"),
                snippet: row.get("snippet"),
                source_type,
                title: row.get("title"),
                source_path_or_handle: row.get("source_path_or_handle"),
                updated_at,
            });
        }

        let path_title_hits = self.path_title_anchor_hits(query_text, &seen, limit).await?;

        let mut combined = path_title_hits;
        combined.extend(content_hits);
        combined.truncate(limit);
        Ok(combined)
    }

    /// Scores substring matches of `query_text` against document
    /// title/path, boosting cue segments that usually indicate
    /// reference material and penalizing ones that usually indicate
    /// noise.
    async fn path_title_anchor_hits(
        &self,
        query_text: &str,
        already_seen: &std::collections::HashSet<String>,
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        let needle = query_text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT id, title, source_path_or_handle, source_type, updated_at FROM documents WHERE searchable = 1 AND (lower(title) LIKE ? OR lower(source_path_or_handle) LIKE ?) LIMIT ?",
        )
        .bind(format!("%{needle}%"))
        .bind(format!("%{needle}%"))
        .bind(limit as i64 * 4)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

        let mut hits: Vec<(f64, LexicalHit)> = Vec::new();
        for row in rows {
            let document_id: String = row.get("id");
            if already_seen.contains(&document_id) {
                continue;
            }
            let path: String = row.get("source_path_or_handle");
            let title: Option<String> = row.get("title");
            let source_type = SourceType::parse(&row.get::<String, _>("source_type")).unwrap_or(SourceType::File);
            let updated_at_raw: f64 = row.get("updated_at");
            let updated_at = Utc.timestamp_opt(updated_at_raw as i64, 0).single().unwrap_or_else(Utc::now);
            let lower_path = path.to_lowercase();

            let mut score = 1.0;
            for cue in ["/docs/", "template", "readme"] {
                if lower_path.contains(cue) {
                    score += 0.3;
                }
            }
            for penalty in ["/site/", "/testing/", "/misc/", "/app archives/"] {
                if lower_path.contains(penalty) {
                    score -= 0.3;
                }
            }

            hits.push((
                score,
                LexicalHit {
                    document_id: document_id.clone(),
                    chunk_id: format!("{document_id}:0"),
                    rank: score,
                    snippet: title.clone().unwrap_or_else(|| path.clone()),
                    source_type,
                    title,
                    source_path_or_handle: path,
                    updated_at,
                },
            ));
        }

        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits.into_iter().map(|(_, h)| h).take(limit).collect())
    }

    /// Streams `chunk_vectors` ordered by document recency, decoding
    /// each blob (via the LRU cache) and keeping a running top-`top_k`
    /// by cosine similarity above `minimum_similarity`.
    pub async fn top_chunk_vectors_by_similarity(
        &self,
        query_vector: &[f32],
        partitions: &[Partition],
        top_k: usize,
        scan_limit: usize,
        minimum_similarity: f32,
    ) -> Result<Vec<VectorHit>> {
        let mut query = String::from(
            r#"
            SELECT cv.chunk_id, cv.document_id, cv.vector_blob, d.updated_at,
                   d.source_type, d.title, d.source_path_or_handle
            FROM chunk_vectors cv
            JOIN documents d ON d.id = cv.document_id
            WHERE d.searchable = 1
            "#,
        );
        if !partitions.is_empty() {
            let list = partitions
                .iter()
                .map(|p| format!("'{}'", p.as_str()))
                .collect::<Vec<_>>()
                .join(",");
            query.push_str(&format!(" AND d.partition_label IN ({list})"));
        }
        query.push_str(" ORDER BY d.updated_at DESC LIMIT ?");

        let rows = sqlx::query(&query)
            .bind(scan_limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

        let mut candidates: Vec<VectorHit> = Vec::new();
        for row in &rows {
            let chunk_id: String = row.get("chunk_id");
            let document_id: String = row.get("document_id");
            let updated_at_raw: f64 = row.get("updated_at");
            let updated_at = Utc
                .timestamp_opt(updated_at_raw as i64, 0)
                .single()
                .unwrap_or_else(Utc::now);
            let source_type = SourceType::parse(&row.get::<String, _>("source_type")).unwrap_or(SourceType::File);
            let title: Option<String> = row.get("title");
            let source_path_or_handle: String = row.get("source_path_or_handle");

            let vector = {
                let mut cache = self.vector_cache.lock();
                if let Some(cached) = cache.get(&chunk_id) {
                    cached.clone()
                } else {
                    let blob: Vec<u8> = row.get("vector_blob");
                    let decoded = blob_to_vec(&blob);
                    cache.put(chunk_id.clone(), decoded.clone());
                    decoded
                }
            };

            if vector.len() != query_vector.len() {
                continue;
            }
            let similarity = cosine_similarity(query_vector, &vector);
            if similarity < minimum_similarity {
                continue;
            }
            candidates.push(VectorHit {
                document_id,
                chunk_id,
                similarity,
                updated_at,
                chunk_text: String::new(),
                source_type,
                title,
                source_path_or_handle,
            });
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.updated_at.cmp(&a.updated_at))
        });
        candidates.truncate(top_k);

        if !candidates.is_empty() {
            let ids = candidates.iter().map(|c| format!("'{}'", c.chunk_id)).collect::<Vec<_>>().join(",");
            let text_rows = sqlx::query(&format!(
                "SELECT chunk_id, text FROM chunks_fts WHERE chunk_id IN ({ids})"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
            let mut text_by_id = std::collections::HashMap::new();
            for row in text_rows {
                text_by_id.insert(row.get::<String, _>("chunk_id"), row.get::<String, _>("text"));
            }
            for c in &mut candidates {
                if let Some(text) = text_by_id.get(&c.chunk_id) {
                    c.chunk_text = text.clone();
                }
            }
        }

        Ok(candidates)
    }

    pub async fn graph_neighbors(&self, seed_document_ids: &[String], max_edges: usize) -> Result<Vec<GraphEdge>> {
        if seed_document_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = seed_document_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            r#"
            SELECT id, source_node, target_node, edge_type, confidence, weight, source_type, event_time, updated_at
            FROM graph_edges
            WHERE source_node IN ({placeholders}) OR target_node IN ({placeholders})
            ORDER BY confidence DESC, updated_at DESC
            LIMIT ?
            "#
        );
        let mut q = sqlx::query(&query);
        for id in seed_document_ids {
            q = q.bind(id);
        }
        for id in seed_document_ids {
            q = q.bind(id);
        }
        q = q.bind(max_edges as i64);

        let rows = q.fetch_all(&self.pool).await.map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let source_type = SourceType::parse(row.get::<String, _>("source_type").as_str())?;
                let event_time_raw: Option<f64> = row.get("event_time");
                Some(GraphEdge {
                    id: row.get("id"),
                    source_node: row.get("source_node"),
                    target_node: row.get("target_node"),
                    edge_type: row.get("edge_type"),
                    confidence: row.get("confidence"),
                    weight: row.get("weight"),
                    source_type,
                    event_time: event_time_raw.and_then(|s| Utc.timestamp_opt(s as i64, 0).single()),
                    updated_at: Utc.timestamp_opt(row.get::<f64, _>("updated_at") as i64, 0).single()?,
                })
            })
            .collect())
    }

    /// Inserts graph edges, replacing any previously stored under the same
    /// `id`. Called once per searchable document after its chunks/vectors
    /// are upserted.
    pub async fn insert_graph_edges(&self, edges: &[GraphEdge]) -> Result<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        for edge in edges {
            sqlx::query(
                r#"
                INSERT INTO graph_edges (id, source_node, target_node, edge_type, confidence, weight, source_type, event_time, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    confidence = excluded.confidence,
                    weight = excluded.weight,
                    event_time = excluded.event_time,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&edge.id)
            .bind(&edge.source_node)
            .bind(&edge.target_node)
            .bind(&edge.edge_type)
            .bind(edge.confidence)
            .bind(edge.weight)
            .bind(edge.source_type.as_str())
            .bind(edge.event_time.map(|t| t.timestamp() as f64))
            .bind(edge.updated_at.timestamp() as f64)
            .execute(&mut *tx)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        }
        tx.commit().await.map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(())
    }

    /// Marks file documents non-searchable when their path ends with a
    /// now-excluded extension, and purges their chunks/vectors/edges.
    pub async fn refresh_file_searchability(&self, non_searchable_extensions: &[String]) -> Result<u64> {
        if non_searchable_extensions.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        let mut total = 0u64;
        for ext in non_searchable_extensions {
            let pattern = format!("%.{ext}");
            let ids: Vec<String> = sqlx::query_scalar(
                "SELECT id FROM documents WHERE source_type = 'file' AND source_path_or_handle LIKE ? AND searchable = 1",
            )
            .bind(&pattern)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

            for id in &ids {
                sqlx::query("UPDATE documents SET searchable = 0 WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
                sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
                sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
                sqlx::query("DELETE FROM graph_edges WHERE source_node = ? OR target_node = ?")
                    .bind(id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
                total += 1;
            }
        }
        tx.commit().await.map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(total)
    }

    /// Deletes documents matching an exact path, a normalized path, or
    /// a path-prefix, cascading to chunks/vectors/edges/attempts, in
    /// batches of 300 IDs.
    pub async fn delete_documents_for_path(&self, source_type: SourceType, path: &str) -> Result<u64> {
        let normalized = path.trim_end_matches('/').to_string();
        let prefix_pattern = format!("{normalized}/%");

        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM documents WHERE source_type = ? AND (source_path_or_handle = ? OR source_path_or_handle = ? OR source_path_or_handle LIKE ?)",
        )
        .bind(source_type.as_str())
        .bind(path)
        .bind(&normalized)
        .bind(&prefix_pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;

        let mut deleted = 0u64;
        for batch in ids.chunks(DELETE_BATCH_SIZE) {
            let mut tx = self.pool.begin().await.map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
            for id in batch {
                sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?").bind(id).execute(&mut *tx).await.ok();
                sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?").bind(id).execute(&mut *tx).await.ok();
                sqlx::query("DELETE FROM graph_edges WHERE source_node = ? OR target_node = ?")
                    .bind(id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .ok();
                sqlx::query("DELETE FROM ingestion_attempts WHERE source_type = ? AND source_id IN (SELECT source_id FROM documents WHERE id = ?)")
                    .bind(source_type.as_str())
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .ok();
                sqlx::query("DELETE FROM documents WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
                deleted += 1;
            }
            tx.commit().await.map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        }
        Ok(deleted)
    }

    pub async fn save_checkpoint(&self, checkpoint: &BackfillCheckpoint) -> Result<()> {
        let payload = serde_json::to_vec(checkpoint)?;
        sqlx::query(
            "INSERT INTO backfill_checkpoints (checkpoint_key, payload_json, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(checkpoint_key) DO UPDATE SET payload_json = excluded.payload_json, updated_at = excluded.updated_at",
        )
        .bind(&checkpoint.key)
        .bind(payload)
        .bind(checkpoint.updated_at.timestamp() as f64)
        .execute(&self.pool)
        .await
        .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(())
    }

    pub async fn load_checkpoint(&self, key: &str) -> Result<Option<BackfillCheckpoint>> {
        let payload: Option<Vec<u8>> = sqlx::query_scalar("SELECT payload_json FROM backfill_checkpoints WHERE checkpoint_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        match payload {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert_backfill_job(
        &self,
        id: &str,
        source_type: SourceType,
        scope_label: &str,
        mode: &str,
        status: &str,
        items_processed: u64,
        items_skipped: u64,
    ) -> Result<()> {
        let now = Utc::now().timestamp() as f64;
        sqlx::query(
            r#"
            INSERT INTO backfill_jobs (id, source_type, scope_label, mode, status, items_processed, items_skipped, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                items_processed = excluded.items_processed,
                items_skipped = excluded.items_skipped,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(source_type.as_str())
        .bind(scope_label)
        .bind(mode)
        .bind(status)
        .bind(items_processed as i64)
        .bind(items_skipped as i64)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(())
    }

    pub async fn list_backfill_jobs(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query("SELECT id, status FROM backfill_jobs ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(rows.into_iter().map(|r| (r.get("id"), r.get("status"))).collect())
    }

    /// Saves a queue snapshot, keeping only the most recent one.
    pub async fn save_queue_snapshot(&self, payload_json: &str) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp() as f64;
        sqlx::query("INSERT INTO queue_snapshots (id, payload_json, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(payload_json)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        sqlx::query(
            "DELETE FROM queue_snapshots WHERE id NOT IN (SELECT id FROM queue_snapshots ORDER BY created_at DESC LIMIT 1)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(())
    }

    pub async fn append_audit(&self, kind: &str, payload_json: &str) -> Result<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp() as f64;
        sqlx::query("INSERT INTO audit_events (id, kind, payload_json, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(kind)
            .bind(payload_json)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(())
    }

    /// WAL checkpoint-truncate followed by `VACUUM`; also clears the
    /// vector-decode cache wholesale, matching §5's "cleared by
    /// wholesale reset when full" policy for this actor-owned cache.
    pub async fn compact(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        self.vector_cache.lock().clear();
        Ok(())
    }

    pub async fn count_documents(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ErrorKind::SqliteError(e.to_string()))?;
        Ok(count as u64)
    }
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "to", "in", "on", "for", "is", "are", "was", "were", "with", "at", "by",
    "this", "that", "it", "as", "be", "from",
];

/// Splits into terms, drops stopwords and terms shorter than 3 chars
/// (2 chars allowed if it contains a digit), quotes each surviving
/// term for FTS5, and ANDs "anchor" tokens (mixed letters/digits, or
/// interior CamelCase) against the remaining "content" disjunction
/// when both kinds of tokens are present.
fn build_fts_match_expression(query_text: &str) -> Option<String> {
    let terms: Vec<String> = query_text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .filter(|t| {
            let has_digit = t.chars().any(|c| c.is_ascii_digit());
            t.chars().count() >= 3 || (t.chars().count() >= 2 && has_digit)
        })
        .filter(|t| !STOPWORDS.contains(&t.to_lowercase().as_str()))
        .map(|t| t.to_string())
        .collect();

    if terms.is_empty() {
        return None;
    }

    let (anchors, content): (Vec<&String>, Vec<&String>) = terms.iter().partition(|t| is_anchor_token(t));

    let quote = |t: &str| format!("\"{}\"", t.replace('"', ""));

    if !anchors.is_empty() && !content.is_empty() {
        let anchor_expr = anchors.iter().map(|t| quote(t)).collect::<Vec<_>>().join(" AND ");
        let content_expr = content.iter().map(|t| quote(t)).collect::<Vec<_>>().join(" OR ");
        Some(format!("({anchor_expr}) AND ({content_expr})"))
    } else {
        Some(terms.iter().map(|t| quote(t)).collect::<Vec<_>>().join(" OR "))
    }
}

fn is_anchor_token(token: &str) -> bool {
    let has_letter = token.chars().any(|c| c.is_alphabetic());
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    if has_letter && has_digit {
        return true;
    }
    let chars: Vec<char> = token.chars().collect();
    chars
        .windows(2)
        .skip(1)
        .any(|w| w[0].is_lowercase() && w[1].is_uppercase())
}

fn hex_prefix(bytes: &[u8], hex_chars: usize) -> String {
    let full: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    full.chars().take(hex_chars).collect()
}

pub fn risk_for_body(body: &str) -> RiskLabel {
    let lower = body.to_lowercase();
    const HIGH_MARKERS: &[&str] = &["ssn", "social security", "password=", "api_key", "secret_key"];
    const MEDIUM_MARKERS: &[&str] = &["confidential", "internal use only", "salary", "dob"];
    if HIGH_MARKERS.iter().any(|m| lower.contains(m)) {
        RiskLabel::High
    } else if MEDIUM_MARKERS.iter().any(|m| lower.contains(m)) {
        RiskLabel::Medium
    } else {
        RiskLabel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> Store {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        Store::new(pool)
    }

    fn sample_doc(source_id: &str, body: &str) -> Document {
        Document {
            id: String::new(),
            source_type: SourceType::File,
            source_id: source_id.to_string(),
            title: Some("note".to_string()),
            body: body.to_string(),
            source_path_or_handle: format!("/tmp/{source_id}"),
            updated_at: Utc::now(),
            risk: RiskLabel::Low,
            partition: Partition::Hot,
            searchable: true,
        }
    }

    #[tokio::test]
    async fn upsert_then_is_current_roundtrip() {
        let store = memory_store().await;
        let doc = sample_doc("a.txt", "hello world");
        let chunks = vec![Chunk { id: String::new(), document_id: String::new(), index: 0, text: "hello world".to_string() }];
        let persisted_id = store.upsert_document(doc.clone(), &chunks, &[vec![1.0, 0.0]]).await.unwrap();
        assert!(!persisted_id.is_empty());

        let is_current = store.is_document_current(SourceType::File, "a.txt", doc.updated_at).await.unwrap();
        assert!(is_current);
    }

    #[tokio::test]
    async fn repeated_source_id_keeps_original_document_id() {
        let store = memory_store().await;
        let first = store
            .upsert_document(sample_doc("same.txt", "v1"), &[], &[])
            .await
            .unwrap();
        let second = store
            .upsert_document(sample_doc("same.txt", "v2"), &[], &[])
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn insert_graph_edges_then_neighbors_roundtrip() {
        let store = memory_store().await;
        let now = Utc::now();
        let edge = GraphEdge {
            id: "doc_a:mentions:acme".to_string(),
            source_node: "doc_a".to_string(),
            target_node: "acme".to_string(),
            edge_type: "mentions".to_string(),
            confidence: 0.8,
            weight: 1.0,
            source_type: SourceType::File,
            event_time: None,
            updated_at: now,
        };
        store.insert_graph_edges(&[edge]).await.unwrap();

        let neighbors = store.graph_neighbors(&["doc_a".to_string()], 10).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].target_node, "acme");
    }

    #[tokio::test]
    async fn lexical_search_finds_inserted_chunk() {
        let store = memory_store().await;
        let doc = sample_doc("doc.txt", "the quick brown fox");
        let chunks = vec![Chunk { id: String::new(), document_id: String::new(), index: 0, text: "quick brown fox".to_string() }];
        store.upsert_document(doc, &chunks, &[]).await.unwrap();

        let hits = store
            .lexical_search("brown", &SourceFilters::default(), &[Partition::Hot], 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn vector_search_respects_similarity_floor() {
        let store = memory_store().await;
        let doc = sample_doc("vecdoc.txt", "vector body");
        let chunks = vec![Chunk { id: String::new(), document_id: String::new(), index: 0, text: "vector body".to_string() }];
        store.upsert_document(doc, &chunks, &[vec![1.0, 0.0]]).await.unwrap();

        let hits = store
            .top_chunk_vectors_by_similarity(&[1.0, 0.0], &[Partition::Hot], 5, 100, 0.9)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].similarity > 0.99);

        let none = store
            .top_chunk_vectors_by_similarity(&[0.0, 1.0], &[Partition::Hot], 5, 100, 0.9)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn delete_documents_for_path_cascades() {
        let store = memory_store().await;
        let doc = sample_doc("gone.txt", "content");
        let path = doc.source_path_or_handle.clone();
        let chunks = vec![Chunk { id: String::new(), document_id: String::new(), index: 0, text: "content".to_string() }];
        store.upsert_document(doc, &chunks, &[vec![1.0]]).await.unwrap();

        let deleted = store.delete_documents_for_path(SourceType::File, &path).await.unwrap();
        assert_eq!(deleted, 1);

        let hits = store
            .lexical_search("content", &SourceFilters::default(), &[], 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = memory_store().await;
        let checkpoint = BackfillCheckpoint {
            key: "file:home".to_string(),
            source_type: SourceType::File,
            scope_label: "home".to_string(),
            cursor: Some("abc".to_string()),
            last_indexed_path: None,
            last_indexed_timestamp: None,
            resume_token: None,
            items_processed: 4,
            items_skipped: 1,
            estimated_total: 10,
            status: CheckpointStatus::Running,
            updated_at: Utc::now(),
        };
        store.save_checkpoint(&checkpoint).await.unwrap();
        let loaded = store.load_checkpoint("file:home").await.unwrap().unwrap();
        assert_eq!(loaded.items_processed, 4);
    }

    #[test]
    fn risk_labels_detect_sensitive_markers() {
        assert_eq!(risk_for_body("my password=hunter2"), RiskLabel::High);
        assert_eq!(risk_for_body("internal use only doc"), RiskLabel::Medium);
        assert_eq!(risk_for_body("just some notes"), RiskLabel::Low);
    }

    #[test]
    fn match_expression_drops_stopwords_and_short_terms() {
        let expr = build_fts_match_expression("the of a fox").unwrap();
        assert!(expr.contains("fox"));
        assert!(!expr.to_lowercase().contains("\"the\""));
    }

    #[test]
    fn match_expression_empty_for_only_stopwords() {
        assert!(build_fts_match_expression("the a of").is_none());
    }

    #[test]
    fn match_expression_ands_anchor_against_content_disjunction() {
        let expr = build_fts_match_expression("rs2024 quick brown").unwrap();
        assert!(expr.contains("AND"));
        assert!(expr.contains("OR"));
    }

    #[tokio::test]
    async fn path_title_anchor_surfaces_title_match_not_in_content() {
        let store = memory_store().await;
        let mut doc = sample_doc("readme.txt", "nothing in common with the search term");
        doc.title = Some("onboarding template".to_string());
        store.upsert_document(doc, &[], &[]).await.unwrap();

        let hits = store
            .lexical_search("template", &SourceFilters::default(), &[], 10)
            .await
            .unwrap();
        assert!(hits.iter().any(|h| h.snippet.contains("template")));
    }
}
