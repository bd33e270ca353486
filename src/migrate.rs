//! Database schema migrations.
//!
//! Creates every table the store relies on (documents, the FTS5 virtual
//! table over chunk text, packed-blob chunk vectors, graph edges, backfill
//! checkpoints/jobs, queue snapshots, audit events, ingestion attempts, and
//! the single-row service-state table) and the indexes the query paths
//! need. Idempotent: every statement is `IF NOT EXISTS`, so this runs once
//! per `connect()` call with no separate `init` step.

use anyhow::Result;
use sqlx::sqlite::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            title TEXT,
            body TEXT NOT NULL,
            source_path_or_handle TEXT NOT NULL,
            updated_at REAL NOT NULL,
            risk TEXT NOT NULL DEFAULT 'low',
            partition_label TEXT NOT NULL DEFAULT 'hot',
            searchable INTEGER NOT NULL DEFAULT 1,
            UNIQUE(source_type, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_partition ON documents(partition_label)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_searchable ON documents(searchable)")
        .execute(pool)
        .await?;

    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;
    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                document_id UNINDEXED,
                source_type UNINDEXED,
                title,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            vector_blob BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_document_id ON chunk_vectors(document_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS graph_edges (
            id TEXT PRIMARY KEY,
            source_node TEXT NOT NULL,
            target_node TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            confidence REAL NOT NULL,
            weight REAL NOT NULL,
            source_type TEXT NOT NULL,
            event_time REAL,
            updated_at REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_graph_edges_source ON graph_edges(source_node)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(target_node)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS backfill_checkpoints (
            checkpoint_key TEXT PRIMARY KEY,
            payload_json BLOB NOT NULL,
            updated_at REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS backfill_jobs (
            id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            scope_label TEXT NOT NULL,
            mode TEXT NOT NULL,
            status TEXT NOT NULL,
            items_processed INTEGER NOT NULL DEFAULT 0,
            items_skipped INTEGER NOT NULL DEFAULT 0,
            created_at REAL NOT NULL,
            updated_at REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_snapshots (
            id TEXT PRIMARY KEY,
            payload_json BLOB NOT NULL,
            created_at REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_events (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            payload_json BLOB NOT NULL,
            created_at REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingestion_attempts (
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            outcome TEXT NOT NULL,
            detail TEXT,
            attempted_at REAL NOT NULL,
            PRIMARY KEY (source_type, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS service_state (
            state_key TEXT PRIMARY KEY,
            state_value TEXT NOT NULL,
            updated_at REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type IN ('table','view') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<String> = tables.into_iter().map(|(n,)| n).collect();
        for expected in [
            "documents",
            "chunks_fts",
            "chunk_vectors",
            "graph_edges",
            "backfill_checkpoints",
            "backfill_jobs",
            "queue_snapshots",
            "audit_events",
            "ingestion_attempts",
            "service_state",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing table {expected}");
        }
    }
}
