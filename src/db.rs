//! Database connection setup: WAL journal mode, the PRAGMA set the store
//! relies on, and the migration call performed once at open.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .pragma("temp_store", "MEMORY");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    crate::migrate::run_migrations(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, IndexingProfile};

    #[tokio::test]
    async fn connect_creates_parent_dir_and_migrates() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("daemon.sqlite");
        let config = Config {
            host: "127.0.0.1".into(),
            port: 7420,
            auth_token: "secret".into(),
            indexing_profile: IndexingProfile::Balanced,
            startup_allowlist_roots: vec![tmp.path().to_path_buf()],
            queue_batch_size: 64,
            db: DbConfig { path: db_path.clone() },
            embedding: Default::default(),
            retrieval: Default::default(),
            policy: Default::default(),
        };
        let pool = connect(&config).await.unwrap();
        assert!(db_path.exists());
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
