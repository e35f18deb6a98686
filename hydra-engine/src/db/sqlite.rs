//! SQLite-backed document store
//!
//! Single `documents` table; bodies are JSON text, `user_id` and
//! `recorded_at_ms` are copied out of the body on write so queries can use
//! them. Batches run in one transaction.

use super::{index_fields, Collection, DocumentQuery, DocumentStore, DocumentWrite};
use async_trait::async_trait;
use hydra_common::Result;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Sqlite};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) a database file
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        debug!("Connecting to database: {}", db_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        Self::from_pool(pool).await
    }

    /// Private in-memory database (tests)
    pub async fn in_memory() -> Result<Self> {
        // each connection would get its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, creating the table if needed
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            doc_key TEXT NOT NULL,
            user_id TEXT,
            recorded_at_ms INTEGER,
            body TEXT NOT NULL,
            PRIMARY KEY (collection, doc_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_user_time ON documents(collection, user_id, recorded_at_ms)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn upsert<'e, E>(executor: E, collection: Collection, key: &str, value: &Value) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let index = index_fields(value);
    let body = serde_json::to_string(value)?;

    sqlx::query(
        r#"
        INSERT INTO documents (collection, doc_key, user_id, recorded_at_ms, body)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(collection, doc_key) DO UPDATE SET
            user_id = excluded.user_id,
            recorded_at_ms = excluded.recorded_at_ms,
            body = excluded.body
        "#,
    )
    .bind(collection.as_str())
    .bind(key)
    .bind(index.user_id)
    .bind(index.recorded_at_ms)
    .bind(body)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ? AND doc_key = ?")
                .bind(collection.as_str())
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
        upsert(&self.pool, collection, key, &value).await
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Value>> {
        let bodies: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT body FROM documents
            WHERE collection = ?1
              AND (?2 IS NULL OR user_id = ?2)
              AND (?3 IS NULL OR recorded_at_ms >= ?3)
              AND (?4 IS NULL OR recorded_at_ms < ?4)
            ORDER BY recorded_at_ms, doc_key
            "#,
        )
        .bind(query.collection.as_str())
        .bind(query.user_id.as_deref())
        .bind(query.from.map(|ts| ts.timestamp_millis()))
        .bind(query.to.map(|ts| ts.timestamp_millis()))
        .fetch_all(&self.pool)
        .await?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(Into::into))
            .collect()
    }

    async fn write_batch(&self, writes: Vec<DocumentWrite>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for write in &writes {
            upsert(&mut *tx, write.collection, &write.key, &write.value).await?;
        }
        tx.commit().await?;
        debug!(count = writes.len(), "Committed document batch");
        Ok(())
    }
}
