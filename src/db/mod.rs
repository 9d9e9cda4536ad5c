//! Relational storage using SQLite
//!
//! This module owns the persistent tables:
//! - `document` (caller-identified documents with JSON metadata)
//! - `text_chunk` (chunk text and derived seg_content)
//! - `text_chunk_fts` (FTS5 lexical index keyed by chunk id)
//! - `text_embedding` (per-model vectors)
//!
//! Row operations are free functions over `&mut SqliteConnection`, so the
//! same code runs against a pooled connection or inside a transaction.
//! Cascading deletes are done here, in dependency order, because the FTS
//! table cannot carry foreign keys.

mod schema;

pub use schema::*;

use crate::codec::encode_vector;
use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::types::Json;
use sqlx::{FromRow, Sqlite, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// A document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub description: String,
    #[sqlx(rename = "data")]
    pub metadata: Json<Value>,
    pub created_at: String,
}

impl Document {
    pub fn new(id: String, title: String, description: String, metadata: Value) -> Self {
        Self {
            id,
            title,
            description,
            metadata: Json(metadata),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A text chunk
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub seg_content: String,
    pub created_at: String,
}

/// Row counts across the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub embedding_count: usize,
    /// Embedding rows per model id, including models no longer configured
    pub embeddings_by_model: BTreeMap<String, usize>,
}

/// Database handle
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and apply the schema
    pub async fn connect(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(busy_timeout)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Apply the schema; every statement is idempotent
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get row counts
    pub async fn stats(&self) -> Result<StoreStats> {
        let document_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document")
            .fetch_one(&self.pool)
            .await?;

        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM text_chunk")
            .fetch_one(&self.pool)
            .await?;

        let per_model: Vec<(String, i64)> = sqlx::query_as(
            "SELECT model_id, COUNT(*) FROM text_embedding GROUP BY model_id ORDER BY model_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let embeddings_by_model: BTreeMap<String, usize> = per_model
            .into_iter()
            .map(|(model, n)| (model, n as usize))
            .collect();

        Ok(StoreStats {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            embedding_count: embeddings_by_model.values().sum(),
            embeddings_by_model,
        })
    }
}

// ===== Document Operations =====

pub async fn insert_document(conn: &mut SqliteConnection, doc: &Document) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO document (id, title, description, data, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.title)
    .bind(&doc.description)
    .bind(&doc.metadata)
    .bind(&doc.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get_document(conn: &mut SqliteConnection, id: &str) -> Result<Option<Document>> {
    let doc = sqlx::query_as::<_, Document>(
        "SELECT id, title, description, data, created_at FROM document WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(doc)
}

pub async fn document_exists(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM document WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Delete a document and everything it owns. Returns the removed chunk ids,
/// or `None` if the document did not exist.
pub async fn delete_document(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Vec<String>>> {
    if !document_exists(conn, id).await? {
        return Ok(None);
    }

    let chunk_ids = chunk_ids_for_document(conn, id).await?;

    sqlx::query(
        "DELETE FROM text_embedding WHERE text_chunk_id IN (SELECT id FROM text_chunk WHERE document_id = ?)",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "DELETE FROM text_chunk_fts WHERE id IN (SELECT id FROM text_chunk WHERE document_id = ?)",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM text_chunk WHERE document_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM document WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(Some(chunk_ids))
}

// ===== Chunk Operations =====

/// Insert a chunk row together with its lexical index entry
pub async fn insert_chunk(conn: &mut SqliteConnection, chunk: &TextChunk) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO text_chunk (id, document_id, content, seg_content, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&chunk.id)
    .bind(&chunk.document_id)
    .bind(&chunk.content)
    .bind(&chunk.seg_content)
    .bind(&chunk.created_at)
    .execute(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO text_chunk_fts (id, seg_content) VALUES (?, ?)")
        .bind(&chunk.id)
        .bind(&chunk.seg_content)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn get_chunk(conn: &mut SqliteConnection, id: &str) -> Result<Option<TextChunk>> {
    let chunk = sqlx::query_as::<_, TextChunk>(
        "SELECT id, document_id, content, seg_content, created_at FROM text_chunk WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(chunk)
}

/// Chunks of a document in insertion order
pub async fn list_chunks(conn: &mut SqliteConnection, document_id: &str) -> Result<Vec<TextChunk>> {
    let chunks = sqlx::query_as::<_, TextChunk>(
        r#"
        SELECT id, document_id, content, seg_content, created_at
        FROM text_chunk WHERE document_id = ?
        ORDER BY created_at, rowid
        "#,
    )
    .bind(document_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(chunks)
}

pub async fn chunk_ids_for_document(
    conn: &mut SqliteConnection,
    document_id: &str,
) -> Result<Vec<String>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM text_chunk WHERE document_id = ? ORDER BY created_at, rowid",
    )
    .bind(document_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Delete one chunk with its lexical entry and embeddings. Returns false if absent.
pub async fn delete_chunk(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    sqlx::query("DELETE FROM text_embedding WHERE text_chunk_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM text_chunk_fts WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query("DELETE FROM text_chunk WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Number of lexical index entries for a chunk id
pub async fn count_lexical_entries(conn: &mut SqliteConnection, chunk_id: &str) -> Result<usize> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM text_chunk_fts WHERE id = ?")
        .bind(chunk_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(n as usize)
}

// ===== Embedding Operations =====

pub async fn insert_embedding(
    conn: &mut SqliteConnection,
    model_id: &str,
    chunk_id: &str,
    vector: &[f32],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO text_embedding (model_id, text_chunk_id, vector, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(model_id)
    .bind(chunk_id)
    .bind(encode_vector(vector))
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Model ids that have an embedding row for the chunk
pub async fn embedding_models_for_chunk(
    conn: &mut SqliteConnection,
    chunk_id: &str,
) -> Result<Vec<String>> {
    let models: Vec<String> = sqlx::query_scalar(
        "SELECT model_id FROM text_embedding WHERE text_chunk_id = ? ORDER BY model_id",
    )
    .bind(chunk_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(models)
}

/// Every stored `(chunk_id, blob)` for a model, in insertion order
pub async fn embeddings_for_model(
    conn: &mut SqliteConnection,
    model_id: &str,
) -> Result<Vec<(String, Vec<u8>)>> {
    let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
        "SELECT text_chunk_id, vector FROM text_embedding WHERE model_id = ? ORDER BY rowid",
    )
    .bind(model_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Database, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = Database::connect(&tmp.path().join("test.db"), Duration::from_secs(5))
            .await
            .unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_storage_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let err = Database::connect(&blocker.join("sub/test.db"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Storage);
    }

    fn chunk(id: &str, doc: &str, content: &str) -> TextChunk {
        TextChunk {
            id: id.to_string(),
            document_id: doc.to_string(),
            content: content.to_string(),
            seg_content: content.to_lowercase(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let (db, _tmp) = setup_test_db().await;
        db.init_schema().await.unwrap();
        db.init_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_document_roundtrip() {
        let (db, _tmp) = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let doc = Document::new(
            "doc-1".to_string(),
            "Title".to_string(),
            "Desc".to_string(),
            json!({"lang": "en", "tags": ["a"]}),
        );
        insert_document(&mut conn, &doc).await.unwrap();

        let loaded = get_document(&mut conn, "doc-1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "Title");
        assert_eq!(loaded.metadata.0["lang"], "en");
        assert!(get_document(&mut conn, "missing").await.unwrap().is_none());

        // Caller-supplied ids are unique
        assert!(insert_document(&mut conn, &doc).await.is_err());
    }

    #[tokio::test]
    async fn test_chunk_requires_document() {
        let (db, _tmp) = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        assert!(insert_chunk(&mut conn, &chunk("c1", "nope", "text"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cascading_document_delete() {
        let (db, _tmp) = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let doc = Document::new("d".into(), "".into(), "".into(), json!({}));
        insert_document(&mut conn, &doc).await.unwrap();
        insert_chunk(&mut conn, &chunk("c1", "d", "alpha")).await.unwrap();
        insert_chunk(&mut conn, &chunk("c2", "d", "beta")).await.unwrap();
        insert_embedding(&mut conn, "m", "c1", &[1.0, 2.0]).await.unwrap();
        insert_embedding(&mut conn, "m", "c2", &[3.0, 4.0]).await.unwrap();

        assert_eq!(list_chunks(&mut conn, "d").await.unwrap().len(), 2);
        assert_eq!(count_lexical_entries(&mut conn, "c1").await.unwrap(), 1);

        let removed = delete_document(&mut conn, "d").await.unwrap().unwrap();
        assert_eq!(removed, vec!["c1".to_string(), "c2".to_string()]);

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.chunk_count, 0);
        assert_eq!(stats.embedding_count, 0);
        assert_eq!(count_lexical_entries(&mut conn, "c1").await.unwrap(), 0);

        assert!(delete_document(&mut conn, "d").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_chunk() {
        let (db, _tmp) = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let doc = Document::new("d".into(), "".into(), "".into(), json!({}));
        insert_document(&mut conn, &doc).await.unwrap();
        insert_chunk(&mut conn, &chunk("c1", "d", "alpha")).await.unwrap();
        insert_embedding(&mut conn, "m", "c1", &[1.0]).await.unwrap();

        assert!(delete_chunk(&mut conn, "c1").await.unwrap());
        assert!(!delete_chunk(&mut conn, "c1").await.unwrap());
        assert!(embedding_models_for_chunk(&mut conn, "c1")
            .await
            .unwrap()
            .is_empty());
        assert!(document_exists(&mut conn, "d").await.unwrap());
    }

    #[tokio::test]
    async fn test_embedding_unique_per_model() {
        let (db, _tmp) = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let doc = Document::new("d".into(), "".into(), "".into(), json!({}));
        insert_document(&mut conn, &doc).await.unwrap();
        insert_chunk(&mut conn, &chunk("c1", "d", "alpha")).await.unwrap();
        insert_embedding(&mut conn, "m1", "c1", &[1.0]).await.unwrap();
        insert_embedding(&mut conn, "m2", "c1", &[1.0]).await.unwrap();
        assert!(insert_embedding(&mut conn, "m1", "c1", &[2.0]).await.is_err());

        let rows = embeddings_for_model(&mut conn, "m1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, encode_vector(&[1.0]));

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.embeddings_by_model.get("m2"), Some(&1));
        assert_eq!(stats.embedding_count, 2);
    }

    #[tokio::test]
    async fn test_transaction_rollback_on_drop() {
        let (db, _tmp) = setup_test_db().await;

        {
            let mut tx = db.begin().await.unwrap();
            let doc = Document::new("d".into(), "".into(), "".into(), json!({}));
            insert_document(&mut tx, &doc).await.unwrap();
            insert_chunk(&mut tx, &chunk("c1", "d", "alpha")).await.unwrap();
            // dropped without commit
        }

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(!document_exists(&mut conn, "d").await.unwrap());
        assert_eq!(count_lexical_entries(&mut conn, "c1").await.unwrap(), 0);
    }
}
