//! Full-text search over `seg_content`

use super::SearchHit;
use crate::error::Result;
use sqlx::sqlite::SqliteConnection;

/// Run `query` as an FTS5 MATCH expression, best match first.
///
/// FTS5 ranks with bm25, where smaller is better, so the score is the
/// negated rank.
pub async fn search(conn: &mut SqliteConnection, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let hits = sqlx::query_as::<_, SearchHit>(
        r#"
        SELECT
            tc.id AS chunk_id,
            tc.content,
            tc.document_id,
            d.title,
            d.description,
            -fts.rank AS score
        FROM text_chunk_fts fts
        JOIN text_chunk tc ON tc.id = fts.id
        JOIN document d ON d.id = tc.document_id
        WHERE fts.seg_content MATCH ?
        ORDER BY fts.rank
        LIMIT ?
        "#,
    )
    .bind(query)
    .bind(limit as i64)
    .fetch_all(&mut *conn)
    .await?;

    Ok(hits)
}
