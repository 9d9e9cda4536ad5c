//! Query routing across the lexical index and the per-model ANN graphs
//!
//! A request names a backend: the reserved id `bm25` selects full-text
//! search, any other id must be a configured embedding model with a loaded
//! graph. Both paths return [`SearchHit`]s where a higher score is better.

pub mod lexical;

use crate::ann::AnnIndexManager;
use crate::config::{SearchConfig, LEXICAL_MODEL_ID};
use crate::error::{Error, Result};
use crate::models::EmbeddingModels;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Graph candidates fetched per requested hit, so rows deleted since the
/// graph last saw them do not shorten the result
const ANN_OVERFETCH: usize = 2;

/// One ranked chunk with its document's title and description
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub content: String,
    pub document_id: String,
    pub title: String,
    pub description: String,
    pub score: f64,
}

/// Parse a caller-supplied limit. Missing, non-numeric or non-positive values
/// give `default`; anything above `max` is capped.
pub fn resolve_limit(raw: Option<&str>, default: usize, max: usize) -> usize {
    let limit = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n as usize)
        .unwrap_or(default);
    limit.min(max)
}

/// Routes a query to lexical search or a model's ANN graph
pub struct SearchDispatcher {
    pool: SqlitePool,
    models: Arc<EmbeddingModels>,
    graphs: Arc<AnnIndexManager>,
    settings: SearchConfig,
}

impl SearchDispatcher {
    pub fn new(
        pool: SqlitePool,
        models: Arc<EmbeddingModels>,
        graphs: Arc<AnnIndexManager>,
        settings: SearchConfig,
    ) -> Self {
        Self {
            pool,
            models,
            graphs,
            settings,
        }
    }

    /// `bm25` followed by every embedding model that has a graph
    pub fn list_models(&self) -> Vec<String> {
        std::iter::once(LEXICAL_MODEL_ID.to_string())
            .chain(
                self.models
                    .keys()
                    .filter(|id| self.graphs.get(id).is_some())
                    .cloned(),
            )
            .collect()
    }

    pub async fn search(
        &self,
        model_id: &str,
        query: &str,
        limit: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(Error::BadRequest("query must not be empty".to_string()));
        }
        let limit = resolve_limit(limit, self.settings.default_limit, self.settings.max_limit);

        if model_id.eq_ignore_ascii_case(LEXICAL_MODEL_ID) {
            debug!("Lexical search for {:?} (limit {})", query, limit);
            let mut conn = self.pool.acquire().await?;
            return lexical::search(&mut conn, query, limit).await;
        }

        let (model, graph) = match (self.models.get(model_id), self.graphs.get(model_id)) {
            (Some(model), Some(graph)) => (model, graph),
            _ => return Err(Error::NotFound(format!("model '{}'", model_id))),
        };

        // No pooled connection is held across the provider round trip
        let vector = model.embed_one(query).await?;
        let neighbours = graph.search(&vector, limit.saturating_mul(ANN_OVERFETCH))?;
        debug!(
            "ANN search on '{}' returned {} candidates",
            model_id,
            neighbours.len()
        );

        let mut rows = {
            let mut conn = self.pool.acquire().await?;
            hydrate(&mut conn, neighbours.iter().map(|(id, _)| id.as_str())).await?
        };

        let mut hits = Vec::with_capacity(neighbours.len());
        for (chunk_id, distance) in neighbours {
            match rows.remove(&chunk_id) {
                Some(mut hit) => {
                    hit.score = -(distance as f64);
                    hits.push(hit);
                }
                // Deleted since the graph last saw it
                None => warn!("ANN graph '{}' returned unknown chunk {}", model_id, chunk_id),
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Load chunk and document fields for the given chunk ids
async fn hydrate<'a>(
    conn: &mut SqliteConnection,
    ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, SearchHit>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT
            tc.id AS chunk_id,
            tc.content,
            tc.document_id,
            d.title,
            d.description,
            0.0 AS score
        FROM text_chunk tc
        JOIN document d ON d.id = tc.document_id
        WHERE tc.id IN (
        "#,
    );

    let mut count = 0;
    {
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
            count += 1;
        }
    }
    if count == 0 {
        return Ok(HashMap::new());
    }
    builder.push(")");

    let hits = builder
        .build_query_as::<SearchHit>()
        .fetch_all(&mut *conn)
        .await?;

    Ok(hits.into_iter().map(|h| (h.chunk_id.clone(), h)).collect())
}
