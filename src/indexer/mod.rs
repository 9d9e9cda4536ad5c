//! Chunk indexing: the write path from raw text to a chunk present in the
//! row store, the lexical index, and every model's embedding table.
//!
//! Indexing is split in two. [`ChunkIndexer::prepare`] does the slow,
//! side-effect-free work (segmentation and embedding) before any transaction
//! is open. [`ChunkIndexer::persist`] writes the rows inside the caller's
//! transaction and stages the graph inserts in an [`AnnBatch`], which the
//! caller applies once the transaction has committed.

use crate::ann::{AnnBatch, AnnIndexManager};
use crate::db::{self, TextChunk};
use crate::error::{Error, Result};
use crate::models::EmbeddingModels;
use crate::text::TextAnalyzer;
use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Source of chunk ids
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// A chunk ready to be written: row contents plus one vector per model
#[derive(Debug, Clone)]
pub struct PreparedChunk {
    pub chunk: TextChunk,
    pub embeddings: Vec<(String, Vec<f32>)>,
}

pub struct ChunkIndexer {
    analyzer: Arc<TextAnalyzer>,
    models: Arc<EmbeddingModels>,
    graphs: Arc<AnnIndexManager>,
    ids: Arc<dyn IdGenerator>,
}

impl ChunkIndexer {
    pub fn new(
        analyzer: Arc<TextAnalyzer>,
        models: Arc<EmbeddingModels>,
        graphs: Arc<AnnIndexManager>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            analyzer,
            models,
            graphs,
            ids,
        }
    }

    /// Segment `raw_text` and embed it with every configured model.
    ///
    /// Fails with `Validation` if a provider returns other than one vector,
    /// or a vector whose dimension disagrees with the model's graph.
    pub async fn prepare(&self, document_id: &str, raw_text: &str) -> Result<PreparedChunk> {
        let id = self.ids.next_id();
        let seg_content = self.analyzer.seg_content(raw_text);
        debug!("Chunk {} seg_content: {}", id, seg_content);

        let mut embeddings = Vec::with_capacity(self.models.len());
        for (model_id, model) in self.models.iter() {
            let vector = model.embed_one(raw_text).await?;
            self.check_dimension(model_id, &vector)?;
            embeddings.push((model_id.clone(), vector));
        }

        Ok(PreparedChunk {
            chunk: TextChunk {
                id,
                document_id: document_id.to_string(),
                content: raw_text.to_string(),
                seg_content,
                created_at: Utc::now().to_rfc3339(),
            },
            embeddings,
        })
    }

    /// Prepare several texts for one document. Every model must return the
    /// same dimension across the whole batch.
    pub async fn prepare_all(
        &self,
        document_id: &str,
        texts: &[String],
    ) -> Result<Vec<PreparedChunk>> {
        let mut prepared: Vec<PreparedChunk> = Vec::with_capacity(texts.len());

        for text in texts {
            let chunk = self.prepare(document_id, text).await?;
            if let Some(first) = prepared.first() {
                for ((model_id, expected), (_, got)) in first.embeddings.iter().zip(&chunk.embeddings) {
                    if expected.len() != got.len() {
                        return Err(Error::Validation(format!(
                            "embedding model '{}' returned {} and {} dimensions in one batch",
                            model_id,
                            expected.len(),
                            got.len()
                        )));
                    }
                }
            }
            prepared.push(chunk);
        }

        Ok(prepared)
    }

    /// Write a prepared chunk inside the caller's transaction and stage its
    /// graph inserts
    pub async fn persist(
        &self,
        conn: &mut SqliteConnection,
        prepared: PreparedChunk,
        batch: &mut AnnBatch,
    ) -> Result<TextChunk> {
        let PreparedChunk { chunk, embeddings } = prepared;

        db::insert_chunk(conn, &chunk).await?;

        for (model_id, vector) in embeddings {
            db::insert_embedding(conn, &model_id, &chunk.id, &vector).await?;
            batch.insert(&model_id, &chunk.id, vector);
        }

        Ok(chunk)
    }

    /// `prepare` followed by `persist`
    #[cfg(test)]
    pub async fn index(
        &self,
        conn: &mut SqliteConnection,
        document_id: &str,
        raw_text: &str,
        batch: &mut AnnBatch,
    ) -> Result<TextChunk> {
        let prepared = self.prepare(document_id, raw_text).await?;
        self.persist(conn, prepared, batch).await
    }

    fn check_dimension(&self, model_id: &str, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::Validation(format!(
                "embedding model '{}' returned an empty vector",
                model_id
            )));
        }

        let expected = self.graphs.get(model_id).and_then(|g| g.dimension());
        match expected {
            Some(dim) if dim != vector.len() => Err(Error::Validation(format!(
                "embedding model '{}' returned {} dimensions, index holds {}",
                model_id,
                vector.len(),
                dim
            ))),
            _ => Ok(()),
        }
    }
}
