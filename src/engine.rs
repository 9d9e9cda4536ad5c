//! The document engine: the one object every surface talks to
//!
//! Owns the SQLite pool, the text analyzer, the embedding and generation
//! providers, and the ANN graphs. Every mutation runs in one SQLite
//! transaction; graph changes are staged and applied after commit. Commit
//! and apply happen under one write lock, so graphs see mutations in the
//! order the database committed them.

use crate::ann::{AnnBatch, AnnIndexManager};
use crate::codec::decode_vector;
use crate::config::Config;
use crate::db::{self, Database, Document, StoreStats, TextChunk};
use crate::error::{Error, Result};
use crate::indexer::{ChunkIndexer, IdGenerator, PreparedChunk, UuidGenerator};
use crate::models::{build_embedding_models, GenerationModel, Generator};
use crate::search::{SearchDispatcher, SearchHit};
use crate::text::TextAnalyzer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Input for [`Engine::create_document`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub texts: Vec<String>,
    /// Replace an existing document with the same id
    #[serde(default)]
    pub overwrite: bool,
    /// Append a generated summary as an extra chunk
    #[serde(default)]
    pub summarize: bool,
}

/// A document, optionally with its chunks in creation order
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<TextChunk>>,
}

/// Per-graph counters
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub tombstones: usize,
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub graphs: BTreeMap<String, GraphStats>,
}

pub struct Engine {
    db: Database,
    graphs: Arc<AnnIndexManager>,
    indexer: ChunkIndexer,
    dispatcher: SearchDispatcher,
    generator: Option<GenerationModel>,
    /// Held from transaction begin until the staged batch is applied
    writes: Mutex<()>,
    shutting_down: AtomicBool,
}

impl Engine {
    /// Open the store described by `config`.
    ///
    /// Fails if the database cannot be opened, the text tables cannot be
    /// loaded, a provider is misconfigured, or any model's ANN file is
    /// missing or corrupt.
    pub async fn open(config: &Config) -> Result<Self> {
        Self::open_with_ids(config, Arc::new(UuidGenerator)).await
    }

    pub async fn open_with_ids(config: &Config, ids: Arc<dyn IdGenerator>) -> Result<Self> {
        let db = Database::connect(
            &config.paths.db_file,
            Duration::from_secs(config.busy_timeout_secs),
        )
        .await?;

        let analyzer = Arc::new(TextAnalyzer::new(config.text.clone())?);
        let models = Arc::new(build_embedding_models(&config.embedding_models)?);
        let graphs = Arc::new(AnnIndexManager::open(config)?);
        let generator = config
            .generation_model
            .as_ref()
            .map(GenerationModel::from_config)
            .transpose()?;

        info!(
            "Opened store at {:?} with {} embedding model(s)",
            config.paths.db_file,
            models.len()
        );

        Ok(Self {
            indexer: ChunkIndexer::new(analyzer, models.clone(), graphs.clone(), ids),
            dispatcher: SearchDispatcher::new(
                db.pool().clone(),
                models,
                graphs.clone(),
                config.search.clone(),
            ),
            db,
            graphs,
            generator,
            writes: Mutex::new(()),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Create empty ANN save files for configured models that have none
    pub fn init_indexes(config: &Config) -> Result<Vec<PathBuf>> {
        AnnIndexManager::init_files(config)
    }

    pub fn graphs(&self) -> &AnnIndexManager {
        &self.graphs
    }

    /// Create a document and index `texts` as its chunks. Returns the number
    /// of chunks written.
    pub async fn create_document(&self, new: NewDocument) -> Result<usize> {
        self.ensure_open()?;

        let NewDocument {
            id,
            title,
            description,
            metadata,
            mut texts,
            overwrite,
            summarize,
        } = new;

        if summarize && !texts.is_empty() {
            if let Some(generator) = &self.generator {
                match generator.generate(&texts).await {
                    Ok(summary) => {
                        debug!("Summary for document {}: {}", id, summary);
                        texts.push(summary);
                    }
                    Err(e) => error!("Failed to summarize document {}: {}", id, e),
                }
            }
        }

        let prepared = self.indexer.prepare_all(&id, &texts).await?;
        let metadata = if metadata.is_null() { json!({}) } else { metadata };
        let document = Document::new(id, title, description, metadata);

        let _writes = self.writes.lock().await;
        let mut batch = AnnBatch::new();
        let count = self
            .write_document(&document, prepared, overwrite, &mut batch)
            .await
            .inspect_err(|e| error!("Rolled back creation of document {}: {}", document.id, e))?;

        self.graphs.apply(batch);
        Ok(count)
    }

    async fn write_document(
        &self,
        document: &Document,
        prepared: Vec<PreparedChunk>,
        overwrite: bool,
        batch: &mut AnnBatch,
    ) -> Result<usize> {
        let mut tx = self.db.begin().await?;

        if db::document_exists(&mut tx, &document.id).await? {
            if !overwrite {
                return Err(Error::BadRequest(format!(
                    "document '{}' already exists",
                    document.id
                )));
            }
            if let Some(removed) = db::delete_document(&mut tx, &document.id).await? {
                info!(
                    "Deleted existing document {} ({} chunks) for overwrite",
                    document.id,
                    removed.len()
                );
                for chunk_id in &removed {
                    batch.remove(chunk_id);
                }
            }
        }

        db::insert_document(&mut tx, document).await?;

        let count = prepared.len();
        for chunk in prepared {
            self.indexer.persist(&mut tx, chunk, batch).await?;
        }

        tx.commit().await?;
        Ok(count)
    }

    pub async fn get_document(&self, id: &str, with_chunks: bool) -> Result<DocumentView> {
        let mut conn = self.db.pool().acquire().await?;

        let document = db::get_document(&mut conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document '{}'", id)))?;

        let chunks = if with_chunks {
            Some(db::list_chunks(&mut conn, id).await?)
        } else {
            None
        };

        Ok(DocumentView { document, chunks })
    }

    /// Delete a document with all its chunks. Returns the number of chunks removed.
    pub async fn delete_document(&self, id: &str) -> Result<usize> {
        self.ensure_open()?;

        let _writes = self.writes.lock().await;
        let mut tx = self.db.begin().await?;
        let removed = db::delete_document(&mut tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document '{}'", id)))?;
        tx.commit().await?;

        let mut batch = AnnBatch::new();
        for chunk_id in &removed {
            batch.remove(chunk_id);
        }
        self.graphs.apply(batch);

        info!("Deleted document {} ({} chunks)", id, removed.len());
        Ok(removed.len())
    }

    /// Index one more chunk for an existing document
    pub async fn add_chunk(&self, document_id: &str, text: &str) -> Result<TextChunk> {
        self.ensure_open()?;

        {
            let mut conn = self.db.pool().acquire().await?;
            if !db::document_exists(&mut conn, document_id).await? {
                return Err(Error::NotFound(format!("document '{}'", document_id)));
            }
        }

        let prepared = self.indexer.prepare(document_id, text).await?;

        let _writes = self.writes.lock().await;
        let mut batch = AnnBatch::new();
        let mut tx = self.db.begin().await?;
        // The document may have been deleted while the chunk was embedded
        if !db::document_exists(&mut tx, document_id).await? {
            return Err(Error::NotFound(format!("document '{}'", document_id)));
        }
        let chunk = self
            .indexer
            .persist(&mut tx, prepared, &mut batch)
            .await
            .inspect_err(|e| error!("Rolled back chunk for document {}: {}", document_id, e))?;
        tx.commit().await?;

        self.graphs.apply(batch);
        Ok(chunk)
    }

    pub async fn get_chunk(&self, id: &str) -> Result<TextChunk> {
        let mut conn = self.db.pool().acquire().await?;
        db::get_chunk(&mut conn, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("text chunk '{}'", id)))
    }

    pub async fn delete_chunk(&self, id: &str) -> Result<()> {
        self.ensure_open()?;

        let _writes = self.writes.lock().await;
        let mut tx = self.db.begin().await?;
        if !db::delete_chunk(&mut tx, id).await? {
            return Err(Error::NotFound(format!("text chunk '{}'", id)));
        }
        tx.commit().await?;

        let mut batch = AnnBatch::new();
        batch.remove(id);
        self.graphs.apply(batch);
        Ok(())
    }

    /// Search with the lexical engine (`bm25`) or a named embedding model
    pub async fn search(
        &self,
        model_id: &str,
        query: &str,
        limit: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        self.dispatcher.search(model_id, query, limit).await
    }

    pub fn list_models(&self) -> Vec<String> {
        self.dispatcher.list_models()
    }

    /// Refill a model's graph from its stored embeddings. Returns the node count.
    ///
    /// Writes wait until the new graph is swapped in; searches keep using
    /// the old graph meanwhile.
    pub async fn rebuild_index(&self, model_id: &str) -> Result<usize> {
        self.ensure_open()?;

        if self.graphs.get(model_id).is_none() {
            return Err(Error::NotFound(format!("model '{}'", model_id)));
        }

        let _writes = self.writes.lock().await;
        let rows = {
            let mut conn = self.db.pool().acquire().await?;
            db::embeddings_for_model(&mut conn, model_id).await?
        };

        let vectors = rows.into_iter().filter_map(|(chunk_id, blob)| {
            match decode_vector(&blob) {
                Some(vector) => Some((chunk_id, vector)),
                None => {
                    warn!(
                        "Skipping chunk {}: stored vector for '{}' is {} bytes",
                        chunk_id,
                        model_id,
                        blob.len()
                    );
                    None
                }
            }
        });

        let count = self.graphs.rebuild(model_id, vectors)?;
        info!("Rebuilt ANN graph '{}' with {} nodes", model_id, count);
        Ok(count)
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        let store = self.db.stats().await?;
        let graphs = self
            .graphs
            .graphs()
            .map(|g| {
                (
                    g.model_id().to_string(),
                    GraphStats {
                        nodes: g.len(),
                        tombstones: g.tombstone_count(),
                        dimension: g.dimension(),
                    },
                )
            })
            .collect();
        Ok(EngineStats { store, graphs })
    }

    /// Stop accepting writes, save every graph and close the pool.
    ///
    /// Save failures are logged. Calling this twice is a no-op.
    pub async fn close(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        // Let an in-flight write apply its batch before the graphs are saved
        let _writes = self.writes.lock().await;
        let failed = self.graphs.flush_all();
        if failed > 0 {
            error!("{} ANN graph(s) could not be saved", failed);
        }

        self.db.close().await;
        info!("Engine closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }
}
