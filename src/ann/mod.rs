//! Approximate nearest-neighbour indexes, one HNSW graph per embedding model
//!
//! Graphs are a rebuildable cache over the `text_embedding` table. Writers
//! collect graph changes in an [`AnnBatch`] and apply it only after their
//! relational transaction has committed.

mod graph;

pub use graph::{AnnGraph, GraphSettings, Metric};

use crate::config::Config;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// A pending graph mutation
#[derive(Debug, Clone, PartialEq)]
pub enum AnnOp {
    Insert {
        model_id: String,
        chunk_id: String,
        vector: Vec<f32>,
    },
    /// Remove from every graph
    Remove { chunk_id: String },
}

/// Graph mutations staged by one unit of work
#[derive(Debug, Default, Clone)]
pub struct AnnBatch {
    ops: Vec<AnnOp>,
}

impl AnnBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model_id: &str, chunk_id: &str, vector: Vec<f32>) {
        self.ops.push(AnnOp::Insert {
            model_id: model_id.to_string(),
            chunk_id: chunk_id.to_string(),
            vector,
        });
    }

    pub fn remove(&mut self, chunk_id: &str) {
        self.ops.push(AnnOp::Remove {
            chunk_id: chunk_id.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Per-model graph registry. The set of graphs is fixed once opened.
#[derive(Debug, Default)]
pub struct AnnIndexManager {
    graphs: BTreeMap<String, AnnGraph>,
}

impl AnnIndexManager {
    pub fn new(graphs: impl IntoIterator<Item = AnnGraph>) -> Self {
        Self {
            graphs: graphs
                .into_iter()
                .map(|g| (g.model_id().to_string(), g))
                .collect(),
        }
    }

    /// Load the graph of every configured model from `index_dir`.
    ///
    /// Fails if any save file is missing or unreadable.
    pub fn open(config: &Config) -> Result<Self> {
        let settings = graph_settings(config);
        let mut graphs = Vec::with_capacity(config.embedding_models.len());

        for model in &config.embedding_models {
            graphs.push(AnnGraph::load(
                model.id.as_str(),
                config.index_file(&model.id),
                settings,
            )?);
        }

        Ok(Self::new(graphs))
    }

    /// Create empty save files for configured models that have none
    pub fn init_files(config: &Config) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();

        for model in &config.embedding_models {
            let path = config.index_file(&model.id);
            if AnnGraph::init_file(&path, config.ann.metric)? {
                info!("Created empty ANN file for '{}' at {:?}", model.id, path);
                created.push(path);
            }
        }

        Ok(created)
    }

    pub fn get(&self, model_id: &str) -> Option<&AnnGraph> {
        self.graphs.get(model_id)
    }

    pub fn model_ids(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }

    pub fn graphs(&self) -> impl Iterator<Item = &AnnGraph> {
        self.graphs.values()
    }

    /// Apply committed mutations. Failures are logged; the relational rows
    /// remain authoritative and `rebuild` can restore the graph.
    pub fn apply(&self, batch: AnnBatch) {
        for op in batch.ops {
            match op {
                AnnOp::Insert {
                    model_id,
                    chunk_id,
                    vector,
                } => match self.graphs.get(&model_id) {
                    Some(graph) => {
                        if let Err(e) = graph.add(&chunk_id, vector) {
                            error!(
                                "Failed to add chunk {} to ANN graph '{}': {}",
                                chunk_id, model_id, e
                            );
                        }
                    }
                    None => warn!(
                        "No ANN graph loaded for model '{}', skipping chunk {}",
                        model_id, chunk_id
                    ),
                },
                AnnOp::Remove { chunk_id } => {
                    for graph in self.graphs.values() {
                        graph.delete(&chunk_id);
                    }
                }
            }
        }
    }

    /// Replace a graph's contents with the given rows. Returns the node count.
    ///
    /// Rows whose dimension disagrees with the first row are skipped.
    pub fn rebuild(
        &self,
        model_id: &str,
        rows: impl IntoIterator<Item = (String, Vec<f32>)>,
    ) -> Result<usize> {
        let graph = self
            .graphs
            .get(model_id)
            .ok_or_else(|| Error::NotFound(format!("ANN graph for model '{}'", model_id)))?;

        Ok(graph.replace(rows))
    }

    /// Save every graph. Failures are logged; returns how many saves failed.
    pub fn flush_all(&self) -> usize {
        let mut failed = 0;
        for graph in self.graphs.values() {
            if let Err(e) = graph.save() {
                error!(
                    "Failed to save ANN graph '{}' to {:?}: {}",
                    graph.model_id(),
                    graph.path(),
                    e
                );
                failed += 1;
            }
        }
        failed
    }
}

pub fn graph_settings(config: &Config) -> GraphSettings {
    GraphSettings {
        metric: config.ann.metric,
        ef_search: config.ann.ef_search,
        compaction_ratio: config.ann.compaction_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingModelConfig;
    use tempfile::TempDir;

    fn config_with_models(dir: &TempDir, ids: &[&str]) -> Config {
        let mut config = Config::default();
        config.embedding_models = ids
            .iter()
            .map(|id| EmbeddingModelConfig {
                id: id.to_string(),
                provider: "ollama".to_string(),
                timeout_secs: 5,
                options: toml::Table::new(),
            })
            .collect();
        config.init_paths(dir.path().to_path_buf(), dir.path().join("config.toml"));
        config
    }

    #[test]
    fn test_open_requires_files() {
        let dir = TempDir::new().unwrap();
        let config = config_with_models(&dir, &["m1", "m2"]);
        assert!(AnnIndexManager::open(&config).is_err());

        let created = AnnIndexManager::init_files(&config).unwrap();
        assert_eq!(created.len(), 2);
        assert!(AnnIndexManager::init_files(&config).unwrap().is_empty());

        let manager = AnnIndexManager::open(&config).unwrap();
        assert_eq!(manager.model_ids().collect::<Vec<_>>(), vec!["m1", "m2"]);
    }

    #[test]
    fn test_apply_batch() {
        let dir = TempDir::new().unwrap();
        let manager = AnnIndexManager::new([
            AnnGraph::new("m1", dir.path().join("m1.ann"), GraphSettings::default()),
            AnnGraph::new("m2", dir.path().join("m2.ann"), GraphSettings::default()),
        ]);

        let mut batch = AnnBatch::new();
        batch.insert("m1", "c1", vec![1.0, 0.0]);
        batch.insert("m2", "c1", vec![0.0, 1.0]);
        batch.insert("m1", "c2", vec![0.5, 0.5]);
        batch.insert("unknown", "c3", vec![1.0, 1.0]);
        manager.apply(batch);

        assert_eq!(manager.get("m1").unwrap().len(), 2);
        assert_eq!(manager.get("m2").unwrap().len(), 1);

        let mut batch = AnnBatch::new();
        batch.remove("c1");
        manager.apply(batch);

        assert!(!manager.get("m1").unwrap().contains("c1"));
        assert!(manager.get("m2").unwrap().is_empty());
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = TempDir::new().unwrap();
        let config = config_with_models(&dir, &["m1"]);
        AnnIndexManager::init_files(&config).unwrap();

        let manager = AnnIndexManager::open(&config).unwrap();
        let mut batch = AnnBatch::new();
        batch.insert("m1", "c1", vec![1.0, 0.0, 0.0]);
        manager.apply(batch);
        assert_eq!(manager.flush_all(), 0);

        let reopened = AnnIndexManager::open(&config).unwrap();
        assert!(reopened.get("m1").unwrap().contains("c1"));
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let manager = AnnIndexManager::new([AnnGraph::new(
            "m1",
            dir.path().join("m1.ann"),
            GraphSettings::default(),
        )]);

        let mut batch = AnnBatch::new();
        batch.insert("m1", "stale", vec![1.0, 0.0]);
        manager.apply(batch);

        let count = manager
            .rebuild(
                "m1",
                vec![
                    ("a".to_string(), vec![1.0, 0.0]),
                    ("b".to_string(), vec![0.0, 1.0]),
                ],
            )
            .unwrap();
        assert_eq!(count, 2);
        assert!(!manager.get("m1").unwrap().contains("stale"));
        assert!(manager.rebuild("missing", Vec::new()).is_err());
    }
}
