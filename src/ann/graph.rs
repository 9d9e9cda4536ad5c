//! Single-model HNSW graph keyed by chunk id

use crate::error::{Error, Result};
use hnsw::{Hnsw, Searcher};
use serde::{Deserialize, Serialize};
use space::{Metric as SpaceMetric, Neighbor};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Save file layout version
const FILE_VERSION: u32 = 1;

/// Distance metric used by a graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// 1 - cosine similarity, in [0, 2]
    #[default]
    Cosine,
    /// L2 distance
    Euclidean,
}

impl Metric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let mag_b = b.iter().map(|y| y * y).sum::<f32>().sqrt();
                if mag_a == 0.0 || mag_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (mag_a * mag_b)
            }
            Metric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::Euclidean => write!(f, "euclidean"),
        }
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            _ => Err(Error::Config(format!("Unknown distance metric: {}", s))),
        }
    }
}

/// Adapter feeding `Metric` into the graph.
///
/// Distances are clamped at zero and carried as their IEEE-754 bit pattern,
/// which orders identically to the float for non-negative values and decodes
/// back losslessly.
#[derive(Debug, Clone, Copy)]
struct GraphMetric(Metric);

impl SpaceMetric<Box<[f32]>> for GraphMetric {
    type Unit = u32;

    fn distance(&self, a: &Box<[f32]>, b: &Box<[f32]>) -> u32 {
        self.0.distance(a, b).max(0.0).to_bits()
    }
}

type Index = Hnsw<GraphMetric, Box<[f32]>, rand::rngs::StdRng, 16, 32>;

/// Tuning knobs shared by every graph
#[derive(Debug, Clone, Copy)]
pub struct GraphSettings {
    pub metric: Metric,
    pub ef_search: usize,
    pub compaction_ratio: f64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            metric: Metric::Cosine,
            ef_search: 50,
            compaction_ratio: 0.3,
        }
    }
}

struct GraphState {
    index: Index,
    searcher: Searcher<u32>,
    /// Graph slot -> chunk id; `None` once tombstoned
    slots: Vec<Option<String>>,
    keys: HashMap<String, usize>,
    tombstones: HashSet<usize>,
    dimension: Option<usize>,
}

impl GraphState {
    fn new(metric: Metric, dimension: Option<usize>) -> Self {
        Self {
            index: Hnsw::new(GraphMetric(metric)),
            searcher: Searcher::default(),
            slots: Vec::new(),
            keys: HashMap::new(),
            tombstones: HashSet::new(),
            dimension,
        }
    }

    fn insert(&mut self, key: String, vector: Vec<f32>) {
        if let Some(old) = self.keys.remove(&key) {
            self.slots[old] = None;
            self.tombstones.insert(old);
        }

        let slot = self
            .index
            .insert(vector.into_boxed_slice(), &mut self.searcher);
        debug_assert_eq!(slot, self.slots.len());
        self.slots.push(Some(key.clone()));
        self.keys.insert(key, slot);
    }

    fn live_entries(&self) -> Vec<(String, Vec<f32>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, key)| {
                key.as_ref()
                    .map(|k| (k.clone(), self.index.feature(slot).to_vec()))
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct GraphFile {
    version: u32,
    metric: Metric,
    dimension: Option<usize>,
    entries: Vec<(String, Vec<f32>)>,
}

/// One embedding model's in-memory ANN graph.
///
/// All operations lock internally, so a graph can be shared across tasks.
/// Deletes tombstone their slot; the graph is rebuilt from live nodes once
/// tombstones pass `compaction_ratio`.
pub struct AnnGraph {
    model_id: String,
    path: PathBuf,
    settings: GraphSettings,
    state: Mutex<GraphState>,
}

impl AnnGraph {
    /// Create an empty graph that will save to `path`
    pub fn new(model_id: impl Into<String>, path: impl Into<PathBuf>, settings: GraphSettings) -> Self {
        Self {
            model_id: model_id.into(),
            path: path.into(),
            settings,
            state: Mutex::new(GraphState::new(settings.metric, None)),
        }
    }

    /// Load a graph from its save file. A missing or unreadable file is an error.
    pub fn load(model_id: impl Into<String>, path: impl Into<PathBuf>, settings: GraphSettings) -> Result<Self> {
        let model_id = model_id.into();
        let path = path.into();

        let bytes = std::fs::read(&path).map_err(|e| {
            Error::Index(format!(
                "cannot read ANN file for model '{}' at {}: {}",
                model_id,
                path.display(),
                e
            ))
        })?;

        let file: GraphFile = bincode::deserialize(&bytes)?;
        if file.version != FILE_VERSION {
            return Err(Error::Index(format!(
                "unsupported ANN file version {} in {}",
                file.version,
                path.display()
            )));
        }

        if file.metric != settings.metric {
            warn!(
                "ANN file {} was built with {} distance; rebuilding with {}",
                path.display(),
                file.metric,
                settings.metric
            );
        }

        let mut state = GraphState::new(settings.metric, file.dimension);
        for (key, vector) in file.entries {
            if Some(vector.len()) != file.dimension {
                return Err(Error::Index(format!(
                    "corrupt ANN file {}: vector for '{}' has {} dimensions",
                    path.display(),
                    key,
                    vector.len()
                )));
            }
            state.insert(key, vector);
        }

        info!(
            "Loaded ANN graph '{}' with {} nodes from {:?}",
            model_id,
            state.keys.len(),
            path
        );

        Ok(Self {
            model_id,
            path,
            settings,
            state: Mutex::new(state),
        })
    }

    /// Write an empty save file if none exists. Returns true when a file was created.
    pub fn init_file(path: &Path, metric: Metric) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }

        let file = GraphFile {
            version: FILE_VERSION,
            metric,
            dimension: None,
            entries: Vec::new(),
        };
        write_atomic(path, &bincode::serialize(&file)?)?;
        Ok(true)
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Vector dimension, fixed by the first insert
    pub fn dimension(&self) -> Option<usize> {
        self.lock().dimension
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tombstone_count(&self) -> usize {
        self.lock().tombstones.len()
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.lock().keys.contains_key(chunk_id)
    }

    /// Insert a node, replacing any existing node with the same id
    pub fn add(&self, chunk_id: &str, vector: Vec<f32>) -> Result<()> {
        let mut state = self.lock();

        match state.dimension {
            Some(dim) if dim != vector.len() => {
                return Err(Error::Validation(format!(
                    "model '{}' expects {}-dimensional vectors, got {}",
                    self.model_id,
                    dim,
                    vector.len()
                )));
            }
            Some(_) => {}
            None => state.dimension = Some(vector.len()),
        }

        state.insert(chunk_id.to_string(), vector);
        self.maybe_compact(&mut state);
        Ok(())
    }

    /// Remove a node. Absence is logged, never an error.
    pub fn delete(&self, chunk_id: &str) -> bool {
        let mut state = self.lock();

        let Some(slot) = state.keys.remove(chunk_id) else {
            warn!(
                "ANN graph '{}' has no node for chunk {}",
                self.model_id, chunk_id
            );
            return false;
        };

        state.slots[slot] = None;
        state.tombstones.insert(slot);
        self.maybe_compact(&mut state);
        true
    }

    /// Up to `k` nearest live nodes as `(chunk_id, distance)`, ascending by distance
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let mut state = self.lock();

        if k == 0 || state.keys.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(dim) = state.dimension {
            if dim != query.len() {
                return Err(Error::Validation(format!(
                    "query has {} dimensions, model '{}' expects {}",
                    query.len(),
                    self.model_id,
                    dim
                )));
            }
        }

        // Over-fetch so tombstoned hits can be dropped without starving the result
        let want = (k + state.tombstones.len()).min(state.slots.len());
        let ef = (want * 2).max(self.settings.ef_search);
        let mut neighbors = vec![
            Neighbor {
                index: !0,
                distance: !0
            };
            want
        ];

        let query_box: Box<[f32]> = query.to_vec().into_boxed_slice();
        let GraphState {
            index,
            searcher,
            slots,
            ..
        } = &mut *state;
        let found = index.nearest(&query_box, ef, searcher, &mut neighbors);

        let mut results: Vec<(String, f32)> = found
            .iter()
            .filter(|n| n.index != !0)
            .filter_map(|n| {
                slots
                    .get(n.index)
                    .and_then(|key| key.clone())
                    .map(|key| (key, f32::from_bits(n.distance)))
            })
            .collect();

        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        results.truncate(k);
        Ok(results)
    }

    /// Build a fresh graph from `rows` and swap it in as one step.
    ///
    /// The build runs without the lock, so searches keep seeing the old
    /// nodes until the swap. Rows whose dimension disagrees with the first
    /// row are skipped. Returns the new node count.
    pub fn replace(&self, rows: impl IntoIterator<Item = (String, Vec<f32>)>) -> usize {
        let mut fresh = GraphState::new(self.settings.metric, None);
        for (key, vector) in rows {
            match fresh.dimension {
                Some(dim) if dim != vector.len() => {
                    warn!(
                        "Skipping chunk {} while rebuilding '{}': {} dimensions, expected {}",
                        key,
                        self.model_id,
                        vector.len(),
                        dim
                    );
                    continue;
                }
                Some(_) => {}
                None => fresh.dimension = Some(vector.len()),
            }
            fresh.insert(key, vector);
        }

        let count = fresh.keys.len();
        *self.lock() = fresh;
        count
    }

    /// Persist the live nodes to the save file
    pub fn save(&self) -> Result<()> {
        let file = {
            let state = self.lock();
            GraphFile {
                version: FILE_VERSION,
                metric: self.settings.metric,
                dimension: state.dimension,
                entries: state.live_entries(),
            }
        };

        let bytes = bincode::serialize(&file)?;
        write_atomic(&self.path, &bytes)?;
        debug!(
            "Saved ANN graph '{}' ({} nodes) to {:?}",
            self.model_id,
            file.entries.len(),
            self.path
        );
        Ok(())
    }

    fn maybe_compact(&self, state: &mut GraphState) {
        let total = state.slots.len();
        if total == 0 || state.tombstones.is_empty() {
            return;
        }

        let ratio = state.tombstones.len() as f64 / total as f64;
        if ratio > self.settings.compaction_ratio {
            debug!(
                "Compacting ANN graph '{}': {} tombstones / {} slots",
                self.model_id,
                state.tombstones.len(),
                total
            );
            self.rebuild_locked(state);
        }
    }

    fn rebuild_locked(&self, state: &mut GraphState) {
        let entries = state.live_entries();
        let dimension = state.dimension;
        *state = GraphState::new(self.settings.metric, dimension);
        for (key, vector) in entries {
            state.insert(key, vector);
        }
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for AnnGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnGraph")
            .field("model_id", &self.model_id)
            .field("path", &self.path)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Write via a temp file in the target directory, then rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let write = || -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    };

    write().map_err(|e| Error::Index(format!("cannot write ANN file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn graph(dir: &TempDir) -> AnnGraph {
        AnnGraph::new("test", dir.path().join("test.ann"), GraphSettings::default())
    }

    #[test]
    fn test_cosine_distance() {
        let m = Metric::Cosine;
        assert!(m.distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((m.distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((m.distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(m.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_distance_bits_preserve_order() {
        let values = [0.0f32, 1e-8, 0.25, 0.5, 1.0, 1.5, 2.0];
        for pair in values.windows(2) {
            assert!(pair[0].to_bits() < pair[1].to_bits());
        }
    }

    #[test]
    fn test_search_orders_by_distance() {
        let dir = TempDir::new().unwrap();
        let g = graph(&dir);
        g.add("a", vec![1.0, 0.0, 0.0]).unwrap();
        g.add("b", vec![0.0, 1.0, 0.0]).unwrap();
        g.add("c", vec![1.0, 0.1, 0.0]).unwrap();

        let results = g.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "c");
        assert!(results[0].1 <= results[1].1);
    }

    #[test]
    fn test_search_empty_and_zero_k() {
        let dir = TempDir::new().unwrap();
        let g = graph(&dir);
        assert!(g.search(&[1.0, 0.0], 5).unwrap().is_empty());
        g.add("a", vec![1.0, 0.0]).unwrap();
        assert!(g.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_add_overwrites() {
        let dir = TempDir::new().unwrap();
        let g = graph(&dir);
        g.add("a", vec![1.0, 0.0]).unwrap();
        g.add("b", vec![0.0, 1.0]).unwrap();
        g.add("a", vec![0.0, 1.0]).unwrap();

        assert_eq!(g.len(), 2);
        let results = g.search(&[0.0, 1.0], 5).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, d)| *d < 1e-6));
    }

    #[test]
    fn test_delete_missing_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let g = graph(&dir);
        g.add("a", vec![1.0, 0.0]).unwrap();
        assert!(g.delete("a"));
        assert!(!g.delete("a"));
        assert!(!g.delete("never-added"));
        assert!(g.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_deleted_nodes_excluded_from_search() {
        let dir = TempDir::new().unwrap();
        let g = AnnGraph::new(
            "test",
            dir.path().join("test.ann"),
            GraphSettings {
                compaction_ratio: 1.0,
                ..GraphSettings::default()
            },
        );
        for i in 0..10 {
            g.add(&format!("n{}", i), vec![1.0, i as f32 * 0.1]).unwrap();
        }
        g.delete("n0");
        g.delete("n1");
        assert_eq!(g.tombstone_count(), 2);

        let results = g.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|(k, _)| k != "n0" && k != "n1"));
    }

    #[test]
    fn test_compaction_clears_tombstones() {
        let dir = TempDir::new().unwrap();
        let g = graph(&dir);
        for i in 0..10 {
            g.add(&format!("n{}", i), vec![i as f32, 1.0]).unwrap();
        }
        for i in 0..4 {
            g.delete(&format!("n{}", i));
        }
        // 4/10 exceeds 0.3, so the fourth delete rebuilt the graph
        assert_eq!(g.tombstone_count(), 0);
        assert_eq!(g.len(), 6);
        assert!(g.contains("n9"));
        assert!(!g.contains("n0"));
    }

    #[test]
    fn test_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let g = graph(&dir);
        g.add("a", vec![1.0, 0.0]).unwrap();
        assert!(g.add("b", vec![1.0, 0.0, 0.0]).is_err());
        assert!(g.search(&[1.0], 1).is_err());
        assert_eq!(g.dimension(), Some(2));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let g = graph(&dir);
        g.add("a", vec![1.0, 0.0]).unwrap();
        g.add("b", vec![0.0, 1.0]).unwrap();
        g.delete("b");
        g.save().unwrap();

        let loaded = AnnGraph::load("test", g.path(), GraphSettings::default()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains("a"));
        assert_eq!(loaded.dimension(), Some(2));
        assert_eq!(loaded.search(&[1.0, 0.0], 1).unwrap()[0].0, "a");
    }

    #[test]
    fn test_replace_swaps_in_fresh_graph() {
        let dir = TempDir::new().unwrap();
        let g = AnnGraph::new(
            "test",
            dir.path().join("test.ann"),
            GraphSettings {
                compaction_ratio: 1.0,
                ..GraphSettings::default()
            },
        );
        g.add("old", vec![1.0, 0.0]).unwrap();
        g.add("gone", vec![0.0, 1.0]).unwrap();
        g.delete("gone");
        assert_eq!(g.tombstone_count(), 1);

        let count = g.replace(vec![
            ("a".to_string(), vec![1.0, 0.0, 0.0]),
            ("short".to_string(), vec![1.0]),
            ("b".to_string(), vec![0.0, 1.0, 0.0]),
        ]);
        assert_eq!(count, 2);
        assert_eq!(g.len(), 2);
        assert_eq!(g.tombstone_count(), 0);
        assert_eq!(g.dimension(), Some(3));
        assert!(!g.contains("old"));
        assert!(!g.contains("short"));
        assert_eq!(g.search(&[0.0, 1.0, 0.0], 1).unwrap()[0].0, "b");

        assert_eq!(g.replace(Vec::new()), 0);
        assert_eq!(g.dimension(), None);
    }

    #[test]
    fn test_file_errors_are_index_errors() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let g = AnnGraph::new("test", blocker.join("test.ann"), GraphSettings::default());
        let err = g.save().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Index);

        let err = AnnGraph::init_file(&blocker.join("m.ann"), Metric::Cosine).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Index);
    }

    #[test]
    fn test_load_missing_or_corrupt_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.ann");
        assert!(AnnGraph::load("m", &path, GraphSettings::default()).is_err());

        std::fs::write(&path, b"not a graph").unwrap();
        assert!(AnnGraph::load("m", &path, GraphSettings::default()).is_err());
    }

    #[test]
    fn test_init_file_creates_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/m.ann");
        assert!(AnnGraph::init_file(&path, Metric::Cosine).unwrap());
        assert!(!AnnGraph::init_file(&path, Metric::Cosine).unwrap());

        let g = AnnGraph::load("m", &path, GraphSettings::default()).unwrap();
        assert!(g.is_empty());
        assert_eq!(g.dimension(), None);
    }
}
