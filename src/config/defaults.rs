//! Default values for configuration

use crate::ann::Metric;
use crate::text::TextOptions;
use std::path::PathBuf;

/// Default SQLite database file, relative to the config directory
pub fn default_database() -> PathBuf {
    PathBuf::from("chunkvault.db")
}

/// Default directory holding one ANN save file per embedding model
pub fn default_index_dir() -> PathBuf {
    PathBuf::from("indexes")
}

/// Default SQLite busy timeout in seconds
pub fn default_busy_timeout_secs() -> u64 {
    10
}

/// Default text analysis: both script foldings and stop-word filtering on
pub fn default_text_options() -> TextOptions {
    TextOptions {
        jp2t: true,
        t2s: true,
        filter_stop_words: true,
    }
}

/// Default number of search results
pub fn default_search_limit() -> usize {
    10
}

/// Hard cap on search results
pub fn default_search_max_limit() -> usize {
    100
}

/// Default ANN distance metric
pub fn default_ann_metric() -> Metric {
    Metric::Cosine
}

/// Minimum ANN search breadth
pub fn default_ann_ef_search() -> usize {
    50
}

/// Tombstone share of a graph that triggers a rebuild
pub fn default_ann_compaction_ratio() -> f64 {
    0.3
}

/// Default provider request timeout in seconds
pub fn default_provider_timeout_secs() -> u64 {
    60
}

/// Name under which the lexical engine is addressed by search requests
pub const LEXICAL_MODEL_ID: &str = "bm25";
