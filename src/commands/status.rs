//! Stats command implementation

use crate::config::Config;
use crate::engine::{Engine, EngineStats};
use crate::error::Result;
use serde::Serialize;
use tracing::info;

/// Store locations plus engine counters
#[derive(Debug, Clone, Serialize)]
pub struct StatsInfo {
    pub config_path: String,
    pub db_path: String,
    pub index_dir: String,
    pub models: Vec<String>,
    pub stats: EngineStats,
}

/// Collect store and graph statistics
pub async fn cmd_stats(config: &Config, engine: &Engine) -> Result<StatsInfo> {
    info!("Getting stats");

    let stats = engine.stats().await?;

    Ok(StatsInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        index_dir: config.paths.index_dir.display().to_string(),
        models: engine.list_models(),
        stats,
    })
}

/// Print stats to console
pub fn print_stats(info: &StatsInfo) {
    println!("\n📊 chunkvault Stats\n");
    println!("Configuration: {}", info.config_path);
    println!("Database: {}", info.db_path);
    println!("Index directory: {}", info.index_dir);

    let store = &info.stats.store;
    println!("\nDatabase Stats:");
    println!("  Documents: {}", store.document_count);
    println!("  Chunks: {}", store.chunk_count);
    println!("  Embeddings: {}", store.embedding_count);
    for (model, count) in &store.embeddings_by_model {
        let note = if info.stats.graphs.contains_key(model) {
            ""
        } else {
            " (not configured)"
        };
        println!("    {}: {}{}", model, count, note);
    }

    println!("\nANN Graphs:");
    if info.stats.graphs.is_empty() {
        println!("  none configured; searches use bm25 only");
    }
    for (model, graph) in &info.stats.graphs {
        let dimension = graph
            .dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {}: {} nodes, {} tombstones, dimension {}",
            model, graph.nodes, graph.tombstones, dimension
        );
    }
}
