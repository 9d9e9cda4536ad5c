//! Reindex command: rebuild ANN graphs from stored embeddings

use crate::engine::Engine;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Node counts per rebuilt graph
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexStats {
    pub graphs: BTreeMap<String, usize>,
}

/// Rebuild the named graphs, or every configured graph when `models` is None
pub async fn cmd_reindex(engine: &Engine, models: Option<Vec<String>>) -> Result<ReindexStats> {
    let models = match models {
        Some(ids) if !ids.is_empty() => ids,
        _ => engine.graphs().model_ids().map(str::to_string).collect(),
    };

    if models.is_empty() {
        return Err(Error::BadRequest(
            "no embedding models are configured".to_string(),
        ));
    }

    info!("Rebuilding {} ANN graph(s)", models.len());

    let mut stats = ReindexStats::default();
    for model in models {
        let count = engine.rebuild_index(&model).await?;
        stats.graphs.insert(model, count);
    }

    Ok(stats)
}

pub fn print_reindex_stats(stats: &ReindexStats) {
    println!("\n✓ Reindex complete");
    for (model, count) in &stats.graphs {
        println!("  {}: {} vectors", model, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::test_config;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reindex_without_models() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path(), "http://127.0.0.1:9", &[]);
        let engine = Engine::open(&config).await.unwrap();

        let err = cmd_reindex(&engine, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = cmd_reindex(&engine, Some(vec!["ghost".to_string()]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
