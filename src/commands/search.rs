//! Search and model listing commands

use super::documents::preview;
use crate::engine::Engine;
use crate::error::Result;
use crate::search::SearchHit;
use serde::Serialize;
use tracing::info;

/// Search result for CLI display
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    pub model: String,
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// Execute a search
pub async fn cmd_search(
    engine: &Engine,
    model: &str,
    query: &str,
    limit: Option<&str>,
) -> Result<SearchOutput> {
    info!("Searching '{}' with {}", query, model);

    let results = engine.search(model, query, limit).await?;

    Ok(SearchOutput {
        model: model.to_string(),
        query: query.to_string(),
        results,
    })
}

/// Print search results to console
pub fn print_search_results(output: &SearchOutput) {
    if output.results.is_empty() {
        println!("No results found for: {}", output.query);
        return;
    }

    println!(
        "\n🔍 {} result(s) for \"{}\" ({})\n",
        output.results.len(),
        output.query,
        output.model
    );

    for (i, hit) in output.results.iter().enumerate() {
        let title = if hit.title.is_empty() {
            hit.document_id.as_str()
        } else {
            hit.title.as_str()
        };
        println!("{}. {} [score: {:.4}]", i + 1, title, hit.score);
        println!("   Document: {}  Chunk: {}", hit.document_id, hit.chunk_id);
        println!("   {}", preview(&hit.content, 300));
        println!();
    }
}

pub fn print_models(models: &[String]) {
    for model in models {
        println!("{}", model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NewDocument;
    use crate::test_utils::test_config;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cmd_search() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path(), "http://127.0.0.1:9", &[]);
        let engine = Engine::open(&config).await.unwrap();
        engine
            .create_document(NewDocument {
                id: "doc".to_string(),
                texts: vec!["searchable words".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();

        let output = cmd_search(&engine, "bm25", "searchable", Some("abc"))
            .await
            .unwrap();
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.model, "bm25");

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["results"][0]["document_id"], "doc");
    }
}
