//! MCP tool definitions and handlers

use super::types::{ToolDefinition, ToolResult};
use crate::engine::Engine;
use crate::error::ErrorKind;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::error;

/// Get all available tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "search_documents".to_string(),
            description: "Search indexed text chunks. Use model \"bm25\" for keyword search or an embedding model id from list_models for semantic search.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "model": {
                        "type": "string",
                        "description": "Search backend: \"bm25\" or an embedding model id",
                        "default": "bm25"
                    },
                    "query": {
                        "type": "string",
                        "description": "For embedding models a natural language sentence. For bm25, keywords separated by spaces are ANDed; join with OR for either."
                    },
                    "n": {
                        "type": "integer",
                        "description": "Maximum number of results (default from config)",
                        "minimum": 1
                    }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "list_models".to_string(),
            description: "List the search backends: \"bm25\" plus every configured embedding model.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: "get_document".to_string(),
            description: "Get a document by id, including all of its text chunks.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "document_id": {
                        "type": "string",
                        "description": "The id of the document to retrieve"
                    }
                },
                "required": ["document_id"]
            }),
        },
    ]
}

/// Handle a tool call
pub async fn handle_tool_call(
    name: &str,
    arguments: &HashMap<String, Value>,
    engine: &Engine,
) -> ToolResult {
    match name {
        "search_documents" => handle_search(arguments, engine).await,
        "list_models" => ToolResult::json(&json!({ "models": engine.list_models() })),
        "get_document" => handle_get_document(arguments, engine).await,
        _ => ToolResult::error(format!("Unknown tool: {}", name)),
    }
}

async fn handle_search(arguments: &HashMap<String, Value>, engine: &Engine) -> ToolResult {
    let query = match arguments.get("query") {
        Some(Value::String(q)) => q.clone(),
        _ => return ToolResult::error("Missing required parameter: query"),
    };

    let model = arguments
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or(crate::config::LEXICAL_MODEL_ID);

    // Accept numbers or numeric strings; anything else falls back to the default
    let limit = match arguments.get("n") {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };

    match engine.search(model, &query, limit.as_deref()).await {
        Ok(results) => ToolResult::json(&json!({ "results": results })),
        Err(e) => {
            if e.kind() != ErrorKind::NotFound && e.kind() != ErrorKind::BadRequest {
                error!("search_documents failed: {}", e);
            }
            ToolResult::error(format!("Search failed: {}", e))
        }
    }
}

async fn handle_get_document(arguments: &HashMap<String, Value>, engine: &Engine) -> ToolResult {
    let id = match arguments.get("document_id") {
        Some(Value::String(id)) => id.clone(),
        _ => return ToolResult::error("Missing required parameter: document_id"),
    };

    match engine.get_document(&id, true).await {
        Ok(view) => ToolResult::json(&json!({ "document": view })),
        Err(e) if e.is_not_found() => ToolResult::error(format!("Document not found: {}", id)),
        Err(e) => {
            error!("get_document failed: {}", e);
            ToolResult::error(format!("Failed to get document: {}", e))
        }
    }
}
