//! Document and chunk commands

use crate::db::TextChunk;
use crate::engine::{DocumentView, Engine, NewDocument};
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

/// Options for `add`
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub id: String,
    pub title: String,
    pub description: String,
    /// JSON object as text
    pub metadata: Option<String>,
    /// Inline chunk texts, indexed in order before `files`
    pub texts: Vec<String>,
    /// Files whose contents each become one chunk
    pub files: Vec<PathBuf>,
    pub overwrite: bool,
    pub summarize: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddResult {
    pub document_id: String,
    pub chunks: usize,
}

/// Create a document from inline texts and files
pub async fn cmd_add(engine: &Engine, options: AddOptions) -> Result<AddResult> {
    let metadata = match options.metadata.as_deref() {
        Some(raw) => parse_metadata(raw)?,
        None => Value::Object(Default::default()),
    };

    let mut texts = options.texts;
    for path in &options.files {
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            info!("Skipping empty file {:?}", path);
            continue;
        }
        texts.push(content);
    }

    let chunks = engine
        .create_document(NewDocument {
            id: options.id.clone(),
            title: options.title,
            description: options.description,
            metadata,
            texts,
            overwrite: options.overwrite,
            summarize: options.summarize,
        })
        .await?;

    Ok(AddResult {
        document_id: options.id,
        chunks,
    })
}

fn parse_metadata(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| Error::BadRequest(format!("metadata is not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(Error::BadRequest(
            "metadata must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

pub async fn cmd_get(engine: &Engine, id: &str, with_chunks: bool) -> Result<DocumentView> {
    engine.get_document(id, with_chunks).await
}

pub async fn cmd_delete(engine: &Engine, id: &str) -> Result<usize> {
    engine.delete_document(id).await
}

pub async fn cmd_add_chunk(engine: &Engine, document_id: &str, text: &str) -> Result<TextChunk> {
    engine.add_chunk(document_id, text).await
}

pub async fn cmd_delete_chunk(engine: &Engine, id: &str) -> Result<()> {
    engine.delete_chunk(id).await
}

/// Print a document to console
pub fn print_document(view: &DocumentView) {
    let doc = &view.document;
    println!("\n📄 {}", doc.id);
    if !doc.title.is_empty() {
        println!("Title: {}", doc.title);
    }
    if !doc.description.is_empty() {
        println!("Description: {}", doc.description);
    }
    println!("Metadata: {}", doc.metadata.0);
    println!("Created: {}", doc.created_at);

    if let Some(chunks) = &view.chunks {
        println!("\nChunks ({}):", chunks.len());
        for chunk in chunks {
            println!("• {}", chunk.id);
            println!("  {}", preview(&chunk.content, 200));
        }
    }
}

pub fn print_chunk(chunk: &TextChunk) {
    println!("Chunk: {}", chunk.id);
    println!("Document: {}", chunk.document_id);
    println!("Created: {}", chunk.created_at);
    println!("\n{}", chunk.content);
}

/// First `max` characters on one line
pub(crate) fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
