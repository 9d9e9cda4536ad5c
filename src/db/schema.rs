//! SQLite schema definition

/// SQL schema for the document store
pub const SCHEMA_SQL: &str = r#"
-- Documents: caller-identified, with free-form JSON metadata
CREATE TABLE IF NOT EXISTS document (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    data TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

-- Text chunks: raw content plus the derived lexical field
CREATE TABLE IF NOT EXISTS text_chunk (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES document(id),
    content TEXT NOT NULL,
    seg_content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Lexical index over seg_content, keyed by chunk id
CREATE VIRTUAL TABLE IF NOT EXISTS text_chunk_fts USING fts5(
    id UNINDEXED,
    seg_content
);

-- Embeddings: little-endian f32 blobs, one per (model, chunk)
CREATE TABLE IF NOT EXISTS text_embedding (
    model_id TEXT NOT NULL,
    text_chunk_id TEXT NOT NULL REFERENCES text_chunk(id),
    vector BLOB NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (model_id, text_chunk_id)
);

CREATE INDEX IF NOT EXISTS idx_text_chunk_document ON text_chunk(document_id);
CREATE INDEX IF NOT EXISTS idx_text_embedding_chunk ON text_embedding(text_chunk_id);
"#;
