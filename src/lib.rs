//! chunkvault - a document chunk store with hybrid search
//!
//! This crate provides:
//! - A SQLite store for documents, text chunks and per-model embeddings
//! - CJK-aware tokenization and normalization feeding an FTS5 lexical index
//! - One in-memory HNSW graph per embedding model, saved to disk on shutdown
//! - A CLI and an MCP server over stdio

pub mod ann;
pub mod codec;
pub mod commands;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod mcp;
pub mod models;
pub mod search;
pub mod text;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
