//! Shared helpers for unit tests

use crate::config::{Config, EmbeddingModelConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use wiremock::{Request, Respond, ResponseTemplate};

/// Deterministic stand-in for Ollama's `/api/embed`.
///
/// Each input gets a vector derived from a hash of its text, unless a fixed
/// vector was registered for it.
#[derive(Debug, Clone)]
pub struct FakeOllamaEmbeddings {
    dimension: usize,
    fixed: HashMap<String, Vec<f32>>,
    delay: Option<Duration>,
}

impl FakeOllamaEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fixed: HashMap::new(),
            delay: None,
        }
    }

    /// Hold every response for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.to_string(), vector);
        self
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.fixed.get(text) {
            return v.clone();
        }

        // FNV-1a, then a xorshift stream per dimension
        let mut state = text
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
            })
            | 1;
        (0..self.dimension)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state % 2000) as f32 / 1000.0 - 1.0
            })
            .collect()
    }
}

impl Respond for FakeOllamaEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match request.body_json() {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };

        let inputs: Vec<String> = match &body["input"] {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => return ResponseTemplate::new(400),
        };

        let embeddings: Vec<Vec<f32>> = inputs.iter().map(|t| self.vector_for(t)).collect();
        let response = ResponseTemplate::new(200).set_body_json(json!({
            "model": body["model"],
            "embeddings": embeddings,
        }));
        match self.delay {
            Some(delay) => response.set_delay(delay),
            None => response,
        }
    }
}

/// Config rooted at `dir` with one Ollama embedding model per id, all
/// pointing at `endpoint`
pub fn test_config(dir: &Path, endpoint: &str, model_ids: &[&str]) -> Config {
    let mut config = Config::default();
    config.embedding_models = model_ids
        .iter()
        .map(|id| {
            let mut options = toml::Table::new();
            options.insert(
                "endpoint".to_string(),
                toml::Value::String(endpoint.to_string()),
            );
            EmbeddingModelConfig {
                id: id.to_string(),
                provider: "ollama".to_string(),
                timeout_secs: 5,
                options,
            }
        })
        .collect();
    config.init_paths(dir.to_path_buf(), dir.join("config.toml"));
    config
}
