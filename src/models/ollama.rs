//! Ollama embedding and chat providers

use super::client::ProviderClient;
use super::{ChatMessage, Embedder, Generator, DEFAULT_SYSTEM_PROMPT};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

/// `[embedding_models.options]` for `provider = "ollama"`
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaEmbedOptions {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Ollama model name; defaults to the configured model id
    #[serde(default)]
    pub model: Option<String>,

    /// Requested output dimension for models that support truncation
    #[serde(default)]
    pub dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct OllamaEmbedder {
    client: ProviderClient,
    model: String,
    dimensions: Option<usize>,
}

impl OllamaEmbedder {
    pub fn new(model_id: &str, options: OllamaEmbedOptions, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: ProviderClient::new(&options.endpoint, timeout)?,
            model: options.model.unwrap_or_else(|| model_id.to_string()),
            dimensions: options.dimensions.filter(|d| *d > 0),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: &self.model,
            input: &texts,
            dimensions: self.dimensions,
        };
        let response: EmbedResponse = self.client.post_json("api/embed", &request).await?;
        Ok(response.embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// `[generation_model.options]` for `provider = "ollama"`
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatOptions {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    pub model: String,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
}

pub struct OllamaGenerator {
    client: ProviderClient,
    model: String,
    system_prompt: String,
}

impl OllamaGenerator {
    pub fn new(options: OllamaChatOptions, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: ProviderClient::new(&options.endpoint, timeout)?,
            model: options.model,
            system_prompt: options
                .system_prompt
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, texts: &[String]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: super::prompt_messages(&self.system_prompt, texts),
            stream: false,
        };
        let response: ChatResponse = self.client.post_json("api/chat", &request).await?;
        response
            .message
            .map(|m| m.content)
            .ok_or_else(|| Error::Provider("no response from summarization model".to_string()))
    }
}
