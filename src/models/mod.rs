//! Embedding and generation providers
//!
//! Each capability is a small async trait with one implementation per
//! provider family. The provider is chosen when the config is loaded, by the
//! `provider` tag, and wrapped in a closed enum so dispatch stays static.

mod client;
mod ollama;
mod openai;

pub use client::ProviderClient;
pub use ollama::{OllamaChatOptions, OllamaEmbedOptions, OllamaEmbedder, OllamaGenerator};
pub use openai::{OpenAiGenerator, OpenAiOptions};

use crate::config::{EmbeddingModelConfig, GenerationModelConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// System prompt used for summaries when the config gives none
pub const DEFAULT_SYSTEM_PROMPT: &str = "You're a helpful assistant to summarize the extracted text from web page for search engine in webpage's language.";

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in input order
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the provider-side model name
    fn model_name(&self) -> &str;
}

/// Trait for text generation providers
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a single text from the given inputs
    async fn generate(&self, texts: &[String]) -> Result<String>;
}

/// Provider families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "openai-compatible" => Ok(Self::OpenAi),
            _ => Err(Error::Config(format!("Unknown model provider '{}'", value))),
        }
    }
}

/// A configured embedding model
pub enum EmbeddingModel {
    Ollama(OllamaEmbedder),
}

impl EmbeddingModel {
    pub fn from_config(config: &EmbeddingModelConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        match config.provider.parse::<ProviderKind>()? {
            ProviderKind::Ollama => {
                let options: OllamaEmbedOptions = parse_options(&config.id, &config.options)?;
                Ok(Self::Ollama(OllamaEmbedder::new(&config.id, options, timeout)?))
            }
            other => Err(Error::Config(format!(
                "Provider '{}' does not offer embeddings (model '{}')",
                other, config.id
            ))),
        }
    }

    /// Embed exactly one text, failing if the provider returns any other count
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(vec![text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(Error::Validation(format!(
                "embedding model '{}' returned {} vectors for 1 input",
                self.model_name(),
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}

#[async_trait]
impl Embedder for EmbeddingModel {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Ollama(m) => m.embed(texts).await,
        }
    }

    fn model_name(&self) -> &str {
        match self {
            Self::Ollama(m) => m.model_name(),
        }
    }
}

/// Configured embedding models by id
pub type EmbeddingModels = BTreeMap<String, EmbeddingModel>;

/// Build every configured embedding model
pub fn build_embedding_models(configs: &[EmbeddingModelConfig]) -> Result<EmbeddingModels> {
    configs
        .iter()
        .map(|c| Ok((c.id.clone(), EmbeddingModel::from_config(c)?)))
        .collect()
}

/// The configured summarization model
pub enum GenerationModel {
    Ollama(OllamaGenerator),
    OpenAi(OpenAiGenerator),
}

impl GenerationModel {
    pub fn from_config(config: &GenerationModelConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        match config.provider.parse::<ProviderKind>()? {
            ProviderKind::Ollama => Ok(Self::Ollama(OllamaGenerator::new(
                parse_options("generation_model", &config.options)?,
                timeout,
            )?)),
            ProviderKind::OpenAi => Ok(Self::OpenAi(OpenAiGenerator::new(
                parse_options("generation_model", &config.options)?,
                timeout,
            )?)),
        }
    }
}

#[async_trait]
impl Generator for GenerationModel {
    async fn generate(&self, texts: &[String]) -> Result<String> {
        match self {
            Self::Ollama(m) => m.generate(texts).await,
            Self::OpenAi(m) => m.generate(texts).await,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// System prompt followed by the inputs joined with blank lines
fn prompt_messages(system_prompt: &str, texts: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: texts.join("\n\n"),
        },
    ]
}

fn parse_options<T: DeserializeOwned>(owner: &str, options: &toml::Table) -> Result<T> {
    toml::Value::Table(options.clone())
        .try_into()
        .map_err(|e| Error::Config(format!("Invalid options for '{}': {}", owner, e)))
}
