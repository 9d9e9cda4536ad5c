//! OpenAI-compatible chat completions provider

use super::client::ProviderClient;
use super::{ChatMessage, Generator, DEFAULT_SYSTEM_PROMPT};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

/// `[generation_model.options]` for `provider = "openai"`
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiOptions {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    pub model: String,

    /// API key given inline
    #[serde(default)]
    pub token: Option<String>,

    /// Environment variable holding the API key, used when `token` is unset
    #[serde(default)]
    pub token_env: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl OpenAiOptions {
    fn resolve_token(&self) -> Option<String> {
        self.token.clone().or_else(|| {
            self.token_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok())
        })
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

pub struct OpenAiGenerator {
    client: ProviderClient,
    model: String,
    system_prompt: String,
}

impl OpenAiGenerator {
    pub fn new(options: OpenAiOptions, timeout: Duration) -> Result<Self> {
        let client =
            ProviderClient::new(&options.endpoint, timeout)?.with_bearer_token(options.resolve_token());

        Ok(Self {
            client,
            system_prompt: options
                .system_prompt
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model: options.model,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, texts: &[String]) -> Result<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: super::prompt_messages(&self.system_prompt, texts),
        };
        let response: CompletionResponse =
            self.client.post_json("chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Provider("completion returned no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(endpoint: String) -> OpenAiOptions {
        OpenAiOptions {
            endpoint,
            model: "gpt-test".to_string(),
            token: Some("sk-test".to_string()),
            token_env: None,
            system_prompt: Some("Summarize.".to_string()),
        }
    }

    #[tokio::test]
    async fn test_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "messages": [{"role": "system", "content": "Summarize."}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "short"}}]
            })))
            .mount(&server)
            .await;

        let generator =
            OpenAiGenerator::new(options(format!("{}/v1", server.uri())), Duration::from_secs(5))
                .unwrap();
        let out = generator.generate(&["long text".to_string()]).await.unwrap();
        assert_eq!(out, "short");
    }

    #[tokio::test]
    async fn test_no_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let generator = OpenAiGenerator::new(options(server.uri()), Duration::from_secs(5)).unwrap();
        assert!(generator.generate(&["x".to_string()]).await.is_err());
    }
}
