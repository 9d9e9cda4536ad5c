use crate::error::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// JSON-over-HTTP client shared by the provider implementations
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
    retries: usize,
}

impl ProviderClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        // Relative joins would otherwise replace the last path segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            bearer_token: None,
            retries: 2,
        })
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid provider URL: {}", e)))
    }

    /// POST a JSON body and decode the JSON reply.
    ///
    /// Transport failures, 5xx and 429 are retried with a short linear
    /// backoff; any other error status fails at once.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let mut request = self.client.post(url.clone()).json(body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request
                .try_clone()
                .ok_or_else(|| Error::Provider("Failed to clone provider request".to_string()))?;

            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => {
                        return ok.json::<T>().await.map_err(|e| {
                            Error::Provider(format!("Invalid response from {}: {}", url, e))
                        })
                    }
                    Err(e) => {
                        let err = Error::Provider(e.to_string());
                        if !e.status().map_or(true, is_transient) {
                            return Err(err);
                        }
                        last_err = Some(err);
                    }
                },
                Err(e) => last_err = Some(Error::Provider(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Provider(format!("Provider request to {} failed", url))))
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
