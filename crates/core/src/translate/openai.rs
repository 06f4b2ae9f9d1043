//! OpenAI-backed text generation through the chat completions API.

use super::Backend;
use crate::error::{Result, TranslationError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::trace;

/// Model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Backend that delegates to the OpenAI chat completion API.
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    /// Create a backend reading the API key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            TranslationError::MissingCredential(
                "set OPENAI_API_KEY to use the OpenAI backend".to_string(),
            )
        })?;
        Self::new(key)
    }

    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(TranslationError::MissingCredential(
                "empty OpenAI API key".to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send a JSON body to the chat completions endpoint and return the JSON response.
    async fn post_chat(&self, body: Value) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let resp = resp.error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        trace!("openai generate model={} prompt_len={}", model, prompt.len());
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let value = self.post_chat(body).await?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| TranslationError::BackendUnavailable("missing content".to_string()))?;
        Ok(content.to_string())
    }
}
