//! Gemini-backed text generation.
//! Requests go to the `generateContent` REST endpoint with the key in a header.

use super::Backend;
use crate::error::{Result, TranslationError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::trace;

/// Model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Backend that delegates to the Gemini API.
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    /// Create a backend reading the key from `GEMINI_API_KEY`, then `API_KEY`.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .map_err(|_| {
                TranslationError::MissingCredential(
                    "set GEMINI_API_KEY or API_KEY to use the Gemini backend".to_string(),
                )
            })?;
        Self::new(key)
    }

    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(TranslationError::MissingCredential(
                "empty Gemini API key".to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the backend at another host, e.g. a proxy or a test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String> {
        trace!("gemini generate model={} prompt_len={}", model, prompt.len());
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, model
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let value: Value = resp.json().await?;
        let parts = value["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| TranslationError::BackendUnavailable("missing content".to_string()))?;
        Ok(parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<String>())
    }
}
