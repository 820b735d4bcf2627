//! Gemini `generateContent` provider (direct API or Antigravity proxy).
//!
//! The document travels as a base64 `inline_data` part next to the prompt,
//! so PDFs, Office files and images all go through unchanged. Transient
//! failures (connection errors, timeouts, 429, 5xx) are retried under a
//! [`RetryPolicy`]; client errors fail on the first attempt.

use super::{truncate_body, GenerationConfig, Provider, RetryPolicy};
use crate::error::ProviderError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const NAME: &str = "gemini";

/// Provider for the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    base_url: String,
    proxy_token: Option<String>,
    api_key: Option<String>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            proxy_token: None,
            api_key: None,
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    /// Bearer token for an authenticating proxy. Wins over the API key.
    pub fn with_proxy_token(mut self, token: Option<String>) -> Self {
        self.proxy_token = token;
        self
    }

    /// Query-string key for direct Google API access.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    /// Reuse an existing connection pool.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    async fn send_once(
        &self,
        body: &serde_json::Value,
        model: &str,
        config: GenerationConfig,
    ) -> Result<String, ProviderError> {
        let mut request = self
            .client
            .post(self.endpoint(model))
            .timeout(Duration::from_secs(config.timeout_secs))
            .json(body);

        if let Some(token) = &self.proxy_token {
            request = request.bearer_auth(token);
        } else if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, config.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: NAME.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, config.timeout_secs, e))?;
        parsed.into_text()
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn generate(
        &self,
        prompt: &str,
        file: &[u8],
        mime_type: &str,
        model: &str,
        config: GenerationConfig,
    ) -> Result<String, ProviderError> {
        let body = build_request(prompt, file, mime_type, config);
        debug!(
            "{}: {} bytes of {} → {}",
            NAME,
            file.len(),
            mime_type,
            model
        );
        let label = format!("{NAME}/{model}");
        self.retry
            .run(&label, || self.send_once(&body, model, config))
            .await
    }
}

fn build_request(
    prompt: &str,
    file: &[u8],
    mime_type: &str,
    config: GenerationConfig,
) -> serde_json::Value {
    json!({
        "contents": [{
            "parts": [
                { "text": prompt },
                { "inline_data": { "mime_type": mime_type, "data": STANDARD.encode(file) } }
            ]
        }],
        "generationConfig": {
            "temperature": config.temperature,
            "maxOutputTokens": config.max_output_tokens
        }
    })
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> Result<String, ProviderError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: NAME.to_string(),
                detail: "response has no candidates".into(),
            })?;
        Ok(candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default())
    }
}
