//! OpenAI-compatible chat-completions provider (DeepSeek, Groq, OpenAI).
//!
//! These APIs have no generic file attachment. Text documents are decoded
//! and inlined after the prompt; images go as a data-URI `image_url` part.
//! Anything else (PDF, Office files) is rejected with
//! [`ProviderError::UnsupportedPayload`] so the fallback chain moves on
//! instead of sending a truncated or garbled document.

use super::{is_text_mime, truncate_body, GenerationConfig, Provider};
use crate::error::ProviderError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider for any endpoint speaking the `/chat/completions` protocol.
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Reuse an existing connection pool.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self::new("deepseek", DEEPSEEK_BASE_URL, api_key)
    }

    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::new("groq", GROQ_BASE_URL, api_key)
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key)
    }

    /// Build the single user message for this payload.
    fn user_content(
        &self,
        prompt: &str,
        file: &[u8],
        mime_type: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        if is_text_mime(mime_type) {
            let text = std::str::from_utf8(file).map_err(|e| ProviderError::Decode {
                provider: self.name.clone(),
                detail: e.to_string(),
            })?;
            return Ok(json!(format!("{prompt}\n\nDOCUMENT CONTENT:\n{text}")));
        }

        if mime_type.starts_with("image/") {
            let url = format!("data:{};base64,{}", mime_type, STANDARD.encode(file));
            return Ok(json!([
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": url } }
            ]));
        }

        Err(ProviderError::UnsupportedPayload {
            provider: self.name.clone(),
            mime_type: mime_type.to_string(),
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        file: &[u8],
        mime_type: &str,
        model: &str,
        config: GenerationConfig,
    ) -> Result<String, ProviderError> {
        let content = self.user_content(prompt, file, mime_type)?;
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
            "temperature": config.temperature,
            "max_tokens": config.max_output_tokens,
            "stream": false
        });
        debug!("{}: {} bytes of {} → {}", self.name, file.len(), mime_type, model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(config.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, config.timeout_secs, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: self.name.clone(),
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, config.timeout_secs, e))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: self.name.clone(),
                detail: "response has no message content".into(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_is_inlined() {
        let p = OpenAiCompatProvider::deepseek("k");
        let content = p
            .user_content("Convert", b"<h1>Hi</h1>", "text/html")
            .unwrap();
        let s = content.as_str().unwrap();
        assert!(s.starts_with("Convert"));
        assert!(s.contains("DOCUMENT CONTENT:\n<h1>Hi</h1>"));
    }

    #[test]
    fn image_payload_is_a_data_uri() {
        let p = OpenAiCompatProvider::openai("k");
        let content = p.user_content("Convert", &[0x89, b'P'], "image/png").unwrap();
        let url = content[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn binary_documents_are_rejected() {
        let p = OpenAiCompatProvider::groq("k");
        let err = p
            .user_content("Convert", b"%PDF-1.4", "application/pdf")
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedPayload { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn invalid_utf8_text_fails_instead_of_truncating() {
        let p = OpenAiCompatProvider::groq("k");
        let err = p
            .user_content("Convert", &[0xff, 0xfe, 0x00], "text/plain")
            .unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[test]
    fn debug_hides_api_key() {
        let p = OpenAiCompatProvider::deepseek("sk-secret");
        assert!(!format!("{p:?}").contains("sk-secret"));
    }
}
