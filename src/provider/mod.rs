//! Remote generation backends.
//!
//! A [`Provider`] turns `(prompt, document bytes, mime type, model)` into
//! Markdown text over one HTTP API family. Providers hold only connection
//! settings; no document content outlives a call.
//!
//! ```text
//! model name ──▶ RoutingTable::route ──▶ ProviderKind ──▶ ProviderSet::get ──▶ Arc<dyn Provider>
//! ```
//!
//! * [`gemini`]: multimodal `generateContent`, inline base64 attachments,
//!   bounded retry with exponential backoff
//! * [`openai`]: OpenAI-compatible chat completions (DeepSeek, Groq,
//!   OpenAI); text inlined into the prompt, images as data URIs
//! * [`routing`]: data-driven model → provider rules
//! * [`retry`]: the backoff policy shared by retrying providers

pub mod gemini;
pub mod openai;
pub mod retry;
pub mod routing;

pub use gemini::GeminiProvider;
pub use openai::{OpenAiCompatProvider, DEEPSEEK_BASE_URL, GROQ_BASE_URL, OPENAI_BASE_URL};
pub use retry::RetryPolicy;
pub use routing::{RoutingRule, RoutingTable};

use crate::config::ConverterConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Per-call generation settings. Passed by value; providers never mutate it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 65536,
            timeout_secs: 600,
        }
    }
}

/// Generate Markdown from a document with a named model.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &str;

    /// Run one generation request.
    ///
    /// Fails with [`ProviderError`] on transport errors, non-2xx answers,
    /// malformed bodies, or payloads this provider cannot transmit.
    async fn generate(
        &self,
        prompt: &str,
        file: &[u8],
        mime_type: &str,
        model: &str,
        config: GenerationConfig,
    ) -> Result<String, ProviderError>;
}

/// API families a model can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    DeepSeek,
    Groq,
    OpenAi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gemini,
        ProviderKind::DeepSeek,
        ProviderKind::Groq,
        ProviderKind::OpenAi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Groq => "groq",
            ProviderKind::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "groq" => Ok(ProviderKind::Groq),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// The configured providers, keyed by kind.
///
/// Shared across concurrent conversions behind `Arc`s.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every provider the credentials allow.
    ///
    /// Gemini is always present because the default proxy needs no key.
    /// The OpenAI-compatible backends are added only when their key is set.
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self::from_config_with_client(config, &reqwest::Client::new())
    }

    /// Like [`from_config`](Self::from_config), with every provider sharing
    /// `client`'s connection pool.
    pub fn from_config_with_client(config: &ConverterConfig, client: &reqwest::Client) -> Self {
        let creds = &config.credentials;
        let mut set = Self::new();

        set.insert(
            ProviderKind::Gemini,
            Arc::new(
                GeminiProvider::new(&creds.gemini_base_url)
                    .with_client(client.clone())
                    .with_proxy_token(creds.gemini_proxy_token.clone())
                    .with_api_key(creds.gemini_api_key.clone())
                    .with_retry(RetryPolicy::from_config(config)),
            ),
        );
        let compat = [
            (ProviderKind::DeepSeek, &creds.deepseek_api_key, DEEPSEEK_BASE_URL),
            (ProviderKind::Groq, &creds.groq_api_key, GROQ_BASE_URL),
            (ProviderKind::OpenAi, &creds.openai_api_key, OPENAI_BASE_URL),
        ];
        for (kind, key, base_url) in compat {
            if let Some(key) = key {
                let provider = OpenAiCompatProvider::new(kind.as_str(), base_url, key)
                    .with_client(client.clone());
                set.insert(kind, Arc::new(provider));
            }
        }
        set
    }

    /// Register or replace the provider for `kind`.
    pub fn insert(&mut self, kind: ProviderKind, provider: Arc<dyn Provider>) {
        self.providers.insert(kind, provider);
    }

    pub fn with(mut self, kind: ProviderKind, provider: Arc<dyn Provider>) -> Self {
        self.insert(kind, provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn Provider>> {
        self.providers.get(&kind).map(Arc::clone)
    }

    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Configured kinds in a stable order.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.providers.contains_key(k))
            .collect()
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Whether a mime type is sent as text rather than as an attachment.
pub fn is_text_mime(mime_type: &str) -> bool {
    mime_type.starts_with("text/")
        || matches!(
            mime_type,
            "application/json" | "application/xml" | "application/javascript"
        )
}

/// Shorten an error body so logs and messages stay readable.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX).collect();
        format!("{head}\u{2026}")
    }
}
