//! Configuration types for document conversion.
//!
//! Every knob lives in [`ConverterConfig`], built through
//! [`ConverterConfigBuilder`]. The struct is passed explicitly into
//! converter and provider constructors; nothing reads process-wide settings
//! behind the caller's back except [`ProviderCredentials::from_env`], which
//! the caller invokes deliberately.

use crate::error::MdConvertError;
use crate::provider::{GenerationConfig, RoutingTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Models tried in order when no explicit chain is configured.
pub const DEFAULT_MODELS: &[&str] = &[
    "gemini-2.0-flash-exp",
    "deepseek-coder",
    "deepseek-chat",
    "llama-3.3-70b-versatile",
    "gemini-1.5-flash",
];

/// Default address of the Gemini-compatible proxy.
pub const DEFAULT_GEMINI_PROXY: &str = "http://127.0.0.1:8045";

/// Endpoints and secrets for the remote backends.
///
/// A missing key means the matching provider is unconfigured; models routed
/// to it are skipped by the fallback chain.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    /// Base URL of the Gemini-compatible endpoint (proxy or Google API).
    pub gemini_base_url: String,
    /// Bearer token for the proxy. Takes precedence over `gemini_api_key`.
    pub gemini_proxy_token: Option<String>,
    /// Query-string key for direct Google API access.
    pub gemini_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub llama_cloud_api_key: Option<String>,
}

impl Default for ProviderCredentials {
    fn default() -> Self {
        Self {
            gemini_base_url: DEFAULT_GEMINI_PROXY.to_string(),
            gemini_proxy_token: None,
            gemini_api_key: None,
            deepseek_api_key: None,
            groq_api_key: None,
            openai_api_key: None,
            llama_cloud_api_key: None,
        }
    }
}

impl ProviderCredentials {
    /// Read credentials from `MDCONVERT_*` process environment variables.
    ///
    /// Empty values are treated as absent.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            gemini_base_url: var("MDCONVERT_ANTIGRAVITY_PROXY")
                .unwrap_or_else(|| DEFAULT_GEMINI_PROXY.to_string()),
            gemini_proxy_token: var("MDCONVERT_ANTIGRAVITY_ACCESS_TOKEN"),
            gemini_api_key: var("MDCONVERT_GEMINI_API_KEY"),
            deepseek_api_key: var("MDCONVERT_DEEPSEEK_API_KEY"),
            groq_api_key: var("MDCONVERT_GROQ_API_KEY"),
            openai_api_key: var("MDCONVERT_OPENAI_API_KEY"),
            llama_cloud_api_key: var("MDCONVERT_LLAMA_CLOUD_API_KEY"),
        }
    }
}

fn mask(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "<set>"
    } else {
        "<unset>"
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("gemini_base_url", &self.gemini_base_url)
            .field("gemini_proxy_token", &mask(&self.gemini_proxy_token))
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("deepseek_api_key", &mask(&self.deepseek_api_key))
            .field("groq_api_key", &mask(&self.groq_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("llama_cloud_api_key", &mask(&self.llama_cloud_api_key))
            .finish()
    }
}

/// Configuration shared by every converter and provider.
///
/// Built via [`ConverterConfig::builder()`] or [`ConverterConfig::default()`].
///
/// # Example
/// ```rust
/// use mdconvert::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .concurrency(8)
///     .models(["gemini-1.5-flash", "deepseek-chat"])
///     .min_content_length(50)
///     .build()
///     .unwrap();
/// assert_eq!(config.models.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct ConverterConfig {
    /// Where `.md` files are written. `None` writes next to each source.
    pub output_dir: Option<PathBuf>,

    /// Ordered fallback chain of model names.
    pub models: Vec<String>,

    /// Model-name → provider routing rules.
    pub routing: RoutingTable,

    pub credentials: ProviderCredentials,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum generated tokens per call. Default: 65536.
    pub max_output_tokens: u32,

    /// Per provider call timeout in seconds. Default: 600.
    pub timeout_secs: u64,

    /// Generated text must be strictly longer than this many characters to
    /// count as a success. Default: 100.
    pub min_content_length: usize,

    /// Maximum files converted at once. Default: 4.
    pub concurrency: usize,

    /// Wall-clock limit for the local conversion tool. Default: 300.
    pub local_tool_timeout_secs: u64,

    /// Polling budget for the parsing service. Default: 300.
    pub parser_timeout_secs: u64,

    /// Attempts per call for providers that retry. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds. Default: 4000.
    ///
    /// Doubles after each attempt up to `retry_max_backoff_ms`.
    pub retry_backoff_ms: u64,

    /// Upper bound on a single retry delay. Default: 10000.
    pub retry_max_backoff_ms: u64,

    /// Prepend YAML frontmatter to produced Markdown. Default: true.
    pub enable_frontmatter: bool,

    /// Custom conversion prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            routing: RoutingTable::default(),
            credentials: ProviderCredentials::default(),
            temperature: 0.1,
            max_output_tokens: 65536,
            timeout_secs: 600,
            min_content_length: 100,
            concurrency: 4,
            local_tool_timeout_secs: 300,
            parser_timeout_secs: 300,
            max_retries: 3,
            retry_backoff_ms: 4000,
            retry_max_backoff_ms: 10_000,
            enable_frontmatter: true,
            system_prompt: None,
        }
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    /// Per-call generation settings, copied by value into every provider call.
    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn routing(mut self, routing: RoutingTable) -> Self {
        self.config.routing = routing;
        self
    }

    pub fn credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n.clamp(1000, 100_000);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.clamp(30, 3600);
        self
    }

    pub fn min_content_length(mut self, n: usize) -> Self {
        self.config.min_content_length = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn local_tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.local_tool_timeout_secs = secs;
        self
    }

    pub fn parser_timeout_secs(mut self, secs: u64) -> Self {
        self.config.parser_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn retry_max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_max_backoff_ms = ms;
        self
    }

    pub fn enable_frontmatter(mut self, v: bool) -> Self {
        self.config.enable_frontmatter = v;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, MdConvertError> {
        let c = &self.config;
        if c.models.iter().any(|m| m.trim().is_empty()) {
            return Err(MdConvertError::InvalidConfig(
                "Model names must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(MdConvertError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_retries == 0 {
            return Err(MdConvertError::InvalidConfig(
                "max_retries counts attempts and must be ≥ 1".into(),
            ));
        }
        if c.retry_max_backoff_ms < c.retry_backoff_ms {
            return Err(MdConvertError::InvalidConfig(format!(
                "retry_max_backoff_ms ({}) is below retry_backoff_ms ({})",
                c.retry_max_backoff_ms, c.retry_backoff_ms
            )));
        }
        Ok(self.config)
    }
}
