//! Model fallback chain over the configured providers.
//!
//! ```text
//! for model in config.models:
//!     kind     = routing.route(model)
//!     provider = providers.get(kind)   ── missing → skip, not an attempt
//!     text     = provider.generate(..) ── Err      → remember, next model
//!     text     = clean_markdown(text)
//!     len(text) > min_content_length   ── no       → remember, next model
//!     → frontmatter, score, write, Success("llm/<model>")
//! all exhausted → Failed(last error)
//! ```

use super::{extension_of, failed, finish, mime_type_for, preflight, Converter, ConverterContext};
use crate::config::ConverterConfig;
use crate::error::ConversionError;
use crate::output::ConversionResult;
use crate::postprocess::clean_markdown;
use crate::prompts::conversion_prompt;
use crate::provider::ProviderSet;
use crate::quality::QualityProfile;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const NAME: &str = "llm";

const EXTENSIONS: &[&str] = &[".pdf", ".docx", ".pptx", ".xlsx", ".png", ".jpg", ".jpeg"];

#[derive(Debug, Clone)]
pub struct LlmConverter {
    config: Arc<ConverterConfig>,
    providers: ProviderSet,
}

impl LlmConverter {
    pub fn new(ctx: &ConverterContext) -> Self {
        Self {
            config: Arc::clone(&ctx.config),
            providers: ctx.providers.clone(),
        }
    }

    /// The configured model chain.
    pub fn models(&self) -> &[String] {
        &self.config.models
    }

    async fn run_chain(&self, source: &Path, started: Instant) -> ConversionResult {
        let bytes = match tokio::fs::read(source).await {
            Ok(b) => b,
            Err(e) => {
                let err = ConversionError::Io {
                    detail: format!("reading {}: {}", source.display(), e),
                };
                return failed(self, source, err, started);
            }
        };
        let mime_type = mime_type_for(&extension_of(source));
        let prompt = conversion_prompt(&self.config);
        let generation = self.config.generation();

        let mut attempts = 0u32;
        let mut last_error: Option<String> = None;

        for model in &self.config.models {
            let kind = self.config.routing.route(model);
            let Some(provider) = self.providers.get(kind) else {
                debug!("{}: no {} provider configured, skipping", model, kind);
                continue;
            };
            attempts += 1;
            debug!(
                "{}: trying {} via {} ({} bytes)",
                source.display(),
                model,
                provider.name(),
                bytes.len()
            );

            let text = match provider
                .generate(prompt, &bytes, mime_type, model, generation)
                .await
            {
                Ok(text) => clean_markdown(&text),
                Err(e) => {
                    warn!("{}: {} failed: {}", source.display(), model, e);
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            let len = text.chars().count();
            if len <= self.config.min_content_length {
                warn!(
                    "{}: {} returned {} chars (minimum {}), trying next model",
                    source.display(),
                    model,
                    len,
                    self.config.min_content_length
                );
                last_error = Some(format!(
                    "{model}: output too short ({len} chars, need more than {})",
                    self.config.min_content_length
                ));
                continue;
            }

            let tool = format!("{NAME}/{model}");
            info!("{}: converted with {}", source.display(), tool);
            let result = finish(
                self,
                source,
                &tool,
                text,
                self.config.enable_frontmatter,
                started,
            )
            .await;
            return result
                .with_metadata("model", model.as_str())
                .with_metadata("provider", kind.as_str())
                .with_metadata("attempts", attempts.to_string());
        }

        let err = match last_error {
            Some(detail) => ConversionError::Provider { detail },
            None => ConversionError::BackendUnavailable {
                backend: NAME.into(),
                hint: format!(
                    "no provider is configured for any of: {}",
                    self.config.models.join(", ")
                ),
            },
        };
        failed(self, source, err, started).with_metadata("attempts", attempts.to_string())
    }
}

#[async_trait]
impl Converter for LlmConverter {
    fn name(&self) -> &str {
        NAME
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn quality_profile(&self) -> QualityProfile {
        QualityProfile::LlmText
    }

    fn output_dir(&self) -> Option<&Path> {
        self.config.output_dir.as_deref()
    }

    async fn convert(&self, source: &Path) -> ConversionResult {
        let started = Instant::now();
        if let Some(early) = preflight(self, source, started).await {
            return early;
        }
        self.run_chain(source, started).await
    }
}
