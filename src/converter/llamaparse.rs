//! Hosted parsing through the LlamaParse job API.
//!
//! Upload → poll → fetch:
//!
//! ```text
//! POST {base}/upload                     multipart file, result_type=markdown → { id }
//! GET  {base}/job/{id}                   { status: PENDING | SUCCESS | ERROR }
//! GET  {base}/job/{id}/result/markdown   { markdown }
//! ```
//!
//! Polling runs every two seconds until the job settles or the parser
//! timeout elapses.

use super::{failed, finish, preflight, Converter, ConverterContext};
use crate::error::ConversionError;
use crate::output::ConversionResult;
use crate::prompts::PARSER_INSTRUCTION;
use crate::quality::QualityProfile;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const NAME: &str = "llamaparse";
pub const DEFAULT_BASE_URL: &str = "https://api.cloud.llamaindex.ai/api/parsing";

const EXTENSIONS: &[&str] = &[".pdf", ".docx", ".pptx", ".xlsx", ".html", ".epub"];
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct LlamaParseConverter {
    api_key: Option<String>,
    base_url: String,
    output_dir: Option<PathBuf>,
    timeout: Duration,
    poll_interval: Duration,
    frontmatter: bool,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarkdownResponse {
    #[serde(default)]
    markdown: String,
}

impl LlamaParseConverter {
    pub fn new(ctx: &ConverterContext) -> Self {
        Self {
            api_key: ctx.config.credentials.llama_cloud_api_key.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: ctx.config.output_dir.clone(),
            timeout: Duration::from_secs(ctx.config.parser_timeout_secs),
            poll_interval: POLL_INTERVAL,
            frontmatter: ctx.config.enable_frontmatter,
            client: ctx.http.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn run(&self, source: &Path) -> Result<String, ConversionError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ConversionError::BackendUnavailable {
                backend: NAME.into(),
                hint: "set MDCONVERT_LLAMA_CLOUD_API_KEY".into(),
            })?;
        let deadline = Instant::now() + self.timeout;

        let job = self.upload(key, source).await?;
        debug!("llamaparse: job {} for {}", job, source.display());

        loop {
            let status: JobResponse = self
                .get_json(key, &format!("{}/job/{}", self.base_url, job))
                .await?;
            match status.status.as_str() {
                "SUCCESS" => break,
                "ERROR" => {
                    return Err(ConversionError::ToolFailed {
                        tool: NAME.into(),
                        detail: status
                            .error_message
                            .unwrap_or_else(|| format!("job {job} failed")),
                    })
                }
                _ => {}
            }
            if Instant::now() + self.poll_interval > deadline {
                warn!("llamaparse: job {} still running at deadline", job);
                return Err(ConversionError::Timeout {
                    backend: NAME.into(),
                    secs: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        let result: MarkdownResponse = self
            .get_json(
                key,
                &format!("{}/job/{}/result/markdown", self.base_url, job),
            )
            .await?;
        Ok(result.markdown)
    }

    async fn upload(&self, key: &str, source: &Path) -> Result<String, ConversionError> {
        let bytes = tokio::fs::read(source)
            .await
            .map_err(|e| ConversionError::Io {
                detail: format!("reading {}: {}", source.display(), e),
            })?;
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("result_type", "markdown")
            .text("parsing_instruction", PARSER_INSTRUCTION);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .bearer_auth(key)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let upload: UploadResponse = self.decode(response).await?;
        Ok(upload.id)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        key: &str,
        url: &str,
    ) -> Result<T, ConversionError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.decode(response).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ConversionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConversionError::ToolFailed {
                tool: NAME.into(),
                detail: format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    crate::provider::truncate_body(&body)
                ),
            });
        }
        response.json().await.map_err(|e| self.transport(e))
    }

    fn transport(&self, e: reqwest::Error) -> ConversionError {
        if e.is_timeout() {
            ConversionError::Timeout {
                backend: NAME.into(),
                secs: self.timeout.as_secs(),
            }
        } else {
            ConversionError::ToolFailed {
                tool: NAME.into(),
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Converter for LlamaParseConverter {
    fn name(&self) -> &str {
        NAME
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn quality_profile(&self) -> QualityProfile {
        QualityProfile::ScannedParser
    }

    fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    async fn convert(&self, source: &Path) -> ConversionResult {
        let started = Instant::now();
        if let Some(early) = preflight(self, source, started).await {
            return early;
        }
        match self.run(source).await {
            Ok(markdown) if markdown.trim().is_empty() => failed(
                self,
                source,
                ConversionError::ToolFailed {
                    tool: NAME.into(),
                    detail: "parser returned no content".into(),
                },
                started,
            ),
            Ok(markdown) => finish(self, source, NAME, markdown, self.frontmatter, started).await,
            Err(e) => failed(self, source, e, started),
        }
    }
}
