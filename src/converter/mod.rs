//! Document converters.
//!
//! A [`Converter`] turns one source file into Markdown and always answers
//! with a [`ConversionResult`]: missing files, unsupported extensions and
//! backend failures are folded into the result instead of being returned as
//! `Err`, so one bad file never aborts a batch.
//!
//! * [`pandoc`]: local `pandoc` subprocess (priority 10)
//! * [`llamaparse`]: hosted parser for scanned PDFs (priority 30)
//! * [`llm`]: model fallback chain over the [`crate::provider`]s (priority 50)

pub mod llamaparse;
pub mod llm;
pub mod pandoc;

pub use llamaparse::LlamaParseConverter;
pub use llm::LlmConverter;
pub use pandoc::PandocConverter;

use crate::config::ConverterConfig;
use crate::error::ConversionError;
use crate::frontmatter::add_frontmatter;
use crate::output::{write_atomic, ConversionResult};
use crate::provider::ProviderSet;
use crate::quality::{self, QualityProfile};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Convert a single source file to Markdown.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Registry name, also used as `tool_used` on failures.
    fn name(&self) -> &str;

    /// Lower-case extensions with a leading dot, e.g. `".pdf"`.
    fn supported_extensions(&self) -> &'static [&'static str];

    /// Whether `extension` is handled. Case-insensitive; the leading dot
    /// is optional.
    fn supports(&self, extension: &str) -> bool {
        let ext = normalize_extension(extension);
        self.supported_extensions().iter().any(|e| *e == ext)
    }

    /// Which quality heuristic applies to this converter's output.
    fn quality_profile(&self) -> QualityProfile;

    /// Output directory; `None` writes next to the source.
    fn output_dir(&self) -> Option<&Path>;

    /// Where the Markdown for `source` is written.
    fn output_path(&self, source: &Path) -> PathBuf {
        output_path_for(source, self.output_dir())
    }

    /// Convert `source`. Never panics, never returns `Err`.
    async fn convert(&self, source: &Path) -> ConversionResult;
}

/// Shared construction inputs for converters.
///
/// Cheap to clone: the config is behind an `Arc`, the provider set holds
/// `Arc`s and `reqwest::Client` is a pooled handle. Everything expensive
/// (the `pandoc` lookup, the HTTP client) is resolved once here, so
/// building a converter from a context is cheap enough for per-file
/// auto-selection.
#[derive(Debug, Clone)]
pub struct ConverterContext {
    pub config: Arc<ConverterConfig>,
    pub providers: ProviderSet,
    /// HTTP client shared by every remote backend.
    pub http: reqwest::Client,
    /// `pandoc` executable found on `PATH`, if any.
    pub pandoc_binary: Option<PathBuf>,
}

impl ConverterContext {
    /// Context with providers built from `config.credentials`.
    pub fn new(config: ConverterConfig) -> Self {
        let http = reqwest::Client::new();
        let providers = ProviderSet::from_config_with_client(&config, &http);
        Self {
            config: Arc::new(config),
            providers,
            http,
            pandoc_binary: which::which("pandoc").ok(),
        }
    }

    /// Replace the provider set (tests inject fakes here).
    pub fn with_providers(mut self, providers: ProviderSet) -> Self {
        self.providers = providers;
        self
    }

    /// Override the `pandoc` executable; `None` marks it missing.
    pub fn with_pandoc_binary(mut self, binary: Option<PathBuf>) -> Self {
        self.pandoc_binary = binary;
        self
    }
}

impl Default for ConverterContext {
    fn default() -> Self {
        Self::new(ConverterConfig::default())
    }
}

/// `".pdf"` for `"PDF"`, `"pdf"` or `".Pdf"`.
pub fn normalize_extension(extension: &str) -> String {
    let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() {
        String::new()
    } else {
        format!(".{ext}")
    }
}

/// Normalised extension of `path`, empty when it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default()
}

/// Mime type sent to providers for a normalised extension.
pub fn mime_type_for(extension: &str) -> &'static str {
    match extension {
        ".pdf" => "application/pdf",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".doc" => "application/msword",
        ".pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".html" | ".htm" => "text/html",
        ".txt" => "text/plain",
        ".md" => "text/markdown",
        _ => "application/octet-stream",
    }
}

/// Lower-cased stem with spaces replaced by `_`, plus `.md`.
pub fn output_path_for(source: &Path, output_dir: Option<&Path>) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase().replace(' ', "_"))
        .unwrap_or_else(|| "output".to_string());
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(format!("{stem}.md"))
}

// ── Shared conversion steps ─────────────────────────────────────────────────

/// Missing-file and unsupported-extension checks every converter runs first.
pub(crate) async fn preflight<C: Converter + ?Sized>(
    converter: &C,
    source: &Path,
    started: Instant,
) -> Option<ConversionResult> {
    if !tokio::fs::try_exists(source).await.unwrap_or(false) {
        let err = ConversionError::NotFound {
            path: source.to_path_buf(),
        };
        return Some(ConversionResult::from_error(
            source,
            converter.name(),
            &err,
            started.elapsed(),
        ));
    }
    let ext = extension_of(source);
    if !converter.supports(&ext) {
        let err = ConversionError::Unsupported { extension: ext };
        return Some(ConversionResult::from_error(
            source,
            converter.name(),
            &err,
            started.elapsed(),
        ));
    }
    None
}

/// Add frontmatter, persist, score and wrap up a successful conversion.
pub(crate) async fn finish<C: Converter + ?Sized>(
    converter: &C,
    source: &Path,
    tool: &str,
    markdown: String,
    frontmatter: bool,
    started: Instant,
) -> ConversionResult {
    let content = if frontmatter {
        add_frontmatter(&markdown, source, tool)
    } else {
        markdown
    };
    let output = converter.output_path(source);
    if let Err(e) = write_atomic(&output, content.as_bytes()).await {
        let err = ConversionError::Io {
            detail: format!("writing {}: {}", output.display(), e),
        };
        return ConversionResult::from_error(source, tool, &err, started.elapsed());
    }
    let score = quality::score(&content, converter.quality_profile());
    ConversionResult::success(source, output, tool, content, score, started.elapsed())
}

/// A failure result attributed to `converter`.
pub(crate) fn failed<C: Converter + ?Sized>(
    converter: &C,
    source: &Path,
    err: ConversionError,
    started: Instant,
) -> ConversionResult {
    ConversionResult::from_error(source, converter.name(), &err, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_normalisation() {
        assert_eq!(normalize_extension("PDF"), ".pdf");
        assert_eq!(normalize_extension(".Docx"), ".docx");
        assert_eq!(normalize_extension(""), "");
        assert_eq!(extension_of(Path::new("a/b/Report.PDF")), ".pdf");
        assert_eq!(extension_of(Path::new("Makefile")), "");
    }

    #[test]
    fn output_path_lowercases_and_underscores() {
        let p = output_path_for(Path::new("/in/Annual Report 2024.pdf"), None);
        assert_eq!(p, PathBuf::from("/in/annual_report_2024.md"));
        let p = output_path_for(Path::new("/in/A.docx"), Some(Path::new("/out")));
        assert_eq!(p, PathBuf::from("/out/a.md"));
    }

    #[test]
    fn mime_lookup() {
        assert_eq!(mime_type_for(".pdf"), "application/pdf");
        assert_eq!(mime_type_for(".jpeg"), "image/jpeg");
        assert_eq!(mime_type_for(".xyz"), "application/octet-stream");
    }

    #[test]
    fn default_context_has_gemini_only() {
        let ctx = ConverterContext::default();
        assert_eq!(
            ctx.providers.kinds(),
            vec![crate::provider::ProviderKind::Gemini]
        );
    }
}
