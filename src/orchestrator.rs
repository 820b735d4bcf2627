//! Batch conversion with bounded concurrency.
//!
//! ## Per-file flow
//!
//! ```text
//! path ─▶ converter (named, or registry.auto_select(ext))   none → Skipped
//!      ─▶ cache.lookup(path)                                hit  → write cached Markdown, Success
//!                                                           (a named converter only accepts its own entries)
//!      ─▶ converter.convert(path)
//!      ─▶ cache.set(path, ..) on Success
//! ```
//!
//! At most `concurrency` files are in flight at once
//! (`buffer_unordered`). Results come back in completion order, not
//! submission order. A file's failure is always folded into its own
//! [`ConversionResult`]; only an unknown converter name fails the call.

use crate::cache::ContentCache;
use crate::converter::{extension_of, Converter, ConverterContext};
use crate::error::{ConversionError, MdConvertError};
use crate::output::{write_atomic, BatchSummary, ConversionResult};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::quality;
use crate::registry::ConverterRegistry;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// A boxed stream of per-file results, in completion order.
pub type ResultStream = Pin<Box<dyn Stream<Item = ConversionResult> + Send>>;

/// How the converter for each file is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConverterSelection {
    /// Best registered converter for each file's extension.
    #[default]
    Auto,
    /// One named converter for every file.
    Named(String),
}

impl FromStr for ConverterSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(if s.is_empty() || s.eq_ignore_ascii_case("auto") {
            ConverterSelection::Auto
        } else {
            ConverterSelection::Named(s.to_ascii_lowercase())
        })
    }
}

impl fmt::Display for ConverterSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConverterSelection::Auto => f.write_str("auto"),
            ConverterSelection::Named(name) => f.write_str(name),
        }
    }
}

/// Drives conversions across many files.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ConverterRegistry>,
    ctx: ConverterContext,
    cache: Option<Arc<ContentCache>>,
    concurrency: usize,
    progress: ProgressCallback,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("cache", &self.cache.as_ref().map(|c| c.location().to_path_buf()))
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Concurrency defaults to `ctx.config.concurrency`; no cache.
    pub fn new(registry: ConverterRegistry, ctx: ConverterContext) -> Self {
        let concurrency = ctx.config.concurrency.max(1);
        Self {
            registry: Arc::new(registry),
            ctx,
            cache: None,
            concurrency,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_cache(mut self, cache: Arc<ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn cache(&self) -> Option<&Arc<ContentCache>> {
        self.cache.as_ref()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Convert one file.
    pub async fn convert_file(
        &self,
        path: impl Into<PathBuf>,
        selection: &ConverterSelection,
    ) -> Result<ConversionResult, MdConvertError> {
        let fixed = self.resolve(selection)?;
        Ok(self.process(path.into(), fixed).await)
    }

    /// Convert every path and collect the results in completion order.
    pub async fn convert_all<I, P>(
        &self,
        paths: I,
        selection: &ConverterSelection,
    ) -> Result<Vec<ConversionResult>, MdConvertError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let fixed = self.resolve(selection)?;
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        info!(
            "Converting {} files with {} (concurrency {})",
            paths.len(),
            selection,
            self.concurrency
        );
        self.progress.on_batch_start(paths.len());

        let results: Vec<ConversionResult> = stream::iter(
            paths
                .into_iter()
                .map(|path| self.process(path, fixed.clone())),
        )
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let summary = BatchSummary::from_results(&results);
        info!(
            "Batch done: {} succeeded, {} failed, {} skipped",
            summary.succeeded, summary.failed, summary.skipped
        );
        self.progress.on_batch_complete(&summary);
        Ok(results)
    }

    /// Like [`convert_all`](Self::convert_all), yielding results as they
    /// finish. `on_batch_complete` is not called; the caller owns the end of
    /// the stream.
    pub fn convert_stream<I, P>(
        &self,
        paths: I,
        selection: &ConverterSelection,
    ) -> Result<ResultStream, MdConvertError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let fixed = self.resolve(selection)?;
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        self.progress.on_batch_start(paths.len());

        let this = self.clone();
        let s = stream::iter(paths.into_iter().map(move |path| {
            let this = this.clone();
            let fixed = fixed.clone();
            async move { this.process(path, fixed).await }
        }))
        .buffer_unordered(self.concurrency);
        Ok(Box::pin(s))
    }

    /// `Named` is instantiated once up front; `Auto` selects per file.
    fn resolve(
        &self,
        selection: &ConverterSelection,
    ) -> Result<Option<Arc<dyn Converter>>, MdConvertError> {
        match selection {
            ConverterSelection::Auto => Ok(None),
            ConverterSelection::Named(name) => self.registry.create(name, &self.ctx).map(Some),
        }
    }

    async fn process(&self, path: PathBuf, fixed: Option<Arc<dyn Converter>>) -> ConversionResult {
        self.progress.on_file_start(&path);
        let result = self.process_inner(&path, fixed).await;
        self.progress.on_file_complete(&result);
        result
    }

    async fn process_inner(
        &self,
        path: &Path,
        fixed: Option<Arc<dyn Converter>>,
    ) -> ConversionResult {
        let started = Instant::now();
        let ext = extension_of(path);
        let named = fixed.is_some();

        let converter = match fixed {
            Some(c) => c,
            None => match self.registry.auto_select(&ext, &self.ctx) {
                Ok(c) => c,
                Err(e) => {
                    debug!("{}: {}", path.display(), e);
                    let err = ConversionError::Unsupported { extension: ext };
                    return ConversionResult::from_error(path, "auto", &err, started.elapsed());
                }
            },
        };

        if let Some(cache) = &self.cache {
            if converter.supports(&ext) {
                if let Some(result) = self
                    .serve_cached(cache, converter.as_ref(), path, named, started)
                    .await
                {
                    return result;
                }
            }
        }

        let result = converter.convert(path).await;
        if result.is_success() {
            if let Some(cache) = &self.cache {
                cache
                    .store(path, &result.content, converter.name(), &result.tool_used)
                    .await;
            }
        }
        result
    }

    async fn serve_cached(
        &self,
        cache: &ContentCache,
        converter: &dyn Converter,
        path: &Path,
        named: bool,
        started: Instant,
    ) -> Option<ConversionResult> {
        let hit = cache.lookup(path).await?;
        if named && hit.converter != converter.name() {
            debug!(
                "{}: cached copy is from '{}', converting with '{}'",
                path.display(),
                hit.converter,
                converter.name()
            );
            return None;
        }
        let output = converter.output_path(path);
        if let Err(e) = write_atomic(&output, hit.content.as_bytes()).await {
            warn!(
                "{}: cached copy could not be written to {}: {}",
                path.display(),
                output.display(),
                e
            );
            return None;
        }
        debug!("{}: served from cache", path.display());
        let score = quality::score(&hit.content, converter.quality_profile());
        Some(
            ConversionResult::success(
                path,
                output,
                hit.tool_used,
                hit.content,
                score,
                started.elapsed(),
            )
            .with_metadata("cache", "hit"),
        )
    }
}
