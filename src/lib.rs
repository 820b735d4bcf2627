//! # mdconvert
//!
//! Convert documents (PDF, Office files, HTML, images) to Markdown by
//! delegating to interchangeable backends: a local `pandoc` subprocess, a
//! hosted parser for scanned PDFs, and a fallback chain of language models
//! reached over HTTP.
//!
//! ## Pipeline Overview
//!
//! ```text
//! paths
//!  │
//!  ├─ 1. Select   registry picks the lowest-priority converter for the extension
//!  ├─ 2. Cache    unchanged source bytes → reuse the stored Markdown
//!  ├─ 3. Convert  pandoc | llamaparse | model chain (first qualifying answer wins)
//!  ├─ 4. Polish   clean-up, frontmatter, quality score
//!  └─ 5. Output   atomic write of <stem>.md + ConversionResult per file
//! ```
//!
//! Files run concurrently up to `ConverterConfig::concurrency`; one failing
//! file never aborts the batch.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdconvert::{
//!     ContentCache, ConverterConfig, ConverterContext, ConverterRegistry, ConverterSelection,
//!     Orchestrator, ProviderCredentials,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConverterConfig::builder()
//!         .credentials(ProviderCredentials::from_env())
//!         .output_dir("out")
//!         .build()?;
//!     let orchestrator = Orchestrator::new(
//!         ConverterRegistry::with_defaults(),
//!         ConverterContext::new(config),
//!     )
//!     .with_cache(Arc::new(ContentCache::open(".mdconvert_cache")?));
//!
//!     let results = orchestrator
//!         .convert_all(["report.pdf", "notes.docx"], &ConverterSelection::Auto)
//!         .await?;
//!     for r in results {
//!         println!("{} → {:?} ({})", r.source_path.display(), r.status, r.tool_used);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mdconvert` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! mdconvert = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod converter;
pub mod error;
pub mod frontmatter;
pub mod orchestrator;
pub mod output;
pub mod postprocess;
pub mod progress;
pub mod prompts;
pub mod provider;
pub mod quality;
pub mod registry;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{CacheEntry, CacheHit, CacheStats, ContentCache};
pub use config::{ConverterConfig, ConverterConfigBuilder, ProviderCredentials};
pub use converter::{
    Converter, ConverterContext, LlamaParseConverter, LlmConverter, PandocConverter,
};
pub use error::{ConversionError, MdConvertError, ProviderError};
pub use orchestrator::{ConverterSelection, Orchestrator, ResultStream};
pub use output::{BatchSummary, ConversionResult, ConversionStatus};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use provider::{
    GeminiProvider, GenerationConfig, OpenAiCompatProvider, Provider, ProviderKind, ProviderSet,
    RetryPolicy, RoutingRule, RoutingTable,
};
pub use quality::QualityProfile;
pub use registry::{ConverterFactory, ConverterInfo, ConverterRegistry};
