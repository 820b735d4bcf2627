//! CLI binary for mdconvert.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `ConverterConfig`, discovers input files and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use mdconvert::cache::DEFAULT_CACHE_DIR;
use mdconvert::config::DEFAULT_GEMINI_PROXY;
use mdconvert::{
    BatchProgressCallback, BatchSummary, ContentCache, ConversionResult, ConversionStatus,
    ConverterConfig, ConverterContext, ConverterRegistry, ConverterSelection, Orchestrator,
    ProgressCallback, ProviderCredentials,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the batch plus a log line per finished file. Files finish
/// out of order, so every line names its file.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgress {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
    }

    fn on_file_complete(&self, result: &ConversionResult) {
        self.bar.println(result_line(result));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _summary: &BatchSummary) {
        self.bar.finish_and_clear();
    }
}

fn result_line(r: &ConversionResult) -> String {
    let name = r
        .source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| r.source_path.display().to_string());
    match r.status {
        ConversionStatus::Success => {
            let cached = if r.metadata.get("cache").is_some_and(|v| v == "hit") {
                " (cached)"
            } else {
                ""
            };
            format!(
                "  {} {:<40} {}  {}",
                green("✓"),
                name,
                dim(&format!("{}{} q={}", r.tool_used, cached, r.quality_score)),
                dim(&format!("{:.1}s", r.duration_seconds)),
            )
        }
        ConversionStatus::Skipped => format!(
            "  {} {:<40} {}",
            yellow("-"),
            name,
            dim(r.error_message.as_deref().unwrap_or("skipped"))
        ),
        ConversionStatus::Failed | ConversionStatus::Partial => {
            let msg = r.error_message.as_deref().unwrap_or("failed");
            let msg: String = if msg.chars().count() > 100 {
                format!("{}\u{2026}", msg.chars().take(99).collect::<String>())
            } else {
                msg.to_string()
            };
            format!("  {} {:<40} {}", red("✗"), name, red(&msg))
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one file next to its source
  mdconvert convert report.pdf

  # Convert a directory tree into ./out with 8 files in flight
  mdconvert convert docs/ -r -o out -c 8

  # Force a backend and a model chain
  mdconvert convert scan.pdf -t llm --model gemini-1.5-flash --model deepseek-chat

  # Inspect backends, cache and configuration
  mdconvert converters
  mdconvert cache stats
  mdconvert config

ENVIRONMENT VARIABLES:
  MDCONVERT_ANTIGRAVITY_PROXY         Gemini-compatible endpoint (default http://127.0.0.1:8045)
  MDCONVERT_ANTIGRAVITY_ACCESS_TOKEN  Bearer token for that endpoint
  MDCONVERT_GEMINI_API_KEY            Google API key (used when no proxy token is set)
  MDCONVERT_DEEPSEEK_API_KEY          Enables deepseek-* models
  MDCONVERT_GROQ_API_KEY              Enables llama/mixtral/gemma models
  MDCONVERT_OPENAI_API_KEY            Enables gpt-* models
  MDCONVERT_LLAMA_CLOUD_API_KEY       Enables the llamaparse converter
"#;

/// Convert documents to Markdown with pandoc, LlamaParse or LLM providers.
#[derive(Parser, Debug)]
#[command(
    name = "mdconvert",
    version,
    about = "Convert PDF, DOCX, HTML and images to Markdown",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MDCONVERT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "MDCONVERT_QUIET")]
    quiet: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, env = "MDCONVERT_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a file or directory.
    Convert(ConvertArgs),
    /// List registered converters.
    Converters,
    /// Inspect or clear the conversion cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Cache directory.
        #[arg(long, env = "MDCONVERT_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,
    },
    /// Print the effective configuration (secrets masked).
    Config(CredentialArgs),
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Entry count and size on disk.
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Remove every entry.
    Clear,
    /// Remove the entry for one source file.
    Invalidate { file: PathBuf },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input file or directory.
    input: PathBuf,

    /// Output directory. Defaults to next to each source file.
    #[arg(short, long, env = "MDCONVERT_OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// Recurse into subdirectories.
    #[arg(short, long)]
    recursive: bool,

    /// Converter: auto, pandoc, llamaparse, llm.
    #[arg(short, long, env = "MDCONVERT_TOOL", default_value = "auto")]
    tool: String,

    /// Model fallback chain, tried in order (repeatable or comma-separated).
    #[arg(long = "model", env = "MDCONVERT_MODELS", value_delimiter = ',')]
    models: Vec<String>,

    /// Files converted at once.
    #[arg(short, long, env = "MDCONVERT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per provider call timeout in seconds (30–3600).
    #[arg(long, env = "MDCONVERT_TIMEOUT", default_value_t = 600)]
    timeout: u64,

    /// Minimum accepted output length in characters.
    #[arg(long, env = "MDCONVERT_MIN_CONTENT_LENGTH", default_value_t = 100)]
    min_content_length: usize,

    /// Do not prepend YAML frontmatter.
    #[arg(long)]
    no_frontmatter: bool,

    /// Path to a text file containing a custom conversion prompt.
    #[arg(long, env = "MDCONVERT_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Bypass the conversion cache.
    #[arg(long, env = "MDCONVERT_NO_CACHE")]
    no_cache: bool,

    /// Cache directory.
    #[arg(long, env = "MDCONVERT_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Print results as JSON instead of a progress log.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MDCONVERT_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    credentials: CredentialArgs,
}

#[derive(Args, Debug, Clone)]
struct CredentialArgs {
    #[arg(long, env = "MDCONVERT_ANTIGRAVITY_PROXY", default_value = DEFAULT_GEMINI_PROXY, hide = true)]
    gemini_base_url: String,
    #[arg(long, env = "MDCONVERT_ANTIGRAVITY_ACCESS_TOKEN", hide_env_values = true, hide = true)]
    gemini_proxy_token: Option<String>,
    #[arg(long, env = "MDCONVERT_GEMINI_API_KEY", hide_env_values = true, hide = true)]
    gemini_api_key: Option<String>,
    #[arg(long, env = "MDCONVERT_DEEPSEEK_API_KEY", hide_env_values = true, hide = true)]
    deepseek_api_key: Option<String>,
    #[arg(long, env = "MDCONVERT_GROQ_API_KEY", hide_env_values = true, hide = true)]
    groq_api_key: Option<String>,
    #[arg(long, env = "MDCONVERT_OPENAI_API_KEY", hide_env_values = true, hide = true)]
    openai_api_key: Option<String>,
    #[arg(long, env = "MDCONVERT_LLAMA_CLOUD_API_KEY", hide_env_values = true, hide = true)]
    llama_cloud_api_key: Option<String>,
}

impl From<CredentialArgs> for ProviderCredentials {
    fn from(a: CredentialArgs) -> Self {
        let nonempty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        ProviderCredentials {
            gemini_base_url: a.gemini_base_url,
            gemini_proxy_token: nonempty(a.gemini_proxy_token),
            gemini_api_key: nonempty(a.gemini_api_key),
            deepseek_api_key: nonempty(a.deepseek_api_key),
            groq_api_key: nonempty(a.groq_api_key),
            openai_api_key: nonempty(a.openai_api_key),
            llama_cloud_api_key: nonempty(a.llama_cloud_api_key),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the per-file feedback, so library INFO logs
    // are suppressed while it is shown.
    let show_progress = match &cli.command {
        Command::Convert(a) => !cli.quiet && !a.no_progress && !a.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    }

    match cli.command {
        Command::Convert(args) => run_convert(args, show_progress, cli.quiet).await,
        Command::Converters => {
            run_converters();
            Ok(())
        }
        Command::Cache { action, cache_dir } => run_cache(action, &cache_dir).await,
        Command::Config(creds) => run_config(creds),
    }
}

async fn run_convert(args: ConvertArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let config = build_config(&args).await?;
    let registry = ConverterRegistry::with_defaults();
    let selection: ConverterSelection = args
        .tool
        .parse()
        .unwrap_or(ConverterSelection::Auto);

    let files = discover(&args.input, args.recursive, &registry)?;
    if files.is_empty() {
        anyhow::bail!("No convertible files found in {}", args.input.display());
    }

    let mut orchestrator = Orchestrator::new(registry, ConverterContext::new(config));
    if !args.no_cache {
        let cache = ContentCache::open(&args.cache_dir).context("Failed to open cache")?;
        orchestrator = orchestrator.with_cache(Arc::new(cache));
    }
    if show_progress {
        orchestrator = orchestrator.with_progress(CliProgress::new() as ProgressCallback);
    }

    let results = orchestrator
        .convert_all(files, &selection)
        .await
        .context("Conversion failed")?;
    let summary = BatchSummary::from_results(&results);

    if args.json {
        let json = serde_json::json!({ "results": results, "summary": summary });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise results")?
        );
    } else if !quiet {
        if !show_progress {
            for r in &results {
                eprintln!("{}", result_line(r));
            }
        }
        eprintln!(
            "{} {} converted, {} failed, {} skipped  {}",
            if summary.failed == 0 { green("✔") } else { red("✘") },
            bold(&summary.succeeded.to_string()),
            summary.failed,
            summary.skipped,
            dim(&format!("mean quality {:.0}", summary.mean_quality)),
        );
    }

    if summary.failed > 0 {
        anyhow::bail!("{} file(s) failed to convert", summary.failed);
    }
    Ok(())
}

fn run_converters() {
    let registry = ConverterRegistry::with_defaults();
    println!("{:<12} {:>8}  EXTENSIONS", "NAME", "PRIORITY");
    for info in registry.list_all() {
        println!(
            "{:<12} {:>8}  {}",
            info.name,
            info.priority,
            info.supported_extensions.join(" ")
        );
    }
}

async fn run_cache(action: CacheAction, cache_dir: &Path) -> Result<()> {
    let cache = ContentCache::open(cache_dir).context("Failed to open cache")?;
    match action {
        CacheAction::Stats { json } => {
            let stats = cache.stats().await;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
                );
            } else {
                println!("Location:  {}", stats.location.display());
                println!("Entries:   {}", stats.entries);
                println!("Size:      {} bytes", stats.total_size_bytes);
            }
        }
        CacheAction::Clear => {
            let n = cache.clear().await;
            println!("Removed {n} cache entries");
        }
        CacheAction::Invalidate { file } => {
            if cache.invalidate(&file).await {
                println!("Invalidated {}", file.display());
            } else {
                println!("No cache entry for {}", file.display());
            }
        }
    }
    Ok(())
}

fn run_config(creds: CredentialArgs) -> Result<()> {
    let config = ConverterConfig::builder()
        .credentials(creds.into())
        .build()
        .context("Invalid configuration")?;
    let ctx = ConverterContext::new(config);
    let c = &ctx.config;

    println!("Models:             {}", c.models.join(" → "));
    println!("Routing:");
    for rule in c.routing.rules() {
        println!("  *{}*  →  {}", rule.pattern, rule.provider);
    }
    println!("  (default)  →  {}", c.routing.default_kind());
    let configured: Vec<String> = ctx.providers.kinds().iter().map(|k| k.to_string()).collect();
    println!("Providers:          {}", configured.join(", "));
    println!("Credentials:        {:?}", c.credentials);
    println!("Timeout:            {}s", c.timeout_secs);
    println!("Min content length: {}", c.min_content_length);
    println!("Concurrency:        {}", c.concurrency);
    Ok(())
}

/// Map CLI args to `ConverterConfig`.
async fn build_config(args: &ConvertArgs) -> Result<ConverterConfig> {
    let mut builder = ConverterConfig::builder()
        .credentials(args.credentials.clone().into())
        .concurrency(args.concurrency)
        .timeout_secs(args.timeout)
        .min_content_length(args.min_content_length)
        .enable_frontmatter(!args.no_frontmatter);

    if let Some(dir) = &args.output {
        builder = builder.output_dir(dir);
    }
    if !args.models.is_empty() {
        builder = builder.models(args.models.iter().cloned());
    }
    if let Some(path) = &args.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Files under `input` that some registered converter supports.
fn discover(input: &Path, recursive: bool, registry: &ConverterRegistry) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("Input not found: {}", input.display());
    }

    let known: Vec<String> = registry
        .list_all()
        .into_iter()
        .flat_map(|i| i.supported_extensions)
        .collect();
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    let walker = WalkDir::new(input)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to read {}", input.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = mdconvert::converter::extension_of(entry.path());
        if known.contains(&ext) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}
