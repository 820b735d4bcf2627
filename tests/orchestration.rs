//! Integration tests for the cache, registry, fallback chain and orchestrator.
//!
//! Everything runs offline: converters and providers are in-process fakes.

use async_trait::async_trait;
use futures::StreamExt;
use mdconvert::{
    BatchProgressCallback, BatchSummary, ContentCache, ConversionResult, ConversionStatus,
    Converter, ConverterConfig, ConverterContext, ConverterRegistry, ConverterSelection,
    GenerationConfig, LlmConverter, Orchestrator, PandocConverter, Provider, ProviderError,
    ProviderKind, ProviderSet, QualityProfile,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Converter that succeeds after a short sleep and tracks concurrency.
struct Fake {
    name: &'static str,
    extensions: &'static [&'static str],
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Fake {
    fn named(name: &'static str) -> Self {
        Self {
            name,
            extensions: &[".pdf", ".docx"],
            calls: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
        }
    }

    fn sharing(&self) -> Self {
        Self {
            name: self.name,
            extensions: self.extensions,
            calls: self.calls.clone(),
            in_flight: self.in_flight.clone(),
            max_in_flight: self.max_in_flight.clone(),
        }
    }
}

#[async_trait]
impl Converter for Fake {
    fn name(&self) -> &str {
        self.name
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    fn quality_profile(&self) -> QualityProfile {
        QualityProfile::LocalTool
    }

    fn output_dir(&self) -> Option<&Path> {
        None
    }

    async fn convert(&self, source: &Path) -> ConversionResult {
        let started = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        ConversionResult::success(
            source,
            self.output_path(source),
            self.name,
            format!("# {}\n", self.name),
            60,
            started.elapsed(),
        )
    }
}

fn registry_with(fake: &Fake) -> ConverterRegistry {
    let mut registry = ConverterRegistry::new();
    let shared = fake.sharing();
    let name = shared.name;
    let shared = Arc::new(shared);
    registry.register(name, 10, move |_ctx| shared.clone() as Arc<dyn Converter>);
    registry
}

/// Provider answering per model from a fixed script.
struct Scripted {
    answers: Vec<(&'static str, Result<String, ProviderError>)>,
    calls: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(answers: Vec<(&'static str, Result<String, ProviderError>)>) -> Arc<Self> {
        Arc::new(Self {
            answers,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Provider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _file: &[u8],
        _mime_type: &str,
        model: &str,
        _config: GenerationConfig,
    ) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(model.to_string());
        self.answers
            .iter()
            .find(|(m, _)| *m == model)
            .map(|(_, a)| a.clone())
            .unwrap_or_else(|| {
                Err(ProviderError::InvalidResponse {
                    provider: "scripted".into(),
                    detail: format!("no answer for {model}"),
                })
            })
    }
}

fn http_error(status: u16) -> Result<String, ProviderError> {
    Err(ProviderError::Http {
        provider: "scripted".into(),
        status,
        body: "nope".into(),
    })
}

fn long_markdown() -> String {
    format!("## Section\n\n{}", "Readable paragraph text. ".repeat(20))
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, bytes).unwrap();
    p
}

// ── Cache ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cache_round_trip_and_invalidation_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ContentCache::open(dir.path().join("cache")).unwrap();
    let src = write_file(dir.path(), "a.docx", b"version one");

    assert!(cache.get(&src).await.is_none());
    cache.set(&src, "# One\n", "pandoc").await;
    assert_eq!(cache.get(&src).await.as_deref(), Some("# One\n"));

    let hit = cache.lookup(&src).await.unwrap();
    assert_eq!(hit.tool_used, "pandoc");

    std::fs::write(&src, b"version two").unwrap();
    assert!(cache.get(&src).await.is_none());
}

#[tokio::test]
async fn cache_keys_by_path_not_just_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ContentCache::open(dir.path().join("cache")).unwrap();
    let a = write_file(dir.path(), "a.pdf", b"same bytes");
    let b = write_file(dir.path(), "b.pdf", b"same bytes");

    cache.set(&a, "# A\n", "llm/x").await;
    assert!(cache.get(&b).await.is_none());

    cache.set(&b, "# B\n", "llm/y").await;
    assert_eq!(cache.get(&a).await.as_deref(), Some("# A\n"));
    assert_eq!(cache.get(&b).await.as_deref(), Some("# B\n"));
    assert_eq!(cache.stats().await.entries, 2);
}

#[tokio::test]
async fn cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let src = write_file(dir.path(), "a.html", b"<p>hi</p>");
    {
        let cache = ContentCache::open(&cache_dir).unwrap();
        cache.set(&src, "hi\n", "pandoc").await;
    }
    let cache = ContentCache::open(&cache_dir).unwrap();
    assert_eq!(cache.get(&src).await.as_deref(), Some("hi\n"));
    assert!(cache.invalidate(&src).await);
    assert!(!cache.invalidate(&src).await);
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[test]
fn auto_select_is_independent_of_registration_order() {
    let entries = [("p10", 10), ("p30", 30), ("p50", 50)];
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    let ctx = ConverterContext::default();
    for order in orders {
        let mut registry = ConverterRegistry::new();
        for i in order {
            let (name, priority) = entries[i];
            registry.register(name, priority, move |_ctx| {
                Arc::new(Fake::named(name)) as Arc<dyn Converter>
            });
        }
        let chosen = registry.auto_select(".pdf", &ctx).unwrap();
        assert_eq!(chosen.name(), "p10", "order {order:?}");
    }
}

#[test]
fn equal_priorities_prefer_first_registered() {
    let mut registry = ConverterRegistry::new();
    registry.register("first", 20, |_| Arc::new(Fake::named("first")) as Arc<dyn Converter>);
    registry.register("second", 20, |_| Arc::new(Fake::named("second")) as Arc<dyn Converter>);
    let chosen = registry
        .auto_select("PDF", &ConverterContext::default())
        .unwrap();
    assert_eq!(chosen.name(), "first");
}

// ── LLM fallback chain ───────────────────────────────────────────────────────

fn llm_converter(out: &Path, models: &[&str], providers: ProviderSet) -> LlmConverter {
    let config = ConverterConfig::builder()
        .output_dir(out)
        .models(models.iter().copied())
        .min_content_length(100)
        .build()
        .unwrap();
    LlmConverter::new(&ConverterContext::new(config).with_providers(providers))
}

#[tokio::test]
async fn every_model_failing_yields_failed_result() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_file(dir.path(), "doc.pdf", b"%PDF-1.4");
    let providers = ProviderSet::new()
        .with(ProviderKind::Gemini, Scripted::new(vec![("gemini-a", http_error(500))]))
        .with(ProviderKind::DeepSeek, Scripted::new(vec![("deepseek-b", http_error(429))]))
        .with(ProviderKind::Groq, Scripted::new(vec![("llama-c", http_error(400))]));
    let c = llm_converter(dir.path(), &["gemini-a", "deepseek-b", "llama-c"], providers);

    let r = c.convert(&src).await;
    assert_eq!(r.status, ConversionStatus::Failed);
    let msg = r.error_message.unwrap();
    assert!(msg.starts_with("All models failed"), "{msg}");
    assert!(msg.contains("400"), "last error is reported: {msg}");
    assert!(r.content.is_empty());
    assert!(!dir.path().join("doc.md").exists());
}

#[tokio::test]
async fn short_output_moves_on_to_next_model() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_file(dir.path(), "doc.pdf", b"%PDF-1.4");
    let gemini = Scripted::new(vec![
        ("gemini-short", Ok("tiny!".into())),
        ("gemini-long", Ok(long_markdown())),
    ]);
    let providers = ProviderSet::new().with(ProviderKind::Gemini, gemini.clone());
    let c = llm_converter(dir.path(), &["gemini-short", "gemini-long"], providers);

    let r = c.convert(&src).await;
    assert!(r.is_success(), "{:?}", r.error_message);
    assert_eq!(r.tool_used, "llm/gemini-long");
    assert_eq!(*gemini.calls.lock().unwrap(), ["gemini-short", "gemini-long"]);
}

#[tokio::test]
async fn unsupported_extension_is_skipped_by_converters() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_file(dir.path(), "data.xyz", b"???");
    let ctx = ConverterContext::default();

    let r = PandocConverter::new(&ctx).convert(&src).await;
    assert_eq!(r.status, ConversionStatus::Skipped);
    assert!(r.error_message.unwrap().contains(".xyz"));

    let r = LlmConverter::new(&ctx).convert(&src).await;
    assert_eq!(r.status, ConversionStatus::Skipped);
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrency_cap_is_respected() {
    let fake = Fake::named("fake");
    let orchestrator =
        Orchestrator::new(registry_with(&fake), ConverterContext::default()).with_concurrency(10);
    let paths: Vec<PathBuf> = (0..50).map(|i| PathBuf::from(format!("f{i}.pdf"))).collect();

    let results = orchestrator
        .convert_all(paths, &ConverterSelection::Named("fake".into()))
        .await
        .unwrap();

    assert_eq!(results.len(), 50);
    assert!(results.iter().all(ConversionResult::is_success));
    let max = fake.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 10, "max in flight was {max}");
    assert!(max > 1, "files should overlap, max was {max}");
    assert_eq!(fake.calls.load(Ordering::SeqCst), 50);
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_file(dir.path(), "notes.docx", b"docx bytes");
    let cache = Arc::new(ContentCache::open(dir.path().join("cache")).unwrap());
    let fake = Fake::named("fake");
    let orchestrator =
        Orchestrator::new(registry_with(&fake), ConverterContext::default()).with_cache(cache);

    let first = orchestrator
        .convert_file(&src, &ConverterSelection::Auto)
        .await
        .unwrap();
    assert!(first.is_success());
    assert!(first.metadata.get("cache").is_none());

    let second = orchestrator
        .convert_file(&src, &ConverterSelection::Auto)
        .await
        .unwrap();
    assert!(second.is_success());
    assert_eq!(second.metadata.get("cache").map(String::as_str), Some("hit"));
    assert_eq!(second.tool_used, "fake");
    assert_eq!(second.content, first.content);
    assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    let written = std::fs::read_to_string(dir.path().join("notes.md")).unwrap();
    assert_eq!(written, first.content);
}

#[tokio::test]
async fn named_converter_ignores_another_converters_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_file(dir.path(), "memo.docx", b"docx bytes");
    let cache = Arc::new(ContentCache::open(dir.path().join("cache")).unwrap());
    let fast = Fake::named("fast");
    let good = Fake::named("good");
    let mut registry = ConverterRegistry::new();
    for (fake, priority) in [(&fast, 10), (&good, 50)] {
        let shared = Arc::new(fake.sharing());
        registry.register(fake.name, priority, move |_| shared.clone() as Arc<dyn Converter>);
    }
    let orchestrator =
        Orchestrator::new(registry, ConverterContext::default()).with_cache(cache);

    let auto = orchestrator
        .convert_file(&src, &ConverterSelection::Auto)
        .await
        .unwrap();
    assert_eq!(auto.tool_used, "fast");

    let forced = orchestrator
        .convert_file(&src, &ConverterSelection::Named("good".into()))
        .await
        .unwrap();
    assert_eq!(forced.tool_used, "good");
    assert_eq!(forced.content, "# good\n");
    assert!(forced.metadata.get("cache").is_none());
    assert_eq!(good.calls.load(Ordering::SeqCst), 1);

    // The entry now belongs to `good`, so a repeat is a hit.
    let again = orchestrator
        .convert_file(&src, &ConverterSelection::Named("good".into()))
        .await
        .unwrap();
    assert_eq!(again.metadata.get("cache").map(String::as_str), Some("hit"));
    assert_eq!(good.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fast.calls.load(Ordering::SeqCst), 1);
}

#[derive(Default)]
struct Tracking {
    total: AtomicUsize,
    completed: AtomicUsize,
    summary: Mutex<Option<BatchSummary>>,
}

impl BatchProgressCallback for Tracking {
    fn on_batch_start(&self, total_files: usize) {
        self.total.store(total_files, Ordering::SeqCst);
    }

    fn on_file_complete(&self, _result: &ConversionResult) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        *self.summary.lock().unwrap() = Some(summary.clone());
    }
}

#[tokio::test]
async fn batch_reports_progress_and_mixed_statuses() {
    let fake = Fake::named("fake");
    let tracking = Arc::new(Tracking::default());
    let orchestrator = Orchestrator::new(registry_with(&fake), ConverterContext::default())
        .with_progress(tracking.clone());

    let results = orchestrator
        .convert_all(["a.pdf", "b.docx", "c.xyz"], &ConverterSelection::Auto)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(tracking.total.load(Ordering::SeqCst), 3);
    assert_eq!(tracking.completed.load(Ordering::SeqCst), 3);
    let summary = tracking.summary.lock().unwrap().clone().unwrap();
    assert_eq!((summary.succeeded, summary.skipped), (2, 1));
    let skipped = results
        .iter()
        .find(|r| r.status == ConversionStatus::Skipped)
        .unwrap();
    assert!(skipped.source_path.ends_with("c.xyz"));
}

#[tokio::test]
async fn stream_yields_every_result() {
    let fake = Fake::named("fake");
    let orchestrator =
        Orchestrator::new(registry_with(&fake), ConverterContext::default()).with_concurrency(2);
    let stream = orchestrator
        .convert_stream(
            (0..5).map(|i| format!("s{i}.pdf")),
            &ConverterSelection::Auto,
        )
        .unwrap();
    let results: Vec<_> = stream.collect().await;
    assert_eq!(results.len(), 5);
    assert!(fake.max_in_flight.load(Ordering::SeqCst) <= 2);
}
