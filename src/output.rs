//! Result types produced by converters and the orchestrator.

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Terminal status of one conversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Success,
    Failed,
    Skipped,
    Partial,
}

/// Outcome of converting one source file.
///
/// Built once through [`ConversionResult::success`] or
/// [`ConversionResult::from_error`] and never mutated afterwards.
/// `error_message` is present exactly when `status` is not `Success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub source_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub status: ConversionStatus,
    /// Backend identifier, e.g. `"pandoc"` or `"llm/gemini-1.5-flash"`.
    pub tool_used: String,
    /// Produced Markdown; empty unless `status == Success`.
    pub content: String,
    /// Heuristic 0–100, advisory only.
    pub quality_score: u8,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ConversionResult {
    /// A successful conversion.
    pub fn success(
        source_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        tool_used: impl Into<String>,
        content: String,
        quality_score: u8,
        duration: Duration,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            output_path: Some(output_path.into()),
            status: ConversionStatus::Success,
            tool_used: tool_used.into(),
            content,
            quality_score: quality_score.min(100),
            duration_seconds: duration.as_secs_f64(),
            error_message: None,
            metadata: BTreeMap::new(),
        }
    }

    /// A failed or skipped conversion; the status comes from the error kind.
    pub fn from_error(
        source_path: impl Into<PathBuf>,
        tool_used: impl Into<String>,
        error: &ConversionError,
        duration: Duration,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            output_path: None,
            status: error.status(),
            tool_used: tool_used.into(),
            content: String::new(),
            quality_score: 0,
            duration_seconds: duration.as_secs_f64(),
            error_message: Some(error.to_string()),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry at construction time.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ConversionStatus::Success
    }

    pub fn source(&self) -> &Path {
        &self.source_path
    }
}

/// Aggregate counts over a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub partial: usize,
    /// Mean quality over successful files; 0 when none succeeded.
    pub mean_quality: f64,
    /// Sum of per-file durations (not wall-clock).
    pub total_duration_seconds: f64,
}

impl BatchSummary {
    pub fn from_results(results: &[ConversionResult]) -> Self {
        let mut summary = BatchSummary {
            total: results.len(),
            ..Default::default()
        };
        let mut quality_sum = 0u64;
        for r in results {
            match r.status {
                ConversionStatus::Success => {
                    summary.succeeded += 1;
                    quality_sum += u64::from(r.quality_score);
                }
                ConversionStatus::Failed => summary.failed += 1,
                ConversionStatus::Skipped => summary.skipped += 1,
                ConversionStatus::Partial => summary.partial += 1,
            }
            summary.total_duration_seconds += r.duration_seconds;
        }
        if summary.succeeded > 0 {
            summary.mean_quality = quality_sum as f64 / summary.succeeded as f64;
        }
        summary
    }
}

/// Write `contents` to `path` through a sibling temp file and a rename,
/// creating parent directories as needed.
///
/// Readers see either the old file or the new one, never a partial write.
/// Temp names are unique per call so concurrent writers never share one.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    static SEQ: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = tokio::fs::write(&tmp_path, contents).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}
