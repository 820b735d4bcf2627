//! Progress-callback trait for batch conversion events.
//!
//! Pass an [`Arc<dyn BatchProgressCallback>`] to
//! [`crate::orchestrator::Orchestrator::with_progress`] to receive events as
//! files start and finish. Files run concurrently, so the per-file methods
//! may be called from several tasks at once and can arrive in any order.
//!
//! # Example
//!
//! ```rust
//! use mdconvert::{BatchProgressCallback, ConversionResult};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl BatchProgressCallback for Counter {
//!     fn on_file_complete(&self, result: &ConversionResult) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {} → {:?}", result.source_path.display(), result.status);
//!     }
//! }
//! ```

use crate::output::{BatchSummary, ConversionResult};
use std::path::Path;
use std::sync::Arc;

/// Receives batch events. Every method defaults to a no-op.
///
/// Implementations must be `Send + Sync` and protect shared mutable state
/// with atomics or locks.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any file is started.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file is admitted into a conversion slot.
    fn on_file_start(&self, source: &Path) {
        let _ = source;
    }

    /// Called with every terminal result, whatever its status.
    fn on_file_complete(&self, result: &ConversionResult) {
        let _ = result;
    }

    /// Called once after every file has a result.
    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Shared callback handle as stored by the orchestrator.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
