//! Error types for the mdconvert library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`MdConvertError`] (**fatal**): the caller asked for something that
//!   cannot work at all (unknown converter name, no converter for an
//!   extension, invalid configuration). Returned as `Err` and never retried.
//!
//! * [`ConversionError`] (**per file**): one document could not be
//!   converted (missing file, unsupported extension, every model in the
//!   chain failed). Stored inside [`crate::output::ConversionResult`] so one
//!   bad file never aborts a batch.
//!
//! * [`ProviderError`] (**per call**): a single remote generation request
//!   failed. The fallback chain absorbs these; only the most recent one
//!   surfaces, folded into [`ConversionError::Provider`].

use crate::output::ConversionStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by registry lookups, configuration and setup.
#[derive(Debug, Error)]
pub enum MdConvertError {
    // ── Registry errors ───────────────────────────────────────────────────
    /// No converter is registered under the requested name.
    #[error("Unknown converter: '{name}'. Available: {available:?}")]
    UnknownConverter { name: String, available: Vec<String> },

    /// No registered converter supports the file extension.
    #[error("No converter supports extension: '{extension}'")]
    NoConverterForExtension { extension: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Cache errors ──────────────────────────────────────────────────────
    /// The cache directory could not be created.
    #[error("Cache directory '{path}' is unusable: {source}")]
    CacheUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A non-fatal error for a single file.
///
/// [`ConversionError::status`] decides whether the file counts as
/// `Skipped` or `Failed`.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ConversionError {
    /// The source file does not exist.
    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    /// The selected converter does not handle this extension.
    #[error("Unsupported extension: '{extension}'")]
    Unsupported { extension: String },

    /// The backend cannot run at all (tool missing, credential missing).
    #[error("{backend} is unavailable: {hint}")]
    BackendUnavailable { backend: String, hint: String },

    /// Every attempt failed; carries the last provider-level error.
    #[error("All models failed. Last error: {detail}")]
    Provider { detail: String },

    /// A local tool or hosted parser reported failure.
    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: String, detail: String },

    /// The backend exceeded its deadline.
    #[error("{backend} timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },

    /// Reading the source or writing the output failed.
    #[error("I/O error: {detail}")]
    Io { detail: String },
}

impl ConversionError {
    /// Terminal status this error maps to.
    pub fn status(&self) -> ConversionStatus {
        match self {
            ConversionError::Unsupported { .. } => ConversionStatus::Skipped,
            _ => ConversionStatus::Failed,
        }
    }
}

/// Failure of a single provider call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The payload mime type cannot be sent to this provider.
    #[error("{provider}: cannot send '{mime_type}' payloads")]
    UnsupportedPayload { provider: String, mime_type: String },

    /// A text payload was not valid UTF-8.
    #[error("{provider}: cannot decode text payload: {detail}")]
    Decode { provider: String, detail: String },

    /// The API answered with a non-2xx status.
    #[error("{provider}: HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// Connection-level failure (DNS, reset, TLS).
    #[error("{provider}: transport error: {detail}")]
    Transport { provider: String, detail: String },

    /// The call exceeded its per-request deadline.
    #[error("{provider}: request timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// The response body was not the expected shape.
    #[error("{provider}: invalid response: {detail}")]
    InvalidResponse { provider: String, detail: String },
}

impl ProviderError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Client-side errors (bad payload, 4xx other than 429) are never
    /// transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport { .. } | ProviderError::Timeout { .. } => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Map a reqwest failure to a provider error.
    pub(crate) fn from_reqwest(provider: &str, secs: u64, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout {
                provider: provider.to_string(),
                secs,
            }
        } else if e.is_decode() {
            ProviderError::InvalidResponse {
                provider: provider.to_string(),
                detail: e.to_string(),
            }
        } else {
            ProviderError::Transport {
                provider: provider.to_string(),
                detail: e.to_string(),
            }
        }
    }
}
