//! Error types for the labelscan library.
//!
//! A single fatal error type, [`LabelScanError`], covers every stage. The
//! pure stages (rasterisation, diffing) surface input problems synchronously
//! and never retry. The model-backed stages (compliance scan, difference
//! report) propagate service and parse failures upward untouched once the
//! bounded per-call retry in [`crate::pipeline::llm`] is exhausted.
//!
//! There is no partial-success error: a compliance scan whose
//! third batch fails returns the batch error, not the first two batches.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the labelscan library.
#[derive(Debug, Error)]
pub enum LabelScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The document is neither a raster image nor a paginated document.
    #[error("Unsupported document format '{mime_type}': {detail}\nExpected a PDF or a PNG/JPEG image.")]
    UnsupportedFormat { mime_type: String, detail: String },

    /// A required file or field was not supplied.
    #[error("Missing input: {what}")]
    MissingInput { what: String },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document errors ───────────────────────────────────────────────────
    /// The document claims a supported format but its bytes cannot be decoded.
    #[error("Document is corrupt: {detail}")]
    CorruptDocument { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// pdfium returned an error while rendering the first page.
    #[error("Rasterisation failed: {detail}")]
    RasterisationFailed { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Paginated documents need libpdfium at runtime. You can:\n\
  • Place libpdfium next to the executable or in the working directory.\n\
  • Install it system-wide.\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The external model call failed (network, quota, server error).
    #[error("External model call failed after {attempts} attempt(s): {detail}")]
    ExternalServiceError { attempts: u32, detail: String },

    /// The external model call did not answer in time.
    #[error("Model call timed out after {elapsed_ms}ms")]
    ApiTimeout { elapsed_ms: u64 },

    /// The model answered, but its structured payload could not be parsed.
    #[error("Malformed structured response: {detail}\nPayload starts with: {excerpt:?}")]
    MalformedStructuredResponse { detail: String, excerpt: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LabelScanError {
    /// Whether repeating the same model call could plausibly succeed.
    ///
    /// Only transport-level failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LabelScanError::ExternalServiceError { .. } | LabelScanError::ApiTimeout { .. }
        )
    }
}
