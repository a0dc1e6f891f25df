//! Error types for the edgequake-fininsight library.
//!
//! Four error types, one per failure scope:
//!
//! * [`AnalysisError`] — **Fatal** for the run: the input cannot be read,
//!   is not a PDF, cannot be parsed, or the configuration is invalid.
//!   Report and output-write failures also use this type, but they are
//!   raised only by the write helpers, after the analysis already returned.
//!
//! * [`ApiError`] — one failed model call (network, timeout, HTTP status,
//!   malformed JSON). Never propagated out of `analyze`; it is converted
//!   into a [`SectionError`] on the affected insight section.
//!
//! * [`MappingError`] — a table header does not carry the columns the
//!   ratio calculator needs. The table is skipped with a warning.
//!
//! * [`SectionError`] — serialisable record of a degraded section, stored in
//!   [`crate::output::InsightSection`] so callers can show it to the user.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-fininsight library.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
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

    /// The input is larger than `max_input_bytes`.
    #[error("Input '{input}' is {size} bytes, over the {limit}-byte limit")]
    InputTooLarge {
        input: String,
        size: u64,
        limit: u64,
    },

    /// The bytes were read, but they are not a PDF.
    #[error("Input is not a valid PDF: '{input}'\nFirst bytes: {magic:?}")]
    NotAPdf { input: String, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{input}' is corrupt: {detail}")]
    CorruptPdf { input: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{input}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { input: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{input}'")]
    WrongPassword { input: String },

    /// Text extraction failed on a page.
    #[error("Text extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Text extraction needs the pdfium shared library. You can:\n\
  • Install libpdfium system-wide, or\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir-containing-libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// The report assembler could not produce a document.
    #[error("Report assembly failed: {0}")]
    ReportFailed(String),

    /// The ratio chart could not be rendered or encoded.
    #[error("Chart rendering failed: {0}")]
    ChartFailed(String),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failed call to the insight model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// No endpoint and no provider could be resolved.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    NotConfigured { provider: String, hint: String },

    /// Connection, DNS or TLS failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The call did not finish within `api_timeout_secs`.
    #[error("Model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// HTTP 401/403 — retry will not help.
    #[error("Authentication rejected by '{endpoint}' (HTTP {status})")]
    Auth { endpoint: String, status: u16 },

    /// Any other non-success HTTP status.
    #[error("HTTP {status} from '{endpoint}': {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Response body did not have the expected shape.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Error surfaced by an edgequake-llm provider.
    #[error("Provider error: {0}")]
    Provider(String),
}

impl ApiError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout { .. } | ApiError::Provider(_) => true,
            ApiError::Http { status, .. } => *status == 429 || *status >= 500,
            ApiError::NotConfigured { .. }
            | ApiError::Auth { .. }
            | ApiError::MalformedResponse(_) => false,
        }
    }
}

/// A table header that cannot be mapped to the ratio inputs.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MappingError {
    /// No header cell matched any alias of `field`.
    #[error("no column for '{field}' in header {header:?}")]
    MissingField { field: String, header: Vec<String> },

    /// Positional layout needs more columns than the table has.
    #[error("table has {found} columns, positional layout needs {needed}")]
    TooFewColumns { needed: usize, found: usize },

    /// The table has no rows at all.
    #[error("table is empty")]
    EmptyTable,
}

/// A non-fatal error for one insight section.
///
/// Stored on [`crate::output::InsightSection`] when its model call failed.
/// The rest of the analysis is unaffected.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum SectionError {
    /// Model call failed after retries.
    #[error("{section}: model call failed after {retries} retries: {detail}")]
    LlmFailed {
        section: String,
        retries: u32,
        detail: String,
    },

    /// Model call timed out.
    #[error("{section}: model call timed out after {secs}s")]
    Timeout { section: String, secs: u64 },

    /// No report text was extracted, so there was nothing to send.
    #[error("{section}: skipped, no report text was extracted")]
    NoText { section: String },
}
