//! Error types for the edgequake-pdf2table library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2TableError`]: **Fatal**: the extraction run cannot proceed or
//!   must be aborted (bad input file, invalid schema, provider not
//!   configured, or a document failure under [`crate::FailurePolicy::FailFast`]).
//!   Returned as `Err(Pdf2TableError)` from the top-level `extract*` functions.
//!
//! * [`DocumentError`]: **Per-document**: one document could not be turned
//!   into records (corrupt PDF, OCR failure, model error, unparseable
//!   response). Stored inside [`crate::output::DocumentResult`] so callers
//!   see which document failed and why while the rest of the batch survives.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2table library.
#[derive(Debug, Error)]
pub enum Pdf2TableError {
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

    // ── Schema / config errors ────────────────────────────────────────────
    /// The field schema string could not be understood.
    #[error("Invalid field schema: {0}")]
    InvalidSchema(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Collaborator errors ───────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or --pdfium-lib) to point at a copy\n\
from https://github.com/bblanchon/pdfium-binaries/releases, or install it\n\
system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Batch errors ──────────────────────────────────────────────────────
    /// A document failed while the batch runs in fail-fast mode.
    #[error("Document '{document}' failed: {source}")]
    DocumentFailed {
        document: String,
        #[source]
        source: DocumentError,
    },

    /// Every document in the batch failed; there is nothing to tabulate.
    #[error("All {total} documents failed.\nFirst error: {first_error}")]
    AllDocumentsFailed { total: usize, first_error: String },

    /// Accumulated records cannot be normalised into a rectangular table.
    ///
    /// Caught at the aggregation boundary and turned into
    /// [`crate::output::TableView::Raw`]; surfaced directly only by
    /// [`crate::table::RecordTable::from_records`].
    #[error("Cannot build table: {detail}")]
    TableConstruction { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output CSV file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialisation failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// An error confined to a single document.
///
/// Stored alongside [`crate::output::DocumentResult`] when a document fails.
/// Under [`crate::FailurePolicy::Isolate`] the batch continues unless
/// every document fails.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// PDF is corrupt, encrypted, or otherwise unreadable by pdfium.
    #[error("unreadable PDF: {detail}")]
    DocumentFormat { detail: String },

    /// A page could not be rendered or JPEG-encoded.
    #[error("page {page}: rasterisation failed: {detail}")]
    Rasterization { page: usize, detail: String },

    /// A page image failed to decode, or the OCR engine failed.
    #[error("{}OCR failed: {detail}", page_prefix(.page))]
    Ocr { page: Option<usize>, detail: String },

    /// The language-model call failed (network, auth, rate limit, timeout).
    #[error("model call failed after {attempts} attempt(s): {detail}")]
    ModelService { attempts: u32, detail: String },

    /// The model output is not valid JSON, or not an object / array of objects.
    #[error("model response is not a JSON object or array of objects: {detail}")]
    ResponseParse { detail: String, response: String },
}

fn page_prefix(page: &Option<usize>) -> String {
    page.map(|p| format!("page {p}: ")).unwrap_or_default()
}

impl DocumentError {
    /// Short stable label for the error class, used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::DocumentFormat { .. } => "document_format",
            DocumentError::Rasterization { .. } => "rasterization",
            DocumentError::Ocr { .. } => "ocr",
            DocumentError::ModelService { .. } => "model_service",
            DocumentError::ResponseParse { .. } => "response_parse",
        }
    }
}
