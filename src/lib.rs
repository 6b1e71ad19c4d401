//! # edgequake-pdf2table
//!
//! Extract structured field data (invoice dates, amounts, vendors, …) from
//! scanned PDF documents into a table.
//!
//! Scanned invoices and receipts carry no text layer, so each page is
//! rasterised, read with OCR, and the recognised text is handed to a
//! language model together with a caller-defined field schema. The model
//! answers with JSON records, which are validated, merged across documents
//! and tabulated.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF (bytes / path / URL)
//!  │
//!  ├─ 1. Input   load into memory
//!  ├─ 2. Render  rasterise pages via pdfium at 300 DPI (spawn_blocking) → JPEG
//!  ├─ 3. OCR     tesseract per page, texts joined with '\n'
//!  ├─ 4. LLM     one templated prompt per document, temperature 0
//!  ├─ 5. Parse   strict JSON → records (one corrective re-prompt on failure)
//!  └─ 6. Table   union of fields, one row per record → CSV
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2table::{extract_inputs, ExtractionConfig, FieldSchema, TableView};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let schema = FieldSchema::parse(r#"{"DATE": "Invoice date", "AMOUNT": "Total amount"}"#)?;
//!
//!     let output = extract_inputs(&["invoice.pdf"], &schema, &config).await?;
//!     if let TableView::Table(table) = &output.table {
//!         std::io::Write::write_all(&mut std::io::stdout(), &table.to_csv_bytes(false)?)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## External Requirements
//!
//! - a pdfium shared library (`PDFIUM_LIB_PATH`, or installed system-wide)
//! - the `tesseract` executable on `PATH` (or `tesseract_path` in the config)
//! - an API key for the chosen LLM provider
//!
//! Each of the three can be replaced by injecting a [`PageRasterizer`],
//! [`OcrEngine`] or [`CompletionClient`] through [`ExtractionConfigBuilder`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2table` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;
pub mod stream;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, FailurePolicy, DEFAULT_CSV_FILENAME};
pub use error::{DocumentError, Pdf2TableError};
pub use extract::{extract, extract_inputs, extract_sync, extract_to_csv};
pub use output::{
    DocumentResult, ExtractedRecord, ExtractionOutput, ExtractionStats, ResultSet, TableView,
};
pub use pipeline::input::Document;
pub use pipeline::llm::{ClientError, Completion, CompletionClient, CompletionSettings, ProviderClient};
pub use pipeline::ocr::{OcrEngine, TesseractCli};
pub use pipeline::render::{PageImage, PageRasterizer, PdfiumRasterizer};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::FieldSchema;
pub use stream::{extract_stream, DocumentStream};
pub use table::RecordTable;
