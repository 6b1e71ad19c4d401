//! Pipeline stages for PDF-to-table extraction.
//!
//! Each submodule implements one transformation step and can be tested
//! without the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr ──▶ llm ──▶ parse
//! (bytes/path/URL) (pdfium→JPEG) (tesseract) (model) (JSON records)
//! ```
//!
//! 1. [`input`]: load caller-supplied bytes, paths or URLs as in-memory documents
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]: JPEG codec shared by the rasteriser and the OCR stage
//! 4. [`ocr`]: recognise page text and join it into one string per document
//! 5. [`llm`]: send the extraction prompt; the only stage with network I/O
//! 6. [`parse`]: strict JSON parsing of the model answer into records

pub mod encode;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod parse;
pub mod render;
