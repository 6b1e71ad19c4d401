//! Progress-callback trait for per-document extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a batch. Callers can forward them
//! to a terminal progress bar, a channel or a log without the library
//! knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2table::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     records: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, _index: usize, name: &str, _total: usize, records: usize) {
//!         self.records.fetch_add(records, Ordering::SeqCst);
//!         eprintln!("{name}: {records} records");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { records: AtomicUsize::new(0) });
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extraction pipeline as it processes each document.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the
/// per-document methods are called from concurrently running tasks, in
/// completion order. `index` is always the document's zero-based position
/// in the input batch.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before any document is processed.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document enters the pipeline.
    fn on_document_start(&self, index: usize, name: &str, total_documents: usize) {
        let _ = (index, name, total_documents);
    }

    /// Called when a document produced its records.
    ///
    /// `records` may be zero: the model found nothing matching the schema.
    fn on_document_complete(&self, index: usize, name: &str, total_documents: usize, records: usize) {
        let _ = (index, name, total_documents, records);
    }

    /// Called when a document failed at any stage.
    fn on_document_error(&self, index: usize, name: &str, total_documents: usize, error: String) {
        let _ = (index, name, total_documents, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
