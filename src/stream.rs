//! Streaming extraction API: emit documents as they complete.
//!
//! Unlike the eager [`crate::extract::extract`], which returns only after
//! every document finished, [`extract_stream`] yields each
//! [`DocumentResult`] as soon as its document is done. With
//! `concurrency > 1` results arrive in completion order; sort by `index`
//! if order matters.
//!
//! The failure policy does not apply here: failed documents are yielded
//! with `error` set and the caller decides whether to stop polling.

use crate::config::ExtractionConfig;
use crate::error::Pdf2TableError;
use crate::extract::{run_document, Collaborators};
use crate::output::DocumentResult;
use crate::pipeline::input::Document;
use crate::schema::FieldSchema;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-document results.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocumentResult> + Send>>;

/// Extract records, streaming one [`DocumentResult`] per document.
///
/// # Returns
/// - `Ok(DocumentStream)`: yields exactly one item per input document
/// - `Err(Pdf2TableError)`: a collaborator could not be resolved
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2table::{extract_stream, Document, ExtractionConfig, FieldSchema};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let doc = Document::from_path("invoice.pdf").await?;
/// let config = ExtractionConfig::default();
/// let mut stream = extract_stream(vec![doc], &FieldSchema::default(), &config)?;
/// while let Some(result) = stream.next().await {
///     match result.error {
///         None => println!("{}: {} records", result.name, result.records.len()),
///         Some(e) => eprintln!("{}: {e}", result.name),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(
    documents: Vec<Document>,
    schema: &FieldSchema,
    config: &ExtractionConfig,
) -> Result<DocumentStream, Pdf2TableError> {
    let total = documents.len();
    info!("Starting streaming extraction: {} documents", total);

    if documents.is_empty() {
        return Ok(Box::pin(stream::empty::<DocumentResult>()));
    }

    let collaborators = Arc::new(Collaborators::resolve(config)?);
    let schema = Arc::new(schema.clone());
    let concurrency = config.concurrency;
    let config = config.clone();

    let s = stream::iter(documents.into_iter().enumerate().map(move |(index, document)| {
        run_document(
            index,
            total,
            document,
            Arc::clone(&schema),
            Arc::clone(&collaborators),
            config.clone(),
        )
    }))
    .buffer_unordered(concurrency);

    Ok(Box::pin(s))
}
