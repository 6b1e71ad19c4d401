//! Eager (whole-batch) extraction entry points.
//!
//! Every document runs rasterise → recognise → extract → parse on its own.
//! Documents are fanned out under `config.concurrency`; each task carries
//! its input index and its result lands in a slot reserved for it, so the
//! [`ResultSet`] and the table always follow input order whatever order
//! tasks finish in. Use [`crate::stream::extract_stream`] to see documents
//! as they complete instead.

use crate::config::{ExtractionConfig, FailurePolicy};
use crate::error::{DocumentError, Pdf2TableError};
use crate::output::{DocumentResult, ExtractionOutput, ExtractionStats, ResultSet, TableView};
use crate::pipeline::input::{self, Document};
use crate::pipeline::llm::{self, Completion, CompletionClient};
use crate::pipeline::ocr::{self, OcrEngine, TesseractCli};
use crate::pipeline::parse;
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::prompts;
use crate::schema::FieldSchema;
use crate::table::RecordTable;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract records from in-memory documents.
///
/// # Returns
/// `Ok(ExtractionOutput)` when at least one document succeeded (under
/// [`FailurePolicy::Isolate`], failed documents are listed in
/// `output.documents` with their error). Zero documents is not an error:
/// the output is empty and `table` is [`TableView::Empty`].
///
/// # Errors
/// - [`Pdf2TableError::DocumentFailed`] on the first failure under
///   [`FailurePolicy::FailFast`]; no partial output is returned. With
///   `concurrency > 1` "first" means first to complete, not lowest index
/// - [`Pdf2TableError::AllDocumentsFailed`] when no document succeeded
/// - collaborator resolution errors (pdfium binding, LLM provider)
pub async fn extract(
    documents: Vec<Document>,
    schema: &FieldSchema,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2TableError> {
    let batch_start = Instant::now();
    let total = documents.len();
    info!("Starting extraction: {} documents, {} fields", total, schema.len());

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    if documents.is_empty() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_batch_complete(0, 0);
        }
        return Ok(ExtractionOutput {
            records: ResultSet::new(),
            documents: Vec::new(),
            table: TableView::Empty,
            stats: ExtractionStats::default(),
        });
    }

    let collaborators = Arc::new(Collaborators::resolve(config)?);
    let schema = Arc::new(schema.clone());

    let mut slots: Vec<Option<DocumentResult>> = (0..total).map(|_| None).collect();
    let mut completions = stream::iter(documents.into_iter().enumerate().map(|(index, document)| {
        run_document(
            index,
            total,
            document,
            Arc::clone(&schema),
            Arc::clone(&collaborators),
            config.clone(),
        )
    }))
    .buffer_unordered(config.concurrency);

    let mut processed = 0;
    while let Some(result) = completions.next().await {
        if config.failure_policy == FailurePolicy::FailFast {
            if let Some(ref err) = result.error {
                warn!("Aborting batch: '{}' failed ({})", result.name, err.kind());
                if let Some(ref cb) = config.progress_callback {
                    cb.on_batch_complete(total, processed);
                }
                return Err(Pdf2TableError::DocumentFailed {
                    document: result.name.clone(),
                    source: err.clone(),
                });
            }
        }
        if result.is_success() {
            processed += 1;
        }
        let index = result.index;
        slots[index] = Some(result);
    }
    drop(completions);

    let results: Vec<DocumentResult> = slots.into_iter().flatten().collect();

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, processed);
    }

    if processed == 0 {
        let first_error = results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(Pdf2TableError::AllDocumentsFailed { total, first_error });
    }

    let output = aggregate(results, batch_start);
    info!(
        "Extraction complete: {}/{} documents, {} records, {}ms",
        output.stats.processed_documents,
        output.stats.total_documents,
        output.stats.total_records,
        output.stats.total_duration_ms
    );
    Ok(output)
}

/// Load paths and/or URLs, then [`extract`].
///
/// Inputs are loaded before any processing starts, so a missing or
/// unreadable input (or a failed download) fails the call without spending
/// model calls on the others. Content that turns out not to be a PDF is a
/// per-document failure and follows the failure policy.
pub async fn extract_inputs<S: AsRef<str>>(
    inputs: &[S],
    schema: &FieldSchema,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2TableError> {
    let documents = input::load_all(inputs, config.download_timeout_secs).await?;
    extract(documents, schema, config).await
}

/// Extract and write the table as CSV to `output_path`.
///
/// The file is written atomically. An empty run writes an empty file.
///
/// # Errors
/// Everything [`extract`] returns, plus [`Pdf2TableError::TableConstruction`]
/// when the records cannot be tabulated (the CSV is not written).
pub async fn extract_to_csv(
    documents: Vec<Document>,
    schema: &FieldSchema,
    output_path: impl AsRef<Path>,
    include_source: bool,
    config: &ExtractionConfig,
) -> Result<ExtractionStats, Pdf2TableError> {
    let output = extract(documents, schema, config).await?;
    let path = output_path.as_ref();

    match &output.table {
        TableView::Table(table) => table.write_csv(path, include_source)?,
        TableView::Empty => RecordTable::default().write_csv(path, include_source)?,
        TableView::Raw { message, .. } => {
            return Err(Pdf2TableError::TableConstruction {
                detail: message.clone(),
            })
        }
    }

    Ok(output.stats)
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    documents: Vec<Document>,
    schema: &FieldSchema,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, Pdf2TableError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2TableError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(documents, schema, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// The three external services a run talks to.
pub(crate) struct Collaborators {
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub ocr: Arc<dyn OcrEngine>,
    pub client: Arc<dyn CompletionClient>,
}

impl Collaborators {
    /// Use injected collaborators, building defaults for the rest.
    ///
    /// The default rasteriser is probed here so a missing pdfium library
    /// fails the run once instead of failing every document.
    pub(crate) fn resolve(config: &ExtractionConfig) -> Result<Self, Pdf2TableError> {
        let rasterizer: Arc<dyn PageRasterizer> = match config.rasterizer {
            Some(ref r) => Arc::clone(r),
            None => {
                let r = PdfiumRasterizer::from_config(config);
                r.probe()?;
                Arc::new(r)
            }
        };

        let ocr: Arc<dyn OcrEngine> = match config.ocr_engine {
            Some(ref e) => Arc::clone(e),
            None => Arc::new(TesseractCli::from_config(config)),
        };

        let client = llm::resolve_client(config)?;

        debug!("Collaborators resolved: OCR engine '{}'", ocr.name());
        Ok(Self {
            rasterizer,
            ocr,
            client,
        })
    }
}

/// Process one document and fire its progress events.
pub(crate) async fn run_document(
    index: usize,
    total: usize,
    document: Document,
    schema: Arc<FieldSchema>,
    collaborators: Arc<Collaborators>,
    config: ExtractionConfig,
) -> DocumentResult {
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(index, document.name(), total);
    }

    let result = process_document(index, &document, &schema, &collaborators, &config).await;

    if let Some(ref cb) = config.progress_callback {
        match result.error {
            None => cb.on_document_complete(index, &result.name, total, result.records.len()),
            Some(ref e) => cb.on_document_error(index, &result.name, total, e.to_string()),
        }
    }
    result
}

/// Run all stages for one document. Never fails: errors land in `result.error`.
async fn process_document(
    index: usize,
    document: &Document,
    schema: &FieldSchema,
    collaborators: &Collaborators,
    config: &ExtractionConfig,
) -> DocumentResult {
    let start = Instant::now();
    let mut result = DocumentResult {
        index,
        name: document.name().to_string(),
        ..Default::default()
    };

    if let Err(e) = run_stages(document, schema, collaborators, config, &mut result).await {
        warn!("{}: {}", result.name, e);
        result.records.clear();
        result.error = Some(e);
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

async fn run_stages(
    document: &Document,
    schema: &FieldSchema,
    collaborators: &Collaborators,
    config: &ExtractionConfig,
    result: &mut DocumentResult,
) -> Result<(), DocumentError> {
    let name = document.name();

    document.check_header()?;
    let pages = collaborators.rasterizer.rasterize(document).await?;
    result.pages = pages.len();
    debug!("{}: rendered {} pages", name, pages.len());

    let text = ocr::recognize_pages(&*collaborators.ocr, &pages).await?;
    result.text_chars = text.chars().count();
    drop(pages);

    let prompt = prompts::extraction_prompt(&text, schema);
    let (first, retries) =
        llm::request_completion(&*collaborators.client, name, &prompt, config).await?;
    account(result, &first, retries);

    let records = match parse::parse_records(&first.content) {
        Ok(records) => records,
        Err(DocumentError::ResponseParse { detail, .. }) if config.corrective_retry => {
            warn!("{}: response is not valid JSON ({}), re-prompting once", name, detail);
            result.corrective_retry_used = true;

            let retry = prompts::corrective_prompt(&prompt, &first.content, &detail);
            let (second, retries) =
                llm::request_completion(&*collaborators.client, name, &retry, config).await?;
            account(result, &second, retries);
            parse::parse_records(&second.content)?
        }
        Err(e) => return Err(e),
    };

    info!("{}: {} records", name, records.len());
    result.records = records;
    Ok(())
}

fn account(result: &mut DocumentResult, completion: &Completion, retries: u32) {
    result.input_tokens += completion.input_tokens;
    result.output_tokens += completion.output_tokens;
    result.retries += retries;
}

/// Merge per-document results (already in input order) into the final output.
fn aggregate(results: Vec<DocumentResult>, batch_start: Instant) -> ExtractionOutput {
    let mut records = ResultSet::new();
    for r in results.iter().filter(|r| r.is_success()) {
        records.extend_from_document(&r.name, r.records.iter().cloned());
    }

    let table = if records.is_empty() {
        TableView::Empty
    } else {
        match RecordTable::from_records(records.as_slice()) {
            Ok(table) => TableView::Table(table),
            Err(e) => {
                warn!("Falling back to raw records: {}", e);
                TableView::Raw {
                    records: records.as_slice().to_vec(),
                    message: e.to_string(),
                }
            }
        }
    };

    let stats = ExtractionStats {
        total_documents: results.len(),
        processed_documents: results.iter().filter(|r| r.is_success()).count(),
        failed_documents: results.iter().filter(|r| !r.is_success()).count(),
        total_pages: results.iter().map(|r| r.pages).sum(),
        total_records: records.len(),
        total_input_tokens: results.iter().map(|r| r.input_tokens).sum(),
        total_output_tokens: results.iter().map(|r| r.output_tokens).sum(),
        corrective_retries: results.iter().filter(|r| r.corrective_retry_used).count(),
        total_duration_ms: batch_start.elapsed().as_millis() as u64,
    };

    ExtractionOutput {
        records,
        documents: results,
        table,
        stats,
    }
}
