//! CLI binary for edgequake-pdf2table.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs the batch and writes the table as CSV.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2table::{
    extract_inputs, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback, FailurePolicy,
    FieldSchema, ProgressCallback, TableView, DEFAULT_CSV_FILENAME,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One progress-bar step per document, with a log line as each finishes.
/// Documents may complete out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:36.green/238}] {pos:>3}/{len} documents  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
    }

    fn on_document_start(&self, index: usize, name: &str, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, index: usize, name: &str, total: usize, records: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{records} records")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, name: &str, total: usize, error: String) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = match error.char_indices().nth(80) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error,
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_documents.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} documents processed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents processed  ({} failed)",
                if failed == total_documents {
                    red("✘")
                } else {
                    yellow("⚠")
                },
                bold(&success_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract the default invoice fields (DATE, ITEM, AMOUNT, VENDOR)
  pdf2table invoice1.pdf invoice2.pdf

  # Custom fields, written to a chosen file
  pdf2table --schema '{"DATE": "Invoice date", "TOTAL": "Grand total"}' *.pdf -o totals.csv

  # Dict-style schema from a file, CSV to stdout with a source column
  pdf2table --schema-file fields.txt --source-column -o - scans/*.pdf

  # Four documents at a time, abort on the first failure
  pdf2table -c 4 --fail-fast receipts/*.pdf

  # Full structured output (records, per-document results, stats)
  pdf2table --json invoice.pdf > output.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

REQUIREMENTS:
  pdfium     https://github.com/bblanchon/pdfium-binaries/releases
  tesseract  apt install tesseract-ocr  /  brew install tesseract
"#;

/// Extract structured fields from scanned PDFs into a CSV table.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2table",
    version,
    about = "Extract structured fields from scanned PDFs into a CSV table",
    long_about = "Render each page of the given PDFs, read it with Tesseract OCR, and ask a \
language model to extract the requested fields as JSON. All records are merged into one table \
and written as CSV.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Field schema: JSON object or {'FIELD': 'description',} mapping.
    #[arg(long, env = "PDF2TABLE_SCHEMA", conflicts_with = "schema_file")]
    schema: Option<String>,

    /// Read the field schema from a file.
    #[arg(long, env = "PDF2TABLE_SCHEMA_FILE")]
    schema_file: Option<PathBuf>,

    /// CSV output file; `-` writes to stdout.
    #[arg(short, long, env = "PDF2TABLE_OUTPUT", default_value = DEFAULT_CSV_FILENAME)]
    output: PathBuf,

    /// Prepend a `source` column naming each row's document.
    #[arg(long, env = "PDF2TABLE_SOURCE_COLUMN")]
    source_column: bool,

    /// Print the full structured output as JSON to stdout instead of CSV.
    #[arg(long, env = "PDF2TABLE_JSON")]
    json: bool,

    /// Abort the batch on the first failing document.
    #[arg(long, env = "PDF2TABLE_FAIL_FAST")]
    fail_fast: bool,

    /// Number of documents processed concurrently.
    #[arg(short, long, env = "PDF2TABLE_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDF2TABLE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Tesseract language code(s), e.g. eng or eng+deu.
    #[arg(long, env = "PDF2TABLE_LANG", default_value = "eng")]
    lang: String,

    /// Tesseract executable.
    #[arg(long, env = "PDF2TABLE_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// pdfium shared library (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2TABLE_PASSWORD")]
    password: Option<String>,

    /// Max LLM output tokens per document.
    #[arg(long, env = "PDF2TABLE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Retries per document on LLM transport failure.
    #[arg(long, env = "PDF2TABLE_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Do not re-prompt when the model answer is not valid JSON.
    #[arg(long, env = "PDF2TABLE_NO_CORRECTIVE_RETRY")]
    no_corrective_retry: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2TABLE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TABLE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TABLE_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2TABLE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF2TABLE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

impl Cli {
    fn to_stdout(&self) -> bool {
        self.output.as_os_str() == "-"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would interleave with the bar, so it gets errors only.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let schema = load_schema(&cli).await?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract_inputs(&cli.inputs, &schema, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    match &output.table {
        TableView::Table(table) => {
            if cli.to_stdout() {
                let bytes = table.to_csv_bytes(cli.source_column)?;
                io::stdout()
                    .lock()
                    .write_all(&bytes)
                    .context("Failed to write to stdout")?;
            } else {
                table
                    .write_csv(&cli.output, cli.source_column)
                    .with_context(|| format!("Failed to write {}", cli.output.display()))?;
            }
        }
        TableView::Raw { records, message } => {
            // No CSV possible: show the records as they came back.
            eprintln!("{} {}", yellow("⚠"), message);
            eprintln!("{}", dim("Raw extracted records:"));
            let json =
                serde_json::to_string_pretty(records).context("Failed to serialise records")?;
            println!("{json}");
        }
        TableView::Empty => {
            if !cli.quiet {
                eprintln!("{} no records extracted", yellow("⚠"));
            }
        }
    }

    if !cli.quiet {
        print_summary(&cli, &output);
    }
    Ok(())
}

fn print_summary(cli: &Cli, output: &ExtractionOutput) {
    let stats = &output.stats;
    let target = match output.table {
        TableView::Table(_) if !cli.to_stdout() => format!("  →  {}", bold(&cli.output.display().to_string())),
        _ => String::new(),
    };
    eprintln!(
        "{}  {} records from {}/{} documents  {}ms{}",
        if stats.failed_documents == 0 {
            green("✔")
        } else {
            yellow("⚠")
        },
        stats.total_records,
        stats.processed_documents,
        stats.total_documents,
        stats.total_duration_ms,
        target,
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
    for doc in output.documents.iter().filter(|d| !d.is_success()) {
        if let Some(ref e) = doc.error {
            eprintln!("   {} {}: {}", red("✗"), doc.name, e);
        }
    }
}

/// Schema from `--schema`, `--schema-file`, or the default invoice fields.
async fn load_schema(cli: &Cli) -> Result<FieldSchema> {
    if let Some(ref s) = cli.schema {
        return FieldSchema::parse(s).context("Invalid --schema");
    }
    if let Some(ref path) = cli.schema_file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read schema from {:?}", path))?;
        return FieldSchema::parse(&text)
            .with_context(|| format!("Invalid schema in {:?}", path));
    }
    Ok(FieldSchema::default())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .corrective_retry(!cli.no_corrective_retry)
        .failure_policy(if cli.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::Isolate
        })
        .ocr_language(cli.lang.clone())
        .tesseract_path(cli.tesseract.clone())
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["pdf2table", "a.pdf", "b.pdf"]);
        assert_eq!(cli.inputs, ["a.pdf", "b.pdf"]);
        assert_eq!(cli.output, PathBuf::from("receipts_data.csv"));
        assert_eq!(cli.dpi, 300);
        assert_eq!(cli.concurrency, 1);
        assert!(!cli.to_stdout());

        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
        assert!(config.corrective_retry);
        assert_eq!(config.dpi(), 300);
    }

    #[test]
    fn cli_flags_map_to_config() {
        let cli = Cli::parse_from([
            "pdf2table",
            "--fail-fast",
            "--no-corrective-retry",
            "-c",
            "4",
            "--lang",
            "eng+deu",
            "-o",
            "-",
            "a.pdf",
        ]);
        assert!(cli.to_stdout());
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert!(!config.corrective_retry);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.ocr_language, "eng+deu");
    }

    #[test]
    fn schema_and_schema_file_conflict() {
        let res = Cli::try_parse_from([
            "pdf2table",
            "--schema",
            "{}",
            "--schema-file",
            "f.txt",
            "a.pdf",
        ]);
        assert!(res.is_err());
    }
}
