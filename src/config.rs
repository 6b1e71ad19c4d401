//! Configuration types for structured field extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The rasteriser, OCR engine and
//! language model can be injected as trait objects; when they are not, they
//! are resolved from the remaining fields and the environment at the start
//! of a run.

use crate::error::Pdf2TableError;
use crate::pipeline::llm::CompletionClient;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::PageRasterizer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// PDF user space is 72 units per inch; rendering at 300 DPI needs 300/72.
pub const DEFAULT_SCALE: f32 = 300.0 / 72.0;

/// Default CSV export filename.
pub const DEFAULT_CSV_FILENAME: &str = "receipts_data.csv";

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2table::{ExtractionConfig, FailurePolicy};
///
/// let config = ExtractionConfig::builder()
///     .dpi(300)
///     .concurrency(4)
///     .model("gpt-4.1-nano")
///     .failure_policy(FailurePolicy::Isolate)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Page render scale relative to PDF user space. Default: 300/72 ≈ 4.1667.
    ///
    /// Tesseract is tuned for roughly 300 DPI input; much lower and small
    /// print stops being recognised.
    pub scale: f32,

    /// Upper bound on either rendered dimension in pixels. Default: 6000.
    ///
    /// A letter page at 300 DPI is 2550 × 3300 px. The cap only bites for
    /// oversized pages (posters, engineering drawings).
    pub max_rendered_pixels: u32,

    /// JPEG quality for the page images handed to OCR. Default: 75, the
    /// encoder's own default.
    pub jpeg_quality: u8,

    /// Number of documents processed concurrently. Default: 1 (sequential).
    ///
    /// Raise it to overlap model latency across documents; keep it within
    /// the provider's rate limit. Output order never depends on it.
    pub concurrency: usize,

    /// LLM model identifier. If None, uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `client`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed completion client. Takes precedence over `provider_name`.
    pub client: Option<Arc<dyn CompletionClient>>,

    /// Pre-constructed OCR engine. Defaults to [`crate::pipeline::ocr::TesseractCli`].
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Pre-constructed rasteriser. Defaults to [`crate::pipeline::render::PdfiumRasterizer`].
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// Sampling temperature. Default: 0.0 (greedy, deterministic).
    pub temperature: f32,

    /// Maximum tokens the model may generate per document. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed model call (network, rate limit). Default: 0.
    ///
    /// Zero means one attempt per document.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Re-prompt once when the model answer is not valid JSON. Default: true.
    pub corrective_retry: bool,

    /// What a failing document does to the rest of the batch. Default: Isolate.
    pub failure_policy: FailurePolicy,

    /// Tesseract language code(s), e.g. "eng" or "eng+deu". Default: "eng".
    pub ocr_language: String,

    /// Path or name of the tesseract executable. Default: "tesseract".
    pub tesseract_path: PathBuf,

    /// Explicit pdfium shared library. Falls back to `PDFIUM_LIB_PATH`, then
    /// the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-model-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            max_rendered_pixels: 6000,
            jpeg_quality: 75,
            concurrency: 1,
            model: None,
            provider_name: None,
            client: None,
            ocr_engine: None,
            rasterizer: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            corrective_retry: true,
            failure_policy: FailurePolicy::default(),
            ocr_language: "eng".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
            pdfium_lib_path: None,
            password: None,
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("scale", &self.scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("client", &self.client.as_ref().map(|_| "<dyn CompletionClient>"))
            .field("ocr_engine", &self.ocr_engine.as_ref().map(|e| e.name().to_string()))
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn PageRasterizer>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("corrective_retry", &self.corrective_retry)
            .field("failure_policy", &self.failure_policy)
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_path", &self.tesseract_path)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective render resolution in dots per inch.
    pub fn dpi(&self) -> u32 {
        (self.scale * 72.0).round() as u32
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    /// Set the render scale from a target DPI (72–600).
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.scale = dpi.clamp(72, 600) as f32 / 72.0;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn corrective_retry(mut self, v: bool) -> Self {
        self.config.corrective_retry = v;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2TableError> {
        let c = &self.config;
        if !(c.scale.is_finite() && (0.5..=10.0).contains(&c.scale)) {
            return Err(Pdf2TableError::InvalidConfig(format!(
                "scale must be 0.5–10.0, got {}",
                c.scale
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2TableError::InvalidConfig(
                "concurrency must be ≥ 1".into(),
            ));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(Pdf2TableError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Pdf2TableError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How one document's failure affects the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record the failure against the document and keep going. (default)
    #[default]
    Isolate,
    /// Abort the whole batch on the first failure; no partial results.
    ///
    /// With `concurrency > 1` the reported failure is the first to
    /// complete, which need not be the lowest-index failing document.
    FailFast,
}
