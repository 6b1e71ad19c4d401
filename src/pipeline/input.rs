//! Input resolution: turn caller-supplied bytes, paths or URLs into
//! in-memory [`Document`]s.
//!
//! Documents are held as bytes for the whole run; pdfium opens them from
//! memory, so nothing is written to disk. Loading accepts any bytes: a
//! file that is not a PDF is a per-document failure reported by
//! [`Document::check_header`], not a reason to abort the batch.

use crate::error::{DocumentError, Pdf2TableError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PDF_MAGIC: &[u8] = b"%PDF";

/// pdfium accepts a header anywhere in the first 1 KiB.
const HEADER_SEARCH_LEN: usize = 1024;

/// One PDF to process: a display name plus its raw bytes.
#[derive(Clone)]
pub struct Document {
    name: String,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl Document {
    /// Wrap bytes that are already in memory.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a local PDF file. The document name is the file name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Pdf2TableError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Pdf2TableError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Pdf2TableError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Pdf2TableError::Internal(format!("reading {}: {e}", path.display())),
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Loaded local PDF: {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(name, bytes))
    }

    /// Download a PDF over HTTP(S).
    pub async fn from_url(url: &str, timeout_secs: u64) -> Result<Self, Pdf2TableError> {
        info!("Downloading PDF from: {}", url);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Pdf2TableError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Pdf2TableError::DownloadTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                Pdf2TableError::DownloadFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(Pdf2TableError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Pdf2TableError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        info!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(Self::from_bytes(filename_from_url(url), bytes.to_vec()))
    }

    /// Resolve a path or URL string.
    pub async fn load(input: &str, timeout_secs: u64) -> Result<Self, Pdf2TableError> {
        if is_url(input) {
            Self::from_url(input, timeout_secs).await
        } else {
            Self::from_path(PathBuf::from(input)).await
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the document, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Fail with [`DocumentError::DocumentFormat`] unless a `%PDF` header
    /// appears within the first 1024 bytes.
    pub fn check_header(&self) -> Result<(), DocumentError> {
        let head = &self.bytes[..self.bytes.len().min(HEADER_SEARCH_LEN)];
        if head.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
            return Ok(());
        }
        let first: Vec<u8> = self.bytes.iter().take(8).copied().collect();
        Err(DocumentError::DocumentFormat {
            detail: format!(
                "no %PDF header in the first {} bytes (starts with {:?})",
                HEADER_SEARCH_LEN,
                String::from_utf8_lossy(&first)
            ),
        })
    }
}

/// Load every input in order, stopping at the first one that cannot be read.
pub async fn load_all<S: AsRef<str>>(
    inputs: &[S],
    timeout_secs: u64,
) -> Result<Vec<Document>, Pdf2TableError> {
    let mut documents = Vec::with_capacity(inputs.len());
    for input in inputs {
        documents.push(Document::load(input.as_ref(), timeout_secs).await?);
    }
    Ok(documents)
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Last path segment of the URL when it looks like a filename.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
