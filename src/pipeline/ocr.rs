//! Text recognition: page images → one plain-text string per document.
//!
//! Every page image is decoded first, so a corrupt bitmap is reported as an
//! OCR failure for that page before any engine runs. Recognition is
//! all-or-nothing per document: the first failing page fails the document,
//! there is no skip-and-continue.
//!
//! The production engine, [`TesseractCli`], pipes each JPEG into the
//! `tesseract` executable (`tesseract stdin stdout`), which keeps the
//! crate free of a native libtesseract link.

use crate::config::ExtractionConfig;
use crate::error::DocumentError;
use crate::pipeline::encode;
use crate::pipeline::render::PageImage;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// An OCR backend that reads the text from one page image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Recognise the text on one page. Failures should be
    /// [`DocumentError::Ocr`] carrying the 1-based page number.
    async fn recognize(&self, page: &PageImage) -> Result<String, DocumentError>;
}

/// Recognise every page and join the texts with `\n`, in page order.
///
/// Returns exactly one string; with zero pages it is empty.
pub async fn recognize_pages(
    engine: &dyn OcrEngine,
    pages: &[PageImage],
) -> Result<String, DocumentError> {
    validate_pages(pages).await?;

    let mut texts = Vec::with_capacity(pages.len());
    for page in pages {
        let text = engine.recognize(page).await?;
        debug!(
            "OCR page {} ({}): {} chars",
            page.index + 1,
            engine.name(),
            text.len()
        );
        texts.push(text);
    }

    Ok(texts.join("\n"))
}

/// Decode every page off the async runtime; the first failure wins.
async fn validate_pages(pages: &[PageImage]) -> Result<(), DocumentError> {
    let blobs: Vec<(usize, Vec<u8>)> = pages.iter().map(|p| (p.index, p.jpeg.clone())).collect();

    tokio::task::spawn_blocking(move || {
        for (index, jpeg) in &blobs {
            encode::decode_jpeg(jpeg).map_err(|e| DocumentError::Ocr {
                page: Some(index + 1),
                detail: format!("image decode failed: {e}"),
            })?;
        }
        Ok::<(), DocumentError>(())
    })
    .await
    .map_err(|e| DocumentError::Ocr {
        page: None,
        detail: format!("decode task panicked: {e}"),
    })?
}

/// Tesseract driven through its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: PathBuf,
    language: String,
    dpi: u32,
}

impl TesseractCli {
    pub fn new(program: impl Into<PathBuf>, language: impl Into<String>, dpi: u32) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
            dpi,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(
            config.tesseract_path.clone(),
            config.ocr_language.clone(),
            config.dpi(),
        )
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--dpi")
            .arg(self.dpi.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, page: &PageImage) -> Result<String, DocumentError> {
        let page_num = page.index + 1;
        let ocr_err = |detail: String| DocumentError::Ocr {
            page: Some(page_num),
            detail,
        };

        let mut child = self.command().spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DocumentError::Ocr {
                    page: None,
                    detail: format!(
                        "OCR engine unavailable: '{}' not found (install tesseract-ocr)",
                        self.program.display()
                    ),
                }
            } else {
                ocr_err(format!("failed to start tesseract: {e}"))
            }
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&page.jpeg)
                .await
                .map_err(|e| ocr_err(format!("writing image to tesseract: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ocr_err(format!("waiting for tesseract: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ocr_err(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let text = text.trim_end_matches(['\n', '\x0c']).to_string();
        info!("Tesseract read {} chars from page {}", text.len(), page_num);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    fn page(index: usize) -> PageImage {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([255])));
        PageImage {
            index,
            width: 8,
            height: 8,
            jpeg: encode::encode_jpeg(&img, 75).unwrap(),
        }
    }

    struct IndexEngine;

    #[async_trait]
    impl OcrEngine for IndexEngine {
        fn name(&self) -> &str {
            "index"
        }

        async fn recognize(&self, page: &PageImage) -> Result<String, DocumentError> {
            // Every other page is blank.
            if page.index % 2 == 1 {
                Ok(String::new())
            } else {
                Ok(format!("page-{}", page.index))
            }
        }
    }

    #[tokio::test]
    async fn joins_pages_in_order_with_one_segment_each() {
        let pages: Vec<PageImage> = (0..4).map(page).collect();
        let text = recognize_pages(&IndexEngine, &pages).await.unwrap();
        assert_eq!(text, "page-0\n\npage-2\n");
        assert_eq!(text.split('\n').count(), pages.len());
    }

    #[tokio::test]
    async fn zero_pages_yield_empty_string() {
        let text = recognize_pages(&IndexEngine, &[]).await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn undecodable_page_fails_whole_document() {
        let mut pages: Vec<PageImage> = (0..3).map(page).collect();
        pages[1].jpeg = b"garbage".to_vec();

        let err = recognize_pages(&IndexEngine, &pages).await.unwrap_err();
        match err {
            DocumentError::Ocr { page, .. } => assert_eq!(page, Some(2)),
            other => panic!("expected Ocr error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_tesseract_binary_is_reported_as_unavailable() {
        let engine = TesseractCli::new("/nonexistent/bin/tesseract-xyz", "eng", 300);
        let err = engine.recognize(&page(0)).await.unwrap_err();
        match err {
            DocumentError::Ocr { page, detail } => {
                assert_eq!(page, None);
                assert!(detail.contains("unavailable"), "got: {detail}");
            }
            other => panic!("expected Ocr error, got {other:?}"),
        }
    }

    #[test]
    fn command_line_includes_language_and_dpi() {
        let engine = TesseractCli::new("tesseract", "eng+deu", 300);
        let cmd = engine.command();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["stdin", "stdout", "-l", "eng+deu", "--dpi", "300"]);
    }
}
