//! PDF rasterisation: render every page to a JPEG [`PageImage`] via pdfium.
//!
//! pdfium uses thread-local state and is CPU-heavy, so all of its work runs
//! inside `tokio::task::spawn_blocking`. Pages are rendered at a fixed
//! scale factor relative to PDF user space (default 300/72, i.e. 300 DPI),
//! with `max_rendered_pixels` as a hard cap for oversized pages.

use crate::config::ExtractionConfig;
use crate::error::{DocumentError, Pdf2TableError};
use crate::pipeline::encode;
use crate::pipeline::input::Document;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One rendered page: zero-based index plus its JPEG encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Turns a PDF document into page images, one per page, in page order.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, document: &Document) -> Result<Vec<PageImage>, DocumentError>;
}

/// Production rasteriser backed by pdfium-render.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    scale: f32,
    max_pixels: u32,
    jpeg_quality: u8,
    password: Option<String>,
    lib_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            scale: config.scale,
            max_pixels: config.max_rendered_pixels,
            jpeg_quality: config.jpeg_quality,
            password: config.password.clone(),
            lib_path: config.pdfium_lib_path.clone(),
        }
    }

    /// Check that a pdfium library can be bound, before any document is queued.
    pub fn probe(&self) -> Result<(), Pdf2TableError> {
        bind_pdfium(self.lib_path.as_deref())
            .map(|_| ())
            .map_err(Pdf2TableError::PdfiumBindingFailed)
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn rasterize(&self, document: &Document) -> Result<Vec<PageImage>, DocumentError> {
        let bytes = document.bytes().to_vec();
        let this = self.clone();

        tokio::task::spawn_blocking(move || this.rasterize_blocking(bytes))
            .await
            .map_err(|e| DocumentError::DocumentFormat {
                detail: format!("render task panicked: {e}"),
            })?
    }
}

impl PdfiumRasterizer {
    fn rasterize_blocking(&self, bytes: Vec<u8>) -> Result<Vec<PageImage>, DocumentError> {
        let pdfium = bind_pdfium(self.lib_path.as_deref())
            .map_err(|detail| DocumentError::DocumentFormat { detail })?;

        let document = pdfium
            .load_pdf_from_byte_vec(bytes, self.password.as_deref())
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                let detail = if err_str.contains("Password") || err_str.contains("password") {
                    if self.password.is_some() {
                        "wrong password for encrypted PDF".to_string()
                    } else {
                        "PDF is encrypted and requires a password".to_string()
                    }
                } else {
                    err_str
                };
                DocumentError::DocumentFormat { detail }
            })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let max = self.max_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.scale)
            .set_maximum_width(max)
            .set_maximum_height(max);

        let mut results = Vec::with_capacity(pages.len() as usize);

        for (index, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                DocumentError::Rasterization {
                    page: index + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            let jpeg = encode::encode_jpeg(&image, self.jpeg_quality).map_err(|e| {
                DocumentError::Rasterization {
                    page: index + 1,
                    detail: format!("JPEG encoding failed: {e}"),
                }
            })?;

            debug!(
                "Rendered page {} → {}x{} px, {} bytes",
                index + 1,
                image.width(),
                image.height(),
                jpeg.len()
            );

            results.push(PageImage {
                index,
                width: image.width(),
                height: image.height(),
                jpeg,
            });
        }

        Ok(results)
    }
}

/// Bind pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the system library.
///
/// A directory is accepted in place of a file and resolved to the
/// platform-specific library name inside it.
fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, String> {
    let from_env = std::env::var_os("PDFIUM_LIB_PATH")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    let bindings = match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => {
            let lib = if path.is_dir() {
                PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&path))
            } else {
                path
            };
            Pdfium::bind_to_library(&lib).map_err(|e| format!("{}: {e:?}", lib.display()))?
        }
        None => Pdfium::bind_to_system_library().map_err(|e| format!("system library: {e:?}"))?,
    };

    Ok(Pdfium::new(bindings))
}
