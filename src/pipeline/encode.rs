//! Image codec helpers: rendered page → JPEG bytes, and back.
//!
//! Page images travel from the rasteriser to the OCR engine as JPEG. The
//! JPEG encoder only accepts 8-bit grey or RGB, while pdfium hands back
//! RGBA, so the alpha channel is dropped before encoding.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

/// Encode a rendered page as JPEG at the given quality (1–100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
    debug!(
        "Encoded {}x{} page → {} bytes JPEG",
        rgb.width(),
        rgb.height(),
        buf.len()
    );
    Ok(buf)
}

/// Decode a JPEG page image, validating that it is a usable raster.
pub fn decode_jpeg(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
}
