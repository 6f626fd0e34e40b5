//! Final avatar rendering: crop, resize and PNG-encode
//!
//! Consumes the resolved crop rectangle and the decoded source image and
//! produces the fixed-size square avatar as in-memory PNG bytes. The caller
//! (the wasm handle, in a browser) wraps the bytes into a blob and a
//! revocable preview URL.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{imageops, ImageFormat, RgbaImage};
use thiserror::Error;

use crate::crop::CropRect;

/// Edge length of the exported square avatar, in pixels
pub const OUTPUT_EDGE: u32 = 512;

#[derive(Debug, Error)]
pub enum RenderError {
    /// No drawable source image is available
    #[error("no source image available to crop")]
    SourceUnavailable,
    /// The crop rectangle does not cover any source pixels
    #[error("crop region does not intersect the source image")]
    EmptyCrop,
    /// PNG encoding produced no output
    #[error("failed to encode avatar PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// The exported avatar: PNG bytes at a fixed square edge
#[derive(Clone, Debug)]
pub struct EncodedAvatar {
    pub png: Vec<u8>,
    pub edge: u32,
}

/// Draw the crop region of `source` scaled to fill the fixed-size output
/// square and encode it as PNG.
///
/// The rectangle is rounded to whole pixels and clamped into the source
/// bounds; a rectangle that rounds or clamps to nothing is an
/// [`RenderError::EmptyCrop`].
pub fn render_cropped_avatar(
    source: &RgbaImage,
    crop: CropRect,
) -> Result<EncodedAvatar, RenderError> {
    if source.width() == 0 || source.height() == 0 {
        return Err(RenderError::SourceUnavailable);
    }
    if !crop.is_valid() {
        return Err(RenderError::EmptyCrop);
    }

    let (src_w, src_h) = (source.width() as f32, source.height() as f32);
    let x0 = crop.x.round().clamp(0.0, src_w) as u32;
    let y0 = crop.y.round().clamp(0.0, src_h) as u32;
    let x1 = (crop.x + crop.width).round().clamp(0.0, src_w) as u32;
    let y1 = (crop.y + crop.height).round().clamp(0.0, src_h) as u32;

    if x1 <= x0 || y1 <= y0 {
        return Err(RenderError::EmptyCrop);
    }

    let region = imageops::crop_imm(source, x0, y0, x1 - x0, y1 - y0).to_image();
    let scaled = imageops::resize(&region, OUTPUT_EDGE, OUTPUT_EDGE, FilterType::Lanczos3);

    let mut png = Vec::new();
    scaled.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(EncodedAvatar {
        png,
        edge: OUTPUT_EDGE,
    })
}
