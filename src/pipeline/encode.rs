//! Image encoding: `DynamicImage` → base64 PNG ready for a vision API.
//!
//! All three vendors accept base64 image data inside the JSON request body.
//! PNG is lossless, which keeps rendered text crisp; JPEG artefacts around
//! glyphs measurably hurt transcription at 150 DPI.

use crate::region::BoundingBox;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// A base64-encoded image plus the dimensions the adapters need.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    /// Base64 (standard alphabet, padded) image bytes.
    pub data: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    /// `data:` URI form used by OpenAI-compatible APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Encode a rasterised page (or crop) as base64 PNG.
pub fn encode_png(img: &DynamicImage) -> Result<EncodedImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let data = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        img.width(),
        img.height(),
        data.len()
    );

    Ok(EncodedImage {
        data,
        mime_type: "image/png",
        width: img.width(),
        height: img.height(),
    })
}

/// Crop one region out of a page image, with `padding` pixels of context,
/// and encode it.
pub fn crop_region(
    page: &DynamicImage,
    bbox: &BoundingBox,
    padding: u32,
) -> Result<EncodedImage, image::ImageError> {
    let (x, y, w, h) = bbox.to_pixels(page.width(), page.height(), padding);
    let crop = page.crop_imm(x, y, w, h);
    encode_png(&crop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn encode_small_image() {
        let data = encode_png(&page(10, 10)).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        assert_eq!((data.width, data.height), (10, 10));
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn data_url_prefix() {
        let data = encode_png(&page(2, 2)).unwrap();
        assert!(data.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn crop_keeps_region_size_plus_padding() {
        let bbox = BoundingBox::from_corners(0.25, 0.25, 0.75, 0.5).unwrap();
        let crop = crop_region(&page(200, 400), &bbox, 4).unwrap();
        assert_eq!((crop.width, crop.height), (108, 108));
    }
}
