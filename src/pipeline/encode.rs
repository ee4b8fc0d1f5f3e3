//! Image encoding: `DynamicImage` → base64 PNG suitable for a `data:` URI.
//!
//! PNG is lossless; JPEG artefacts around glyph edges cost the model more
//! accuracy than the larger payload costs in bandwidth.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// A rasterised page, PNG-encoded and base64-wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPage {
    /// 1-indexed page number.
    pub page_num: usize,
    pub width: u32,
    pub height: u32,
    /// Standard-alphabet base64 of the PNG bytes.
    pub png_base64: String,
}

impl EncodedPage {
    /// `data:image/png;base64,…` form accepted by the `image_url` content part.
    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", self.png_base64)
    }

    /// Decode back to raw PNG bytes, e.g. to serve the preview.
    pub fn png_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.png_base64)
    }
}

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(page_num: usize, img: &DynamicImage) -> Result<EncodedPage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let png_base64 = STANDARD.encode(&buf);
    debug!(
        "Encoded page {} ({}x{}) → {} bytes base64",
        page_num,
        img.width(),
        img.height(),
        png_base64.len()
    );

    Ok(EncodedPage {
        page_num,
        width: img.width(),
        height: img.height(),
        png_base64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 6, Rgba([255, 0, 0, 255])));
        let page = encode_page(4, &img).expect("encode should succeed");
        assert_eq!(page.page_num, 4);
        assert_eq!((page.width, page.height), (10, 6));
        assert!(page.data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn png_bytes_have_png_signature() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255])));
        let page = encode_page(1, &img).unwrap();
        let bytes = page.png_bytes().unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
