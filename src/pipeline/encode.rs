//! Image encoding: raster pages and diff masks → base64 PNG parts.
//!
//! Vision APIs accept images as base64 payloads embedded in the JSON request
//! body. PNG keeps text edges crisp, which matters more than payload size for
//! transcription accuracy on small label print.

use crate::error::LabelScanError;
use crate::pipeline::diff::DiffMask;
use crate::pipeline::render::RasterPage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// One image attached to a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: String,
    /// Base64 payload, no `data:` prefix.
    pub data: String,
}

impl ImagePart {
    /// Convert into the provider's image type with `detail: "high"`.
    ///
    /// Without the high-detail hint, tiling providers downsample to a single
    /// overview tile and fine print is lost.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.data.clone(), self.mime_type.clone()).with_detail("high")
    }
}

/// PNG bytes of an RGBA buffer.
pub fn png_bytes(img: &RgbaImage) -> Result<Vec<u8>, LabelScanError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| LabelScanError::Internal(format!("Image encoding failed: {e}")))?;
    Ok(buf)
}

/// Write an RGBA buffer to `path` as PNG.
pub fn write_png(img: &RgbaImage, path: &Path) -> Result<(), LabelScanError> {
    let bytes = png_bytes(img)?;
    std::fs::write(path, &bytes).map_err(|source| LabelScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote {}x{} PNG to {}", img.width(), img.height(), path.display());
    Ok(())
}

/// Encode an RGBA buffer as a base64 PNG part.
pub fn encode_image(img: &RgbaImage) -> Result<ImagePart, LabelScanError> {
    let buf = png_bytes(img)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImagePart {
        mime_type: "image/png".to_string(),
        data: b64,
    })
}

/// Encode a rasterised page.
pub fn encode_page(page: &RasterPage) -> Result<ImagePart, LabelScanError> {
    encode_image(page.image())
}

/// Encode a diff mask. Transparency is kept so unflagged pixels stay clear.
pub fn encode_mask(mask: &DiffMask) -> Result<ImagePart, LabelScanError> {
    encode_image(mask.image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn encode_small_image() {
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let part = encode_image(&img).expect("encode should succeed");
        assert_eq!(part.mime_type, "image/png");
        assert!(!part.data.is_empty());
        // Verify it's valid base64
        let decoded = STANDARD.decode(&part.data).expect("valid base64");
        assert_eq!(&decoded[..4], b"\x89PNG");
    }

    #[test]
    fn image_data_carries_high_detail() {
        let part = encode_image(&RgbaImage::new(1, 1)).unwrap();
        let data = part.to_image_data();
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(data.data, part.data);
    }

    #[test]
    fn write_png_round_trips_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        write_png(&RgbaImage::new(7, 3), &path).unwrap();
        let back = image::open(&path).unwrap();
        assert_eq!((back.width(), back.height()), (7, 3));
    }

    #[test]
    fn write_png_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("mask.png");
        let err = write_png(&RgbaImage::new(1, 1), &path).unwrap_err();
        assert!(matches!(err, LabelScanError::OutputWriteFailed { .. }));
    }
}
