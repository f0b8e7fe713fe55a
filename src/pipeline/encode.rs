//! Image encoding: raw bytes → base64 payload for the extraction request.
//!
//! Receipt photos straight off a phone are often 4000 px or more on the
//! long edge. Anything above `max_image_pixels` is downscaled before it is
//! sent; smaller images pass through untouched so no re-encoding artefacts
//! are introduced on already-sharp scans.

use crate::error::ScanError;
use crate::pipeline::input::LoadedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops::FilterType, DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// An image ready to be attached to an extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptImage {
    /// Base64 (standard alphabet, padded) image bytes.
    pub data: String,
    pub mime_type: String,
    /// Pixel dimensions, when the format could be decoded.
    pub dimensions: Option<(u32, u32)>,
}

impl ReceiptImage {
    /// Wrap an already-encoded base64 payload without inspecting it.
    pub fn from_base64(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            dimensions: None,
        }
    }
}

/// Sniff, optionally downscale, and base64-encode a loaded image.
pub fn encode_image(image: &LoadedImage, max_pixels: u32) -> Result<ReceiptImage, ScanError> {
    let format = image::guess_format(&image.bytes).map_err(|_| ScanError::InvalidImage {
        detail: match image.declared_mime.as_deref() {
            Some(mime) => format!("unrecognised image data (declared {mime})"),
            None => "unrecognised image data".to_string(),
        },
    })?;
    let mime_type = format.to_mime_type().to_string();

    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        // Not decodable here; providers accept webp/gif as-is.
        debug!("Passing through {} image unchanged", mime_type);
        return Ok(ReceiptImage {
            data: STANDARD.encode(&image.bytes),
            mime_type,
            dimensions: None,
        });
    }

    let (width, height) = ImageReader::with_format(Cursor::new(&image.bytes), format)
        .into_dimensions()
        .map_err(|e| ScanError::InvalidImage {
            detail: format!("cannot read image header: {e}"),
        })?;

    if width.max(height) <= max_pixels {
        let data = STANDARD.encode(&image.bytes);
        debug!("Encoded {}x{} image → {} bytes base64", width, height, data.len());
        return Ok(ReceiptImage {
            data,
            mime_type,
            dimensions: Some((width, height)),
        });
    }

    let decoded = image::load_from_memory_with_format(&image.bytes, format).map_err(|e| {
        ScanError::InvalidImage {
            detail: format!("cannot decode image: {e}"),
        }
    })?;
    let resized = downscale(&decoded, max_pixels);
    let dimensions = (resized.width(), resized.height());

    let mut buf = Vec::new();
    let write_result = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg),
        _ => resized.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png),
    };
    write_result.map_err(|e| ScanError::InvalidImage {
        detail: format!("cannot re-encode image: {e}"),
    })?;

    let data = STANDARD.encode(&buf);
    debug!(
        "Downscaled {}x{} → {}x{}, {} bytes base64",
        width,
        height,
        dimensions.0,
        dimensions.1,
        data.len()
    );

    Ok(ReceiptImage {
        data,
        mime_type,
        dimensions: Some(dimensions),
    })
}

/// Scale so the long edge equals `max_pixels`, keeping the aspect ratio.
fn downscale(img: &DynamicImage, max_pixels: u32) -> DynamicImage {
    img.resize(max_pixels, max_pixels, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::input::ImageOrigin;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    fn loaded(bytes: Vec<u8>) -> LoadedImage {
        LoadedImage {
            bytes,
            declared_mime: None,
            origin: ImageOrigin::Inline,
        }
    }

    #[test]
    fn small_image_passes_through() {
        let bytes = png_bytes(10, 10);
        let img = encode_image(&loaded(bytes.clone()), 2000).expect("encode should succeed");
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.dimensions, Some((10, 10)));
        assert_eq!(STANDARD.decode(&img.data).unwrap(), bytes);
    }

    #[test]
    fn large_image_is_downscaled() {
        let img = encode_image(&loaded(png_bytes(600, 300)), 300).expect("encode should succeed");
        assert_eq!(img.dimensions, Some((300, 150)));
        let decoded = image::load_from_memory(&STANDARD.decode(&img.data).unwrap()).unwrap();
        assert_eq!(decoded.width(), 300);
    }

    #[test]
    fn rejects_non_image_bytes() {
        let err = encode_image(&loaded(b"hello, not an image".to_vec()), 2000).unwrap_err();
        assert!(matches!(err, ScanError::InvalidImage { .. }));
    }
}
