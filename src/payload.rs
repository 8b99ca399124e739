//! Image payloads sent to the model.
//!
//! Source files are read once, downscaled when either side exceeds
//! [`MAX_DIMENSION`], and carried as base64 so they can be embedded in a
//! request body or rendered as a `data:` URI.

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::{debug, info};

/// Longest side, in pixels, of an image sent upstream.
pub const MAX_DIMENSION: u32 = 1536;

/// Source files above this size are rejected before decoding.
pub const MAX_SOURCE_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("image is too large ({bytes} bytes, limit {limit})")]
    TooLarge { bytes: u64, limit: u64 },
    #[error("unsupported or corrupt image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),
    #[error("image task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64 (standard alphabet, padded) encoded bytes.
    pub data: String,
}

impl ImagePayload {
    /// Reads and prepares an image file. Decoding runs on the blocking pool.
    pub async fn load(path: &Path) -> Result<Self, ImageError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > MAX_SOURCE_BYTES {
            return Err(ImageError::TooLarge {
                bytes: size,
                limit: MAX_SOURCE_BYTES,
            });
        }
        let bytes = tokio::fs::read(path).await?;
        info!(path = %path.display(), bytes = bytes.len(), "[IMAGE] Loaded source image");
        tokio::task::spawn_blocking(move || Self::from_bytes(&bytes))
            .await
            .map_err(|e| ImageError::Task(e.to_string()))?
    }

    /// Builds a payload from encoded image bytes, downscaling oversized images.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let format = image::guess_format(bytes)?;
        let decoded = image::load_from_memory_with_format(bytes, format)?;

        if decoded.width() <= MAX_DIMENSION && decoded.height() <= MAX_DIMENSION {
            return Ok(Self {
                mime_type: format.to_mime_type().to_string(),
                data: STANDARD.encode(bytes),
            });
        }

        let resized = decoded.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Triangle);
        debug!(
            from_width = decoded.width(),
            from_height = decoded.height(),
            to_width = resized.width(),
            to_height = resized.height(),
            "[IMAGE] Downscaled oversized image"
        );
        // JPEG has no alpha channel.
        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
        let mut out = Cursor::new(Vec::new());
        rgb.write_to(&mut out, ImageFormat::Jpeg)?;
        Ok(Self {
            mime_type: "image/jpeg".to_string(),
            data: STANDARD.encode(out.into_inner()),
        })
    }

    /// Parses `data:<mime>;base64,<body>`.
    pub fn from_data_uri(uri: &str) -> Result<Self, ImageError> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| ImageError::InvalidDataUri("missing data: prefix".to_string()))?;
        let (mime_type, data) = rest
            .split_once(";base64,")
            .ok_or_else(|| ImageError::InvalidDataUri("expected ;base64, separator".to_string()))?;
        if !mime_type.starts_with("image/") {
            return Err(ImageError::InvalidDataUri(format!(
                "not an image MIME type: {mime_type}"
            )));
        }
        STANDARD
            .decode(data)
            .map_err(|e| ImageError::InvalidDataUri(e.to_string()))?;
        Ok(Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn small_images_pass_through_untouched() {
        let bytes = png_bytes(16, 16);
        let payload = ImagePayload::from_bytes(&bytes).unwrap();
        assert_eq!(payload.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&payload.data).unwrap(), bytes);
    }

    #[test]
    fn oversized_images_are_downscaled_to_jpeg() {
        let bytes = png_bytes(MAX_DIMENSION * 2, 100);
        let payload = ImagePayload::from_bytes(&bytes).unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&STANDARD.decode(&payload.data).unwrap()).unwrap();
        assert_eq!(decoded.width(), MAX_DIMENSION);
        assert!(decoded.height() <= 50);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ImagePayload::from_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn data_uri_round_trip() {
        let payload = ImagePayload::from_bytes(&png_bytes(4, 4)).unwrap();
        let parsed = ImagePayload::from_data_uri(&payload.data_uri()).unwrap();
        assert_eq!(parsed, payload);
        assert!(ImagePayload::from_data_uri("data:text/plain;base64,aGk=").is_err());
        assert!(ImagePayload::from_data_uri("aGk=").is_err());
    }
}
