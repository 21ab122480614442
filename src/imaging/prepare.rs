use std::io::Cursor;
use std::time::Duration;

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::ImageConfig;
use crate::models::CapturedImage;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PrepareError {
    #[error("image preparation exceeded {budget_ms}ms")]
    Timeout { budget_ms: u64 },
    #[error("image could not be decoded: {0}")]
    Decode(String),
    #[error("image could not be re-encoded: {0}")]
    Encode(String),
    #[error("image worker failed: {0}")]
    Worker(String),
}

/// Shrinks photos before upload without making the display digits unreadable.
///
/// Only the longest edge is bounded and JPEG quality stays high; most of the
/// saving comes from dropping phone-camera resolution, not from artefacts.
#[derive(Debug, Clone)]
pub struct ImagePreparer {
    max_edge_px: u32,
    jpeg_quality: u8,
    target_bytes: usize,
    budget: Duration,
}

impl ImagePreparer {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            max_edge_px: config.max_edge_px.max(1),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            target_bytes: config.target_bytes,
            budget: Duration::from_millis(config.prepare_budget_ms),
        }
    }

    pub async fn prepare(&self, raw: &CapturedImage) -> Result<CapturedImage, PrepareError> {
        let started = Instant::now();
        let input = raw.clone();
        let preparer = self.clone();

        let worker = tokio::task::spawn_blocking(move || preparer.prepare_blocking(input));
        let prepared = match tokio::time::timeout(self.budget, worker).await {
            Ok(joined) => joined.map_err(|err| PrepareError::Worker(err.to_string()))??,
            Err(_) => {
                return Err(PrepareError::Timeout {
                    budget_ms: self.budget.as_millis() as u64,
                })
            }
        };

        log_info!(
            "prepared {} ({} bytes) -> {} ({} bytes) in {}ms",
            raw.mime_type,
            raw.len(),
            prepared.mime_type,
            prepared.len(),
            started.elapsed().as_millis()
        );
        Ok(prepared)
    }

    fn prepare_blocking(&self, raw: CapturedImage) -> Result<CapturedImage, PrepareError> {
        if !raw.mime_type.starts_with("image/") {
            log_debug!("passing through non-image payload {}", raw.mime_type);
            return Ok(raw);
        }

        let format = match image::guess_format(&raw.bytes) {
            Ok(format) if format.reading_enabled() => format,
            _ => {
                log_debug!("no decoder for {}; uploading as-is", raw.mime_type);
                return Ok(raw);
            }
        };

        let decoded = ImageReader::with_format(Cursor::new(&raw.bytes), format)
            .decode()
            .map_err(|err| PrepareError::Decode(err.to_string()))?;

        let longest_edge = decoded.width().max(decoded.height());
        let needs_resize = longest_edge > self.max_edge_px;
        if !needs_resize && raw.len() <= self.target_bytes {
            return Ok(raw);
        }

        let resized = if needs_resize {
            decoded.resize(self.max_edge_px, self.max_edge_px, FilterType::Lanczos3)
        } else {
            decoded
        };
        let encoded = encode_jpeg(&resized, self.jpeg_quality)?;

        if !needs_resize && encoded.len() >= raw.len() && format == ImageFormat::Jpeg {
            return Ok(raw);
        }

        Ok(CapturedImage::new(
            encoded,
            "image/jpeg",
            jpeg_file_name(&raw.file_name),
            raw.origin,
        ))
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PrepareError> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .map_err(|err| PrepareError::Encode(err.to_string()))?;
    Ok(bytes)
}

fn jpeg_file_name(original: &str) -> String {
    let stem = match original.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => original,
    };
    if stem.is_empty() {
        "scale.jpg".to_string()
    } else {
        format!("{stem}.jpg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageOrigin;
    use image::{ImageBuffer, Rgb};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn preparer(budget_ms: u64) -> ImagePreparer {
        ImagePreparer::new(&ImageConfig {
            prepare_budget_ms: budget_ms,
            ..ImageConfig::default()
        })
    }

    #[tokio::test]
    async fn large_photo_is_downscaled_to_jpeg() {
        let raw = CapturedImage::new(png(2600, 1300), "image/png", "IMG_0042.png", ImageOrigin::File);
        let prepared = preparer(30_000).prepare(&raw).await.unwrap();

        assert_eq!(prepared.mime_type, "image/jpeg");
        assert_eq!(prepared.file_name, "IMG_0042.jpg");
        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(decoded.width(), 2048);
        assert_eq!(decoded.height(), 1024);
    }

    #[tokio::test]
    async fn small_photo_is_left_alone() {
        let raw = CapturedImage::new(png(64, 48), "image/png", "tiny.png", ImageOrigin::Camera);
        let prepared = preparer(30_000).prepare(&raw).await.unwrap();
        assert_eq!(prepared, raw);
    }

    #[tokio::test]
    async fn documents_and_undecodable_formats_pass_through() {
        let pdf = CapturedImage::new(b"%PDF-1.7 ...".to_vec(), "application/pdf", "log.pdf", ImageOrigin::File);
        assert_eq!(preparer(30_000).prepare(&pdf).await.unwrap(), pdf);

        let heic = CapturedImage::new(vec![0, 0, 0, 24, 1, 2, 3], "image/heic", "IMG.HEIC", ImageOrigin::File);
        assert_eq!(preparer(30_000).prepare(&heic).await.unwrap(), heic);
    }

    #[tokio::test]
    async fn corrupt_png_is_a_decode_error() {
        let mut bytes = png(32, 32);
        bytes.truncate(40);
        let raw = CapturedImage::new(bytes, "image/png", "broken.png", ImageOrigin::File);
        let err = preparer(30_000).prepare(&raw).await.unwrap_err();
        assert!(matches!(err, PrepareError::Decode(_)), "{err:?}");
    }

    #[tokio::test]
    async fn exceeding_budget_is_a_distinct_timeout() {
        let raw = CapturedImage::new(png(2600, 1300), "image/png", "big.png", ImageOrigin::File);
        let err = preparer(0).prepare(&raw).await.unwrap_err();
        assert_eq!(err, PrepareError::Timeout { budget_ms: 0 });
    }

    #[test]
    fn jpeg_names() {
        assert_eq!(jpeg_file_name("photo.heic"), "photo.jpg");
        assert_eq!(jpeg_file_name(".png"), "scale.jpg");
        assert_eq!(jpeg_file_name("noext"), "noext.jpg");
        assert_eq!(jpeg_file_name(""), "scale.jpg");
    }
}
