use crate::config::ImageConfig;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors that can occur while normalizing an upload
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),
}

/// Normalized image ready for upload
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// JPEG bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    /// Whether the image was downscaled
    pub resized: bool,
}

/// Decodes uploads, caps their width and re-encodes them as JPEG
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    max_width: u32,
    quality: u8,
}

impl ImageProcessor {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            max_width: config.max_width,
            quality: config.jpeg_quality,
        }
    }

    /// Decode, downscale if wider than the limit, and re-encode as JPEG
    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    pub fn process(&self, bytes: &[u8]) -> Result<ProcessedImage, ProcessingError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| ProcessingError::Decode(e.to_string()))?;
        let (original_width, original_height) = decoded.dimensions();

        let (image, resized) = match target_size(original_width, original_height, self.max_width) {
            Some((width, height)) => {
                debug!(
                    original_width,
                    original_height, width, height, "Downscaling image"
                );
                (decoded.resize_exact(width, height, FilterType::Lanczos3), true)
            }
            None => (decoded, false),
        };

        let (width, height) = image.dimensions();
        let data = self.encode_jpeg(image)?;

        Ok(ProcessedImage {
            data,
            width,
            height,
            original_width,
            original_height,
            resized,
        })
    }

    fn encode_jpeg(&self, image: DynamicImage) -> Result<Vec<u8>, ProcessingError> {
        // JPEG has no alpha channel
        let rgb = image.into_rgb8();
        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.quality)
            .encode_image(&rgb)
            .map_err(|e| ProcessingError::Encode(e.to_string()))?;
        Ok(data)
    }
}

/// Size to downscale to, or None when the image already fits
fn target_size(width: u32, height: u32, max_width: u32) -> Option<(u32, u32)> {
    if width <= max_width {
        return None;
    }
    let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
    Some((max_width, scaled.max(1)))
}
