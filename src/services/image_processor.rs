// src/services/image_processor.rs
use image::GenericImageView;
use image::ImageFormat as ImgFormat;

use crate::errors::RestyleError;

/// Decode validation and model-bound downscaling for fetched images.
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Confirm the bytes decode as an image and return its dimensions.
    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), RestyleError> {
        let img = image::load_from_memory(data)
            .map_err(|e| RestyleError::InvalidInput(format!("Invalid image format: {e}")))?;

        let (width, height) = img.dimensions();
        if width > 4096 || height > 4096 {
            return Err(RestyleError::InvalidInput(
                "Image dimensions exceed 4096x4096".to_string(),
            ));
        }

        Ok((width, height))
    }

    /// Shrink the image until its raw size fits the inline payload budget of
    /// the generation model, re-encoding as JPEG. Base64 inflates the payload
    /// by ~33%, so the budget must leave that headroom.
    pub fn shrink_to_budget(&self, data: &[u8], max_bytes: usize) -> Result<Vec<u8>, RestyleError> {
        if data.len() <= max_bytes {
            return Ok(data.to_vec());
        }

        let img = image::load_from_memory(data)
            .map_err(|e| RestyleError::InvalidInput(format!("Failed to load image: {e}")))?;

        let (width, height) = img.dimensions();
        let scale = ((max_bytes as f64 / data.len() as f64).sqrt() * 0.9) as f32;
        let new_width = ((width as f32 * scale) as u32).max(256);
        let new_height = ((height as f32 * scale) as u32).max(256);

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);

        let mut output = Vec::new();
        resized
            .write_to(&mut std::io::Cursor::new(&mut output), ImgFormat::Jpeg)
            .map_err(|e| {
                RestyleError::InvalidInput(format!("Failed to encode resized image: {e}"))
            })?;

        Ok(output)
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}
