// src/capture/image.rs
use anyhow::{Context, Result};
use image::{DynamicImage, ImageOutputFormat};
use log::info;
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

/// MIME type of the bytes produced by [`CapturedImage::encode_png`].
pub const UPLOAD_MIME_TYPE: &str = "image/png";

/// The single bitmap currently under question. Replaced wholesale, never
/// edited in place.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    image: DynamicImage,
}

/// What the view needs to know about the image without holding pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
    pub width: u32,
    pub height: u32,
}

impl CapturedImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Decode an encoded payload (PNG, JPEG, ...) picked from the library.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("Failed to decode image data")?;
        info!("Decoded image: {}x{}", image.width(), image.height());
        Ok(Self { image })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image file {}", path.display()))?;
        Self::decode(&bytes)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn summary(&self) -> ImageSummary {
        ImageSummary {
            width: self.image.width(),
            height: self.image.height(),
        }
    }

    /// PNG bytes sent to the model.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        self.image.write_to(&mut cursor, ImageOutputFormat::Png)?;
        Ok(buffer)
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to save image to {}", path.display()))?;
        info!("Image saved to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_image(width: u32, height: u32) -> CapturedImage {
    let rgba = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 180, 160, 255]));
    CapturedImage::new(DynamicImage::ImageRgba8(rgba))
}
