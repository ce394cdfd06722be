// src/ai/connector.rs
use anyhow::Result;

use crate::capture::image::CapturedImage;

/// Trait defining the interface for the hosted model
pub trait AiConnector: Send + Sync {
    /// Send a composed prompt plus image and return the generated text
    fn generate(&self, prompt: &str, image: &CapturedImage) -> Result<String>;
}
