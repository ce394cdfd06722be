// src/ai/mod.rs
pub mod connector;
pub mod gemini;
pub mod prompt;
