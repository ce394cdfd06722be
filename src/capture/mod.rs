// src/capture/mod.rs
pub mod camera;
pub mod image;
pub mod permission;
