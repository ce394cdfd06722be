// src/lib.rs
//! Ask questions about receipts and invoices with Gemini vision models.

pub mod ai;
pub mod app;
pub mod capture;
pub mod config;
#[cfg(feature = "desktop")]
pub mod gui;
