// src/app/mod.rs
pub mod controller;
pub mod tasks;

pub use controller::{Controller, OrderingPolicy, SubmissionStatus, ViewState};
pub use tasks::SharedController;
