//! ClipFX Common Utilities
//!
//! Shared infrastructure for all ClipFX crates:
//! - Error taxonomy and result aliases
//! - Media clock utilities for frame and sample timestamps
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
