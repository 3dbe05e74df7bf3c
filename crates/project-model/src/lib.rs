//! ClipFX Project Model
//!
//! Defines the core data contracts for ClipFX projects:
//! - **Filters:** The closed effect catalog and its per-kind configuration
//! - **Zones:** Time-ranged rectangles that restrict where a filter applies
//! - **Project:** Source reference, edit range, export settings, filter list
//!
//! Zone rectangles are stored in editor-preview pixel coordinates; exports
//! at a different resolution rescale them through a scale factor.

pub mod filter;
pub mod project;
pub mod zone;

pub use filter::*;
pub use project::*;
pub use zone::*;
