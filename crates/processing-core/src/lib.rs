//! ClipFX Processing Core
//!
//! Pixel-level building blocks for the effect pipeline:
//! - **Frames:** RGBA frame buffers
//! - **Kernels:** Mean, Gaussian and Laplacian kernels at a fixed padded stride
//! - **Color:** RGB/HSL conversion
//! - **Zone Masks:** Per-pixel masks built from time-ranged rectangles
//! - **CPU Filters:** Greyscale, HSL adjustment, mosaic, channel normalization
//!
//! This crate is pure computation: it does no I/O and uses neither the GPU nor threads.

pub mod color;
pub mod cpu_filters;
pub mod frame;
pub mod kernel;
pub mod zone_mask;

pub use frame::FrameBuffer;
pub use kernel::{gaussian_kernel, laplacian_kernel, mean_kernel, KernelSpec};
pub use zone_mask::{build_mask, PixelMask};
