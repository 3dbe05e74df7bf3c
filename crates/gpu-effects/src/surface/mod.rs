//! Render surfaces: where shader programs actually run.

mod software;
mod wgpu_surface;

pub use software::SoftwareSurface;
pub use wgpu_surface::WgpuSurface;

use clipfx_common::{FxResult, GpuBackend};
use clipfx_processing_core::FrameBuffer;

use crate::program::ShaderProgram;

/// An offscreen target that can run one fragment program at a time over
/// frames of a fixed size.
pub trait RenderSurface: Send {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Target size in pixels.
    fn size(&self) -> (u32, u32);

    /// Compile and link `program`, replacing the current one. The uniform
    /// block is reset to zeroes.
    fn compile(&mut self, program: &'static ShaderProgram) -> FxResult<()>;

    /// Write `bytes` into the uniform block at byte `offset`.
    fn upload(&mut self, offset: usize, bytes: &[u8]) -> FxResult<()>;

    /// Draw the linked program with `frame` as input and overwrite the
    /// frame with the result.
    fn render(&mut self, frame: &mut FrameBuffer) -> FxResult<()>;
}

/// Open a surface for the requested backend.
///
/// `Auto` prefers a hardware adapter and falls back to the software surface.
pub fn open_surface(
    backend: GpuBackend,
    width: u32,
    height: u32,
) -> FxResult<Box<dyn RenderSurface>> {
    match backend {
        GpuBackend::Software => Ok(Box::new(SoftwareSurface::new(width, height))),
        GpuBackend::Wgpu => Ok(Box::new(WgpuSurface::new(width, height)?)),
        GpuBackend::Auto => match WgpuSurface::new(width, height) {
            Ok(surface) => Ok(Box::new(surface)),
            Err(e) => {
                tracing::warn!(error = %e, "GPU surface unavailable, using software rendering");
                Ok(Box::new(SoftwareSurface::new(width, height)))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_backend_opens_anywhere() {
        let surface = open_surface(GpuBackend::Software, 8, 6).unwrap();
        assert_eq!(surface.name(), "software");
        assert_eq!(surface.size(), (8, 6));
    }

    #[test]
    fn test_auto_backend_always_opens() {
        let surface = open_surface(GpuBackend::Auto, 8, 6).unwrap();
        assert_eq!(surface.size(), (8, 6));
    }
}
