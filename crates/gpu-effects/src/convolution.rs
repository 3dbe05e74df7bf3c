//! Convolution processor: blur, sharpen and edge detection.

use clipfx_common::{FxResult, GpuBackend};
use clipfx_processing_core::kernel::KERNEL_LEN;
use clipfx_processing_core::{FrameBuffer, KernelSpec};

use crate::program::{
    EffectFamily, ProgramManager, ShaderProgram, UniformDecl, UniformKind, UniformValue,
};
use crate::surface::{open_surface, RenderSurface};

pub static CONVOLUTION_PROGRAM: ShaderProgram = ShaderProgram {
    label: "convolution",
    family: EffectFamily::Convolution,
    wgsl: include_str!("../shaders/convolution.wgsl"),
    uniforms: &[
        UniformDecl {
            name: "u_texture_size",
            kind: UniformKind::Vec2,
        },
        UniformDecl {
            name: "u_kernel_size",
            kind: UniformKind::Int,
        },
        UniformDecl {
            name: "u_rectify",
            kind: UniformKind::Bool,
        },
        UniformDecl {
            name: "u_kernel",
            kind: UniformKind::FloatArray(KERNEL_LEN),
        },
    ],
};

/// Runs the convolution program and remembers what it last uploaded so
/// repeated kernels cost nothing.
#[derive(Debug)]
pub struct ConvolutionProcessor {
    programs: ProgramManager,
    last_kernel: Option<KernelSpec>,
    rectify: bool,
}

impl ConvolutionProcessor {
    /// Link the convolution program on `surface`.
    pub fn new(surface: Box<dyn RenderSurface>) -> FxResult<Self> {
        let mut programs = ProgramManager::new(surface);
        programs.set_program(&CONVOLUTION_PROGRAM)?;
        programs.send_uniform("u_rectify", UniformValue::Bool(false))?;
        Ok(Self {
            programs,
            last_kernel: None,
            rectify: false,
        })
    }

    /// Open a surface for `backend` and link the program on it.
    pub fn open(backend: GpuBackend, width: u32, height: u32) -> FxResult<Self> {
        Self::new(open_surface(backend, width, height)?)
    }

    /// Make `kernel` current. Returns whether anything was uploaded.
    pub fn set_kernel(&mut self, kernel: &KernelSpec) -> FxResult<bool> {
        if let Some(last) = &self.last_kernel {
            if last.probe_matches(kernel) {
                return Ok(false);
            }
        }

        self.programs.send_uniform(
            "u_kernel",
            UniformValue::FloatArray(kernel.values().to_vec()),
        )?;
        self.programs
            .send_uniform("u_kernel_size", UniformValue::Int(kernel.size() as i32))?;
        self.last_kernel = Some(kernel.clone());
        tracing::debug!(size = kernel.size(), "Uploaded convolution kernel");
        Ok(true)
    }

    /// Output `abs(sum)` instead of the clamped sum.
    pub fn set_rectify(&mut self, rectify: bool) -> FxResult<()> {
        if self.rectify != rectify {
            self.programs
                .send_uniform("u_rectify", UniformValue::Bool(rectify))?;
            self.rectify = rectify;
        }
        Ok(())
    }

    /// Convolve `frame` in place with the current kernel.
    pub fn render(&mut self, frame: &mut FrameBuffer) -> FxResult<()> {
        self.programs.render_frame(frame)?;
        Ok(())
    }

    /// Set `kernel` and convolve `frame` in place.
    pub fn apply(&mut self, frame: &mut FrameBuffer, kernel: &KernelSpec) -> FxResult<()> {
        self.set_kernel(kernel)?;
        self.render(frame)
    }

    pub fn programs(&self) -> &ProgramManager {
        &self.programs
    }

    pub fn size(&self) -> (u32, u32) {
        self.programs.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipfx_processing_core::{gaussian_kernel, laplacian_kernel, mean_kernel};

    use crate::surface::SoftwareSurface;

    fn processor(width: u32, height: u32) -> ConvolutionProcessor {
        ConvolutionProcessor::new(Box::new(SoftwareSurface::new(width, height))).unwrap()
    }

    fn gradient(width: u32, height: u32) -> FrameBuffer {
        let mut frame = FrameBuffer::filled(width, height, [0, 0, 0, 255]);
        for y in 0..height {
            for x in 0..width {
                let v = ((x * 37 + y * 11) % 256) as u8;
                frame.set_pixel(x, y, [v, 255 - v, v / 2, 255]);
            }
        }
        frame
    }

    #[test]
    fn test_identical_kernel_uploads_once() {
        let mut conv = processor(4, 4);
        let kernel = gaussian_kernel(5, 2.0).unwrap();

        let before = conv.programs().upload_count();
        assert!(conv.set_kernel(&kernel).unwrap());
        let after_first = conv.programs().upload_count();
        assert!(after_first > before);

        assert!(!conv.set_kernel(&kernel.clone()).unwrap());
        assert_eq!(conv.programs().upload_count(), after_first);

        assert!(conv.set_kernel(&gaussian_kernel(5, 1.0).unwrap()).unwrap());
    }

    #[test]
    fn test_rectify_uploads_only_on_change() {
        let mut conv = processor(2, 2);
        let count = conv.programs().upload_count();
        conv.set_rectify(false).unwrap();
        assert_eq!(conv.programs().upload_count(), count);
        conv.set_rectify(true).unwrap();
        conv.set_rectify(true).unwrap();
        assert_eq!(conv.programs().upload_count(), count + 1);
    }

    #[test]
    fn test_identity_kernel_preserves_rgb() {
        let mut conv = processor(5, 4);
        let identity = KernelSpec::from_compact(1, &[1.0]).unwrap();
        let mut frame = gradient(5, 4);
        let original = frame.clone();
        conv.apply(&mut frame, &identity).unwrap();
        assert_eq!(frame, original);
    }

    #[test]
    fn test_mean_kernel_on_flat_frame_is_flat() {
        let mut conv = processor(6, 6);
        let mut frame = FrameBuffer::filled(6, 6, [90, 120, 30, 40]);
        conv.apply(&mut frame, &mean_kernel(3).unwrap()).unwrap();
        // Alpha is forced to opaque.
        assert!(frame
            .pixels
            .chunks_exact(4)
            .all(|px| px == [90, 120, 30, 255]));
    }

    #[test]
    fn test_edge_kernel_with_rectify_finds_step() {
        let mut conv = processor(4, 3);
        let mut frame = FrameBuffer::filled(4, 3, [0, 0, 0, 255]);
        for y in 0..3 {
            frame.set_pixel(2, y, [255, 255, 255, 255]);
            frame.set_pixel(3, y, [255, 255, 255, 255]);
        }
        conv.set_rectify(true).unwrap();
        conv.apply(&mut frame, &laplacian_kernel(3, true)).unwrap();

        // Flat regions have zero response; both sides of the step respond.
        assert_eq!(frame.pixel(0, 1)[0], 0);
        assert_eq!(frame.pixel(1, 1)[0], 255);
        assert_eq!(frame.pixel(2, 1)[0], 255);
        assert_eq!(frame.pixel(3, 1)[0], 0);
    }

    #[test]
    fn test_clamp_to_edge_sampling() {
        let mut conv = processor(3, 1);
        let mut frame = FrameBuffer::filled(3, 1, [0, 0, 0, 255]);
        frame.set_pixel(0, 0, [255, 0, 0, 255]);
        // Shift right by one: output(x) = input(x - 1).
        let mut weights = [0.0; 9];
        weights[3] = 1.0;
        let shift = KernelSpec::from_compact(3, &weights).unwrap();
        conv.apply(&mut frame, &shift).unwrap();
        assert_eq!(frame.pixel(0, 0)[0], 255);
        assert_eq!(frame.pixel(1, 0)[0], 255);
        assert_eq!(frame.pixel(2, 0)[0], 0);
    }
}
