//! ClipFX GPU Effects
//!
//! Fragment-program effects run over whole frames:
//! - **Programs:** Uniform tables, uniform upload and program linking
//! - **Surfaces:** A wgpu offscreen target, and a CPU surface that evaluates
//!   the same programs on machines without a usable adapter
//! - **Convolution:** Kernel blur, sharpen and edge response
//! - **Glitch:** Time-varying distortion, colour shift and scanlines
//!
//! Each processor owns its surface. Surfaces are not shared between
//! processors or threads.

pub mod convolution;
pub mod glitch;
pub mod program;
pub mod surface;

pub use convolution::{ConvolutionProcessor, CONVOLUTION_PROGRAM};
pub use glitch::{GlitchProcessor, GLITCH_PROGRAM};
pub use program::{ProgramManager, ShaderProgram, UniformValue};
pub use surface::{open_surface, RenderSurface, SoftwareSurface, WgpuSurface};
