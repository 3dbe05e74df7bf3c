//! Glitch processor.

use clipfx_common::{FxResult, GpuBackend};
use clipfx_processing_core::FrameBuffer;
use clipfx_project_model::GlitchConfig;

use crate::program::{
    EffectFamily, ProgramManager, ShaderProgram, UniformDecl, UniformKind, UniformValue,
};
use crate::surface::{open_surface, RenderSurface};

pub static GLITCH_PROGRAM: ShaderProgram = ShaderProgram {
    label: "glitch",
    family: EffectFamily::Glitch,
    wgsl: include_str!("../shaders/glitch.wgsl"),
    uniforms: &[
        UniformDecl {
            name: "u_texture_size",
            kind: UniformKind::Vec2,
        },
        UniformDecl {
            name: "u_time",
            kind: UniformKind::Float,
        },
        UniformDecl {
            name: "u_color_shift_on",
            kind: UniformKind::Bool,
        },
        UniformDecl {
            name: "u_distortion_on",
            kind: UniformKind::Bool,
        },
        UniformDecl {
            name: "u_color_shift_intensity",
            kind: UniformKind::Float,
        },
        UniformDecl {
            name: "u_distortion_intensity",
            kind: UniformKind::Float,
        },
        UniformDecl {
            name: "u_scanline_on",
            kind: UniformKind::Bool,
        },
        UniformDecl {
            name: "u_scanline_speed",
            kind: UniformKind::Float,
        },
        UniformDecl {
            name: "u_scanline_height",
            kind: UniformKind::Float,
        },
    ],
};

/// Runs the glitch program. The last applied config is kept beside the
/// program so unchanged configs only refresh the time uniform.
#[derive(Debug)]
pub struct GlitchProcessor {
    programs: ProgramManager,
    last_applied: Option<GlitchConfig>,
}

impl GlitchProcessor {
    pub fn new(surface: Box<dyn RenderSurface>) -> FxResult<Self> {
        let mut programs = ProgramManager::new(surface);
        programs.set_program(&GLITCH_PROGRAM)?;
        Ok(Self {
            programs,
            last_applied: None,
        })
    }

    pub fn open(backend: GpuBackend, width: u32, height: u32) -> FxResult<Self> {
        Self::new(open_surface(backend, width, height)?)
    }

    /// Set the playback time and, when it differs from the last one, the
    /// effect configuration.
    pub fn set_config(&mut self, config: &GlitchConfig, time: f64) -> FxResult<()> {
        self.programs
            .send_uniform("u_time", UniformValue::Float(time as f32))?;

        if self.last_applied.as_ref() == Some(config) {
            return Ok(());
        }

        let uniforms = [
            ("u_color_shift_on", UniformValue::Bool(config.color_shift_on)),
            ("u_distortion_on", UniformValue::Bool(config.distortion_on)),
            (
                "u_color_shift_intensity",
                UniformValue::Float(config.color_shift_intensity),
            ),
            (
                "u_distortion_intensity",
                UniformValue::Float(config.distortion_intensity),
            ),
            ("u_scanline_on", UniformValue::Bool(config.scanline_on)),
            ("u_scanline_speed", UniformValue::Float(config.scanline_speed)),
            (
                "u_scanline_height",
                UniformValue::Float(config.scanline_height),
            ),
        ];
        for (name, value) in uniforms {
            self.programs.send_uniform(name, value)?;
        }
        self.last_applied = Some(*config);
        tracing::debug!(?config, "Applied glitch config");
        Ok(())
    }

    pub fn render(&mut self, frame: &mut FrameBuffer) -> FxResult<()> {
        self.programs.render_frame(frame)?;
        Ok(())
    }

    /// Configure for `time` and render `frame` in place.
    pub fn apply(
        &mut self,
        frame: &mut FrameBuffer,
        config: &GlitchConfig,
        time: f64,
    ) -> FxResult<()> {
        self.set_config(config, time)?;
        self.render(frame)
    }

    pub fn programs(&self) -> &ProgramManager {
        &self.programs
    }

    pub fn size(&self) -> (u32, u32) {
        self.programs.size()
    }
}
