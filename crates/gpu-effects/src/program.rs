//! Shader programs and uniform management.
//!
//! Every program declares its uniforms in a table. The table fixes the layout
//! of the program's uniform block: each entry starts on a 16-byte slot, and
//! float arrays take `ceil(len / 4)` consecutive slots packed as `vec4<f32>`.
//! The WGSL `Params` struct of the program mirrors the table one to one.

use clipfx_common::{FxError, FxResult};
use clipfx_processing_core::FrameBuffer;

use crate::surface::RenderSurface;

/// Bytes per uniform slot.
pub const SLOT_BYTES: usize = 16;

/// Uniform every program must declare; set from the surface size.
pub const TEXTURE_SIZE_UNIFORM: &str = "u_texture_size";

/// Which fragment program family a shader belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectFamily {
    Convolution,
    Glitch,
}

/// Shape of a declared uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    /// Stored as an integer, 0 or 1.
    Bool,
    Vec2,
    Vec4,
    FloatArray(usize),
}

impl UniformKind {
    /// Number of 16-byte slots this uniform occupies.
    pub fn slots(self) -> usize {
        match self {
            UniformKind::FloatArray(len) => len.div_ceil(4).max(1),
            _ => 1,
        }
    }
}

/// One entry of a program's uniform table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub kind: UniformKind,
}

/// A compiled-on-demand fragment program.
#[derive(Debug)]
pub struct ShaderProgram {
    pub label: &'static str,
    pub family: EffectFamily,
    pub wgsl: &'static str,
    pub uniforms: &'static [UniformDecl],
}

impl ShaderProgram {
    /// Slot index and kind of the named uniform.
    pub fn uniform(&self, name: &str) -> Option<(usize, UniformKind)> {
        let mut slot = 0;
        for decl in self.uniforms {
            if decl.name == name {
                return Some((slot, decl.kind));
            }
            slot += decl.kind.slots();
        }
        None
    }

    pub fn slot_count(&self) -> usize {
        self.uniforms.iter().map(|d| d.kind.slots()).sum()
    }

    /// Size of the uniform block in bytes.
    pub fn block_size(&self) -> usize {
        self.slot_count() * SLOT_BYTES
    }
}

/// A value sent to a uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Bool(bool),
    Int(i32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
    FloatArray(Vec<f32>),
}

impl UniformValue {
    fn shape_name(&self) -> &'static str {
        match self {
            UniformValue::Float(_) => "float",
            UniformValue::Bool(_) => "bool",
            UniformValue::Int(_) => "int",
            UniformValue::Vec2(_) => "vec2",
            UniformValue::Vec4(_) => "vec4",
            UniformValue::FloatArray(_) => "float array",
        }
    }

    fn fits(&self, kind: UniformKind) -> bool {
        match (self, kind) {
            (UniformValue::Float(_), UniformKind::Float) => true,
            (UniformValue::Bool(_) | UniformValue::Int(_), UniformKind::Int | UniformKind::Bool) => {
                true
            }
            (UniformValue::Vec2(_), UniformKind::Vec2) => true,
            (UniformValue::Vec4(_), UniformKind::Vec4) => true,
            (UniformValue::FloatArray(values), UniformKind::FloatArray(len)) => {
                values.len() == len
            }
            _ => false,
        }
    }

    /// Slot-padded little-endian bytes.
    fn encode(&self) -> Vec<u8> {
        let words: Vec<u32> = match self {
            UniformValue::Float(v) => vec![v.to_bits(), 0, 0, 0],
            UniformValue::Bool(v) => vec![u32::from(*v), 0, 0, 0],
            UniformValue::Int(v) => vec![*v as u32, 0, 0, 0],
            UniformValue::Vec2([x, y]) => vec![x.to_bits(), y.to_bits(), 0, 0],
            UniformValue::Vec4(v) => v.iter().map(|f| f.to_bits()).collect(),
            UniformValue::FloatArray(values) => {
                let mut words: Vec<u32> = values.iter().map(|f| f.to_bits()).collect();
                words.resize(values.len().div_ceil(4).max(1) * 4, 0);
                words
            }
        };
        bytemuck::cast_slice(&words).to_vec()
    }
}

/// CPU-side copy of a uniform block, used by surfaces that evaluate
/// programs without a GPU.
#[derive(Debug, Clone, Default)]
pub struct UniformBlock {
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) -> FxResult<()> {
        let end = offset + data.len();
        if end > self.bytes.len() {
            return Err(FxError::config(format!(
                "uniform write {offset}..{end} overruns a {}-byte block",
                self.bytes.len()
            )));
        }
        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn word(&self, slot: usize, lane: usize) -> u32 {
        let i = slot * SLOT_BYTES + lane * 4;
        u32::from_le_bytes([
            self.bytes[i],
            self.bytes[i + 1],
            self.bytes[i + 2],
            self.bytes[i + 3],
        ])
    }

    pub fn read_f32(&self, slot: usize, lane: usize) -> f32 {
        f32::from_bits(self.word(slot, lane))
    }

    pub fn read_i32(&self, slot: usize, lane: usize) -> i32 {
        self.word(slot, lane) as i32
    }

    /// `len` floats packed from `slot` onwards.
    pub fn read_f32_array(&self, slot: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| self.read_f32(slot + i / 4, i % 4))
            .collect()
    }
}

/// Owns one render surface and the program currently linked on it.
pub struct ProgramManager {
    surface: Box<dyn RenderSurface>,
    program: Option<&'static ShaderProgram>,
    upload_count: u64,
}

impl ProgramManager {
    pub fn new(surface: Box<dyn RenderSurface>) -> Self {
        Self {
            surface,
            program: None,
            upload_count: 0,
        }
    }

    /// Compile and link `program`, replacing the previous one, then set its
    /// texture size uniform. Compilation is expensive; call this only when
    /// the effect family changes.
    pub fn set_program(&mut self, program: &'static ShaderProgram) -> FxResult<()> {
        if program.uniform(TEXTURE_SIZE_UNIFORM).is_none() {
            return Err(FxError::config(format!(
                "program {} does not declare {TEXTURE_SIZE_UNIFORM}",
                program.label
            )));
        }

        self.surface.compile(program)?;
        self.program = Some(program);
        tracing::debug!(
            program = program.label,
            backend = self.surface.name(),
            "Linked shader program"
        );

        let (width, height) = self.surface.size();
        self.send_uniform(
            TEXTURE_SIZE_UNIFORM,
            UniformValue::Vec2([width as f32, height as f32]),
        )
    }

    /// Write one uniform of the active program.
    pub fn send_uniform(&mut self, name: &str, value: UniformValue) -> FxResult<()> {
        let program = self
            .program
            .ok_or_else(|| FxError::config(format!("{name}: no shader program is linked")))?;

        let (slot, kind) = program.uniform(name).ok_or_else(|| {
            FxError::config(format!("{name} not found in shader program {}", program.label))
        })?;

        if !value.fits(kind) {
            return Err(FxError::config(format!(
                "{name} in {} is {kind:?}, got a {} value",
                program.label,
                value.shape_name()
            )));
        }

        self.surface.upload(slot * SLOT_BYTES, &value.encode())?;
        self.upload_count += 1;
        tracing::trace!(uniform = name, "Uploaded uniform");
        Ok(())
    }

    /// Run the active program over `frame`, overwriting its pixels with the
    /// result. Returns the new pixels.
    pub fn render_frame<'f>(&mut self, frame: &'f mut FrameBuffer) -> FxResult<&'f [u8]> {
        if self.program.is_none() {
            return Err(FxError::config("render requested with no shader program linked"));
        }
        let (width, height) = self.surface.size();
        if (frame.width, frame.height) != (width, height) {
            return Err(FxError::config(format!(
                "frame is {}x{} but the render surface is {width}x{height}",
                frame.width, frame.height
            )));
        }

        self.surface.render(frame)?;
        Ok(&frame.pixels)
    }

    /// Uniform uploads performed so far.
    pub fn upload_count(&self) -> u64 {
        self.upload_count
    }

    pub fn program(&self) -> Option<&'static ShaderProgram> {
        self.program
    }

    pub fn backend_name(&self) -> &'static str {
        self.surface.name()
    }

    pub fn size(&self) -> (u32, u32) {
        self.surface.size()
    }
}

impl std::fmt::Debug for ProgramManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramManager")
            .field("backend", &self.surface.name())
            .field("program", &self.program.map(|p| p.label))
            .field("upload_count", &self.upload_count)
            .finish()
    }
}
