//! CPU render surface.
//!
//! Evaluates the built-in programs per pixel with the same sampling rules as
//! the wgpu surface: bilinear filtering, clamp-to-edge addressing, texture
//! coordinates running top to bottom, and 8-bit unorm output.

use clipfx_common::{FxError, FxResult};
use clipfx_processing_core::kernel::MAX_KERNEL_SIZE;
use clipfx_processing_core::FrameBuffer;

use super::RenderSurface;
use crate::program::{EffectFamily, ShaderProgram, UniformBlock, UniformKind};

/// Render surface that needs no GPU.
#[derive(Debug)]
pub struct SoftwareSurface {
    width: u32,
    height: u32,
    program: Option<&'static ShaderProgram>,
    block: UniformBlock,
}

impl SoftwareSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            program: None,
            block: UniformBlock::default(),
        }
    }

    fn linked(&self) -> FxResult<&'static ShaderProgram> {
        self.program
            .ok_or_else(|| FxError::config("render with no program linked"))
    }

    fn slot(&self, name: &str, expected: fn(UniformKind) -> bool) -> FxResult<usize> {
        let program = self.linked()?;
        match program.uniform(name) {
            Some((slot, kind)) if expected(kind) => Ok(slot),
            Some((_, kind)) => Err(FxError::config(format!(
                "{name} in {} has unexpected kind {kind:?}",
                program.label
            ))),
            None => Err(FxError::config(format!(
                "{name} not found in shader program {}",
                program.label
            ))),
        }
    }

    fn float(&self, name: &str) -> FxResult<f32> {
        let slot = self.slot(name, |k| k == UniformKind::Float)?;
        Ok(self.block.read_f32(slot, 0))
    }

    fn int(&self, name: &str) -> FxResult<i32> {
        let slot = self.slot(name, |k| matches!(k, UniformKind::Int | UniformKind::Bool))?;
        Ok(self.block.read_i32(slot, 0))
    }

    fn flag(&self, name: &str) -> FxResult<bool> {
        Ok(self.int(name)? != 0)
    }

    fn vec2(&self, name: &str) -> FxResult<[f32; 2]> {
        let slot = self.slot(name, |k| k == UniformKind::Vec2)?;
        Ok([self.block.read_f32(slot, 0), self.block.read_f32(slot, 1)])
    }

    fn float_array(&self, name: &str) -> FxResult<Vec<f32>> {
        let program = self.linked()?;
        match program.uniform(name) {
            Some((slot, UniformKind::FloatArray(len))) => Ok(self.block.read_f32_array(slot, len)),
            _ => Err(FxError::config(format!(
                "{name} is not a float array in {}",
                program.label
            ))),
        }
    }

    fn convolve(&self, frame: &mut FrameBuffer) -> FxResult<()> {
        let size = self.int("u_kernel_size")?;
        let rectify = self.flag("u_rectify")?;
        let kernel = self.float_array("u_kernel")?;
        let source = Texture::new(frame);

        let size = size.clamp(0, MAX_KERNEL_SIZE as i32);
        let radius = size / 2;
        let mut out = Vec::with_capacity(frame.pixels.len());
        for y in 0..frame.height as i32 {
            for x in 0..frame.width as i32 {
                let mut sum = [0.0f32; 4];
                for j in 0..size {
                    for i in 0..size {
                        let weight = kernel[(j as usize) * MAX_KERNEL_SIZE + i as usize];
                        let texel = source.texel(x + i - radius, y + j - radius);
                        for c in 0..4 {
                            sum[c] += texel[c] * weight;
                        }
                    }
                }
                if rectify {
                    sum = sum.map(f32::abs);
                }
                sum[3] = 1.0;
                out.extend(sum.map(to_unorm));
            }
        }
        frame.pixels = out;
        Ok(())
    }

    fn glitch(&self, frame: &mut FrameBuffer) -> FxResult<()> {
        let params = GlitchParams {
            texture_size: self.vec2("u_texture_size")?,
            time: self.float("u_time")?,
            color_shift_on: self.flag("u_color_shift_on")?,
            distortion_on: self.flag("u_distortion_on")?,
            color_shift_intensity: self.float("u_color_shift_intensity")?,
            distortion_intensity: self.float("u_distortion_intensity")?,
            scanline_on: self.flag("u_scanline_on")?,
            scanline_speed: self.float("u_scanline_speed")?,
            scanline_height: self.float("u_scanline_height")?,
        };
        let source = Texture::new(frame);

        let mut out = Vec::with_capacity(frame.pixels.len());
        for y in 0..frame.height {
            for x in 0..frame.width {
                let color = params.shade(&source, x as f32 + 0.5, y as f32 + 0.5);
                out.extend(color.map(to_unorm));
            }
        }
        frame.pixels = out;
        Ok(())
    }
}

impl RenderSurface for SoftwareSurface {
    fn name(&self) -> &'static str {
        "software"
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn compile(&mut self, program: &'static ShaderProgram) -> FxResult<()> {
        for entry in ["fn vs_main", "fn fs_main"] {
            if !program.wgsl.contains(entry) {
                return Err(FxError::config(format!(
                    "shader program {} has no `{entry}` entry point",
                    program.label
                )));
            }
        }
        if let Some(decl) = program
            .uniforms
            .iter()
            .find(|decl| !program.wgsl.contains(decl.name))
        {
            return Err(FxError::config(format!(
                "uniform {} is not declared in the {} shader source",
                decl.name, program.label
            )));
        }

        self.program = Some(program);
        self.block = UniformBlock::zeroed(program.block_size());
        Ok(())
    }

    fn upload(&mut self, offset: usize, bytes: &[u8]) -> FxResult<()> {
        self.linked()?;
        self.block.write(offset, bytes)
    }

    fn render(&mut self, frame: &mut FrameBuffer) -> FxResult<()> {
        match self.linked()?.family {
            EffectFamily::Convolution => self.convolve(frame),
            EffectFamily::Glitch => self.glitch(frame),
        }
    }
}

fn to_unorm(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Read-only normalized view of the input frame.
struct Texture {
    width: i32,
    height: i32,
    texels: Vec<[f32; 4]>,
}

impl Texture {
    fn new(frame: &FrameBuffer) -> Self {
        Self {
            width: frame.width as i32,
            height: frame.height as i32,
            texels: frame
                .pixels
                .chunks_exact(4)
                .map(|px| {
                    [
                        px[0] as f32 / 255.0,
                        px[1] as f32 / 255.0,
                        px[2] as f32 / 255.0,
                        px[3] as f32 / 255.0,
                    ]
                })
                .collect(),
        }
    }

    /// Texel with clamp-to-edge addressing.
    fn texel(&self, x: i32, y: i32) -> [f32; 4] {
        let x = x.clamp(0, self.width - 1);
        let y = y.clamp(0, self.height - 1);
        self.texels[(y * self.width + x) as usize]
    }

    /// Bilinear sample at normalized coordinates.
    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let x = u * self.width as f32 - 0.5;
        let y = v * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i32, y0 as i32);

        let a = self.texel(x0, y0);
        let b = self.texel(x0 + 1, y0);
        let c = self.texel(x0, y0 + 1);
        let d = self.texel(x0 + 1, y0 + 1);

        let mut out = [0.0; 4];
        for i in 0..4 {
            let top = a[i] + (b[i] - a[i]) * fx;
            let bottom = c[i] + (d[i] - c[i]) * fx;
            out[i] = top + (bottom - top) * fy;
        }
        out
    }
}

/// GLSL-style modulo: the result takes the sign of `y`.
fn glsl_mod(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}

/// Band-limited noise along `y`, animated by `t`.
pub(crate) fn glitch_noise(y: f32, t: f32) -> f32 {
    let mut n = (y * 0.07 + t * 8.0 + (y * 0.5 + t * 10.0).sin()).sin()
        + (y * 0.7 + t * 2.0 + (y * 0.3 + t * 8.0).sin()).sin() * 0.7
        + (y * 1.1 + t * 2.8).sin() * 0.4;
    n += (y * 124.0 + t * 100.7).sin() * (y * 877.0 - t * 38.8).sin() * 0.3;
    n
}

struct GlitchParams {
    texture_size: [f32; 2],
    time: f32,
    color_shift_on: bool,
    distortion_on: bool,
    color_shift_intensity: f32,
    distortion_intensity: f32,
    scanline_on: bool,
    scanline_speed: f32,
    scanline_height: f32,
}

impl GlitchParams {
    /// Mirrors `fs_main` in glitch.wgsl for the fragment at pixel centre
    /// `(fx, fy)`.
    fn shade(&self, source: &Texture, fx: f32, fy: f32) -> [f32; 4] {
        let uv = [fx / self.texture_size[0], fy / self.texture_size[1]];
        let mut uv_r = uv;
        let mut uv_g = uv;
        let mut uv_b = uv;

        let t = glsl_mod(self.time * 0.5, 30.0);

        if self.distortion_on {
            let intensity = self.distortion_intensity;
            let noise_y = glitch_noise(uv[1], t);
            let strong_threshold = 2.5 - intensity * 1.5;
            let amount = if noise_y.abs() > strong_threshold || intensity > 0.5 {
                (2.0 + intensity * 5.0) / self.texture_size[0]
            } else {
                0.02 * intensity
            };
            uv_r[0] += amount * noise_y;
            uv_g[0] += amount * glitch_noise(uv[1], t + 1.0) * 0.8;
            uv_b[0] += amount * glitch_noise(uv[1], t + 2.0) * 0.6;
        }

        if self.color_shift_on {
            let offset = 0.01 * self.color_shift_intensity * (1.0 + (self.time * 0.3).sin());
            uv_g[1] += offset;
            uv_b[1] -= offset;
        }

        let mut color = [
            source.sample(uv_r[0], uv_r[1])[0],
            source.sample(uv_g[0], uv_g[1])[1],
            source.sample(uv_b[0], uv_b[1])[2],
            1.0,
        ];

        if self.scanline_on {
            let rolling = glsl_mod(
                uv[1] - self.scanline_speed * self.time,
                self.scanline_height * 4.0,
            );
            if rolling > 0.0 && rolling < self.scanline_height {
                for c in color.iter_mut().take(3) {
                    *c *= 0.2;
                }
            }
        }

        if glitch_noise(t, 0.3) > 2.0 && self.color_shift_intensity > 0.5 {
            for c in color.iter_mut().take(3) {
                *c += 0.2;
            }
        }

        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glsl_mod_sign_follows_divisor() {
        assert!((glsl_mod(-0.25, 1.0) - 0.75).abs() < 1e-6);
        assert!((glsl_mod(31.0, 30.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_sample_hits_texel_centres() {
        let mut frame = FrameBuffer::filled(2, 1, [0, 0, 0, 255]);
        frame.set_pixel(1, 0, [255, 255, 255, 255]);
        let texture = Texture::new(&frame);

        assert_eq!(texture.sample(0.25, 0.5)[0], 0.0);
        assert_eq!(texture.sample(0.75, 0.5)[0], 1.0);
        assert!((texture.sample(0.5, 0.5)[0] - 0.5).abs() < 1e-6);
        // Clamp to edge.
        assert_eq!(texture.sample(-1.0, 0.5)[0], 0.0);
        assert_eq!(texture.sample(2.0, 0.5)[0], 1.0);
    }

    #[test]
    fn test_compile_rejects_program_missing_uniform_source() {
        static BROKEN: ShaderProgram = ShaderProgram {
            label: "broken",
            family: EffectFamily::Glitch,
            wgsl: "fn vs_main() {} fn fs_main() {}",
            uniforms: &[crate::program::UniformDecl {
                name: "u_texture_size",
                kind: UniformKind::Vec2,
            }],
        };
        let mut surface = SoftwareSurface::new(2, 2);
        assert!(matches!(
            surface.compile(&BROKEN),
            Err(FxError::Configuration { .. })
        ));
    }

    #[test]
    fn test_upload_without_program_fails() {
        let mut surface = SoftwareSurface::new(2, 2);
        assert!(surface.upload(0, &[0; 16]).is_err());
    }
}
