//! Per-frame filter orchestration.
//!
//! Filters run in list order over a single frame. Masking filters
//! (`RectRange`, `GlobalRange`) replace the current pixel mask; every other
//! filter is dispatched to exactly one CPU or GPU implementation, after which
//! pixels outside the mask are restored byte for byte from the pre-filter
//! snapshot.

use clipfx_common::{FxResult, GpuBackend};
use clipfx_gpu_effects::{ConvolutionProcessor, GlitchProcessor};
use clipfx_processing_core::cpu_filters::{
    apply_greyscale, apply_hue_sat_light, apply_mosaic, normalize_channels,
};
use clipfx_processing_core::frame::BYTES_PER_PIXEL;
use clipfx_processing_core::{
    build_mask, gaussian_kernel, laplacian_kernel, FrameBuffer, KernelSpec, PixelMask,
};
use clipfx_project_model::{FilterConfig, FilterList};

/// What happened to a frame while its filters ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Pixel filters that ran.
    pub filters_applied: usize,
    /// Masks established by restriction filters.
    pub masks_built: usize,
    /// GPU render passes.
    pub gpu_passes: usize,
    /// Pixels restored from a snapshot, summed over filters.
    pub restored_pixels: usize,
}

/// Owns the GPU processors for one editing or export session.
///
/// Processors are opened on first use and reopened when the frame size
/// changes.
#[derive(Debug)]
pub struct FilterPipeline {
    backend: GpuBackend,
    convolution: Option<ConvolutionProcessor>,
    glitch: Option<GlitchProcessor>,
}

impl FilterPipeline {
    pub fn new(backend: GpuBackend) -> Self {
        Self {
            backend,
            convolution: None,
            glitch: None,
        }
    }

    pub fn backend(&self) -> GpuBackend {
        self.backend
    }

    /// Run every filter in `filters` over `frame` at `current_time` seconds.
    ///
    /// `scale_factor` maps zone rectangles from preview coordinates onto the
    /// frame; `None` uses them as-is.
    pub fn apply_filters(
        &mut self,
        frame: &mut FrameBuffer,
        filters: &FilterList,
        current_time: f64,
        scale_factor: Option<f64>,
    ) -> FxResult<FrameStats> {
        let mut stats = FrameStats::default();
        let mut mask = PixelMask::all(frame.width, frame.height, true);

        for filter in filters {
            if let Some(next) = build_mask(
                frame.width,
                frame.height,
                &filter.config,
                current_time,
                scale_factor,
            ) {
                tracing::trace!(
                    filter = %filter.id,
                    selected = next.count_true(),
                    "Mask replaced"
                );
                mask = next;
                stats.masks_built += 1;
                continue;
            }

            let snapshot = if mask.is_all_true() {
                None
            } else {
                Some(frame.pixels.clone())
            };

            stats.gpu_passes += self.dispatch(frame, &filter.config, current_time)?;
            stats.filters_applied += 1;

            if let Some(snapshot) = snapshot {
                stats.restored_pixels += restore_unmasked(frame, &snapshot, &mask);
            }
        }

        Ok(stats)
    }

    /// Run one pixel filter. Returns the number of GPU passes it took.
    fn dispatch(
        &mut self,
        frame: &mut FrameBuffer,
        config: &FilterConfig,
        current_time: f64,
    ) -> FxResult<usize> {
        match config {
            FilterConfig::Mosaic(cfg) => {
                apply_mosaic(frame, cfg);
                Ok(0)
            }
            FilterConfig::Greyscale => {
                apply_greyscale(frame);
                Ok(0)
            }
            FilterConfig::HueSatLight(cfg) => {
                apply_hue_sat_light(frame, cfg);
                Ok(0)
            }
            FilterConfig::Gaussian(cfg) => {
                let kernel = gaussian_kernel(cfg.kernel_size as usize, cfg.sigma)?;
                self.convolve(frame, &kernel, false)?;
                Ok(1)
            }
            FilterConfig::Laplacian(cfg) => {
                let kernel = laplacian_kernel(cfg.kernel_size as usize, false);
                self.convolve(frame, &kernel, false)?;
                Ok(1)
            }
            FilterConfig::Edge => {
                self.convolve(frame, &laplacian_kernel(3, true), true)?;
                normalize_channels(frame);
                Ok(1)
            }
            FilterConfig::Glitch(cfg) => {
                let glitch = self.glitch_for(frame.width, frame.height)?;
                glitch.apply(frame, cfg, current_time)?;
                Ok(1)
            }
            // Handled by the mask step in `apply_filters`.
            FilterConfig::RectRange(_) | FilterConfig::GlobalRange => Ok(0),
        }
    }

    fn convolve(
        &mut self,
        frame: &mut FrameBuffer,
        kernel: &KernelSpec,
        rectify: bool,
    ) -> FxResult<()> {
        let conv = self.convolution_for(frame.width, frame.height)?;
        conv.set_rectify(rectify)?;
        conv.apply(frame, kernel)
    }

    fn convolution_for(&mut self, width: u32, height: u32) -> FxResult<&mut ConvolutionProcessor> {
        let conv = match self.convolution.take() {
            Some(conv) if conv.size() == (width, height) => conv,
            previous => {
                if previous.is_some() {
                    tracing::debug!(width, height, "Frame size changed, reopening convolution surface");
                }
                let conv = ConvolutionProcessor::open(self.backend, width, height)?;
                tracing::debug!(
                    backend = conv.programs().backend_name(),
                    width,
                    height,
                    "Opened convolution processor"
                );
                conv
            }
        };
        Ok(self.convolution.insert(conv))
    }

    fn glitch_for(&mut self, width: u32, height: u32) -> FxResult<&mut GlitchProcessor> {
        let glitch = match self.glitch.take() {
            Some(glitch) if glitch.size() == (width, height) => glitch,
            previous => {
                if previous.is_some() {
                    tracing::debug!(width, height, "Frame size changed, reopening glitch surface");
                }
                let glitch = GlitchProcessor::open(self.backend, width, height)?;
                tracing::debug!(
                    backend = glitch.programs().backend_name(),
                    width,
                    height,
                    "Opened glitch processor"
                );
                glitch
            }
        };
        Ok(self.glitch.insert(glitch))
    }

    /// Convolution processor, if one has been opened.
    pub fn convolution(&self) -> Option<&ConvolutionProcessor> {
        self.convolution.as_ref()
    }

    /// Glitch processor, if one has been opened.
    pub fn glitch(&self) -> Option<&GlitchProcessor> {
        self.glitch.as_ref()
    }
}

/// Copy every byte of each pixel outside `mask` back from `snapshot`.
fn restore_unmasked(frame: &mut FrameBuffer, snapshot: &[u8], mask: &PixelMask) -> usize {
    let mut restored = 0;
    for (idx, (px, before)) in frame
        .pixels
        .chunks_exact_mut(BYTES_PER_PIXEL)
        .zip(snapshot.chunks_exact(BYTES_PER_PIXEL))
        .enumerate()
    {
        if !mask.get(idx) {
            px.copy_from_slice(before);
            restored += 1;
        }
    }
    restored
}
