//! Per-pixel zone masks.
//!
//! A mask entry of `true` lets a filter's output through; `false` restores
//! the pixel's color from before the filter ran.

use clipfx_project_model::{FilterConfig, RangeConfig, ZoneRect};

/// Row-major boolean mask with one entry per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl PixelMask {
    /// A mask with every entry set to `value`.
    pub fn all(width: u32, height: u32, value: bool) -> Self {
        Self {
            width,
            height,
            bits: vec![value; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Entry for the pixel at flat index `index`.
    pub fn get(&self, index: usize) -> bool {
        self.bits[index]
    }

    pub fn get_xy(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn count_true(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn is_all_true(&self) -> bool {
        self.bits.iter().all(|b| *b)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Set every pixel covered by `rect` (clipped to the mask) to `true`.
    pub fn fill_rect(&mut self, rect: &ZoneRect) {
        let Some((x0, y0, x1, y1)) = rect.pixel_bounds(self.width, self.height) else {
            return;
        };
        let stride = self.width as usize;
        for y in y0 as usize..y1 as usize {
            self.bits[y * stride + x0 as usize..y * stride + x1 as usize].fill(true);
        }
    }
}

/// Map a preview-space rect onto output coordinates. `None` leaves the rect
/// unchanged.
pub fn scale_rect(rect: &ZoneRect, scale_factor: Option<f64>) -> ZoneRect {
    match scale_factor {
        Some(factor) => rect.scaled(factor),
        None => *rect,
    }
}

/// Build the mask a masking filter establishes at `current_time`.
///
/// Returns `None` for pixel filters, which leave the current mask in place.
pub fn build_mask(
    width: u32,
    height: u32,
    config: &FilterConfig,
    current_time: f64,
    scale_factor: Option<f64>,
) -> Option<PixelMask> {
    match config {
        FilterConfig::RectRange(range) => Some(rect_range_mask(
            width,
            height,
            range,
            current_time,
            scale_factor,
        )),
        FilterConfig::GlobalRange => Some(PixelMask::all(width, height, true)),
        FilterConfig::Mosaic(_)
        | FilterConfig::Greyscale
        | FilterConfig::HueSatLight(_)
        | FilterConfig::Gaussian(_)
        | FilterConfig::Laplacian(_)
        | FilterConfig::Edge
        | FilterConfig::Glitch(_) => None,
    }
}

/// Union of every zone active at `current_time`. No active zone yields an
/// all-false mask.
pub fn rect_range_mask(
    width: u32,
    height: u32,
    range: &RangeConfig,
    current_time: f64,
    scale_factor: Option<f64>,
) -> PixelMask {
    let mut mask = PixelMask::all(width, height, false);
    let mut active = 0usize;
    for zone in range.active_zones(current_time) {
        mask.fill_rect(&scale_rect(&zone.zone, scale_factor));
        active += 1;
    }
    tracing::trace!(
        time = current_time,
        zones = active,
        "Built zone mask"
    );
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipfx_project_model::{TimeInterval, ZoneRange};

    fn range_with(zones: &[(f64, f64, ZoneRect)]) -> FilterConfig {
        FilterConfig::RectRange(RangeConfig {
            range_list: zones
                .iter()
                .map(|(start, end, rect)| ZoneRange::new(TimeInterval::new(*start, *end), *rect))
                .collect(),
        })
    }

    #[test]
    fn test_global_range_is_all_true() {
        let mask = build_mask(4, 3, &FilterConfig::GlobalRange, 10.0, None).unwrap();
        assert_eq!(mask.len(), 12);
        assert!(mask.is_all_true());
    }

    #[test]
    fn test_pixel_filters_leave_mask_alone() {
        assert!(build_mask(4, 3, &FilterConfig::Greyscale, 0.0, None).is_none());
    }

    #[test]
    fn test_empty_range_is_all_false() {
        let mask = build_mask(4, 3, &range_with(&[]), 0.0, None).unwrap();
        assert_eq!(mask.count_true(), 0);
    }

    #[test]
    fn test_rect_range_fills_active_zone() {
        let config = range_with(&[(0.0, 1.0, ZoneRect::new(1.0, 1.0, 2.0, 1.0))]);
        let mask = build_mask(4, 3, &config, 1.0, None).unwrap();
        assert_eq!(mask.count_true(), 2);
        assert!(mask.get_xy(1, 1));
        assert!(mask.get_xy(2, 1));
        assert!(!mask.get_xy(3, 1));
        assert!(!mask.get_xy(1, 2));

        let later = build_mask(4, 3, &config, 1.5, None).unwrap();
        assert_eq!(later.count_true(), 0);
    }

    #[test]
    fn test_rect_range_union_and_clip() {
        let config = range_with(&[
            (0.0, 5.0, ZoneRect::new(0.0, 0.0, 1.0, 1.0)),
            (0.0, 5.0, ZoneRect::new(3.0, 2.0, 10.0, 10.0)),
        ]);
        let mask = build_mask(4, 3, &config, 2.0, None).unwrap();
        assert_eq!(mask.count_true(), 2);
        assert!(mask.get_xy(0, 0));
        assert!(mask.get_xy(3, 2));
    }

    #[test]
    fn test_scale_factor_applies_to_rects() {
        let config = range_with(&[(0.0, 1.0, ZoneRect::new(10.0, 10.0, 20.0, 20.0))]);
        let mask = build_mask(100, 100, &config, 0.5, Some(2.0)).unwrap();
        assert_eq!(mask.count_true(), 40 * 40);
        assert!(mask.get_xy(20, 20));
        assert!(mask.get_xy(59, 59));
        assert!(!mask.get_xy(60, 59));
        assert!(!mask.get_xy(19, 20));
    }
}
