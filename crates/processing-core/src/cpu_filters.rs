//! Pixel filters evaluated on the CPU.
//!
//! Every filter rewrites RGB in place and leaves alpha untouched.

use clipfx_project_model::{HueSatLightConfig, MosaicConfig};

use crate::color::{clamp, hsl_to_rgb, rgb_to_hsl, wrap_hue};
use crate::frame::{FrameBuffer, BYTES_PER_PIXEL};

/// BT.709 luma weights.
const LUMA_R: f64 = 0.2126;
const LUMA_G: f64 = 0.7152;
const LUMA_B: f64 = 0.0722;

fn to_level(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Replace RGB with BT.709 luminance.
pub fn apply_greyscale(frame: &mut FrameBuffer) {
    for px in frame.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        let luma = LUMA_R * px[0] as f64 + LUMA_G * px[1] as f64 + LUMA_B * px[2] as f64;
        let level = to_level(luma);
        px[0] = level;
        px[1] = level;
        px[2] = level;
    }
}

/// Shift hue, saturation and lightness by the configured deltas.
///
/// Hue wraps around the color wheel; saturation and lightness clamp to `[0, 1]`.
pub fn apply_hue_sat_light(frame: &mut FrameBuffer, config: &HueSatLightConfig) {
    for px in frame.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        let [h, s, l] = rgb_to_hsl(px[0], px[1], px[2]);
        let [r, g, b] = hsl_to_rgb(
            wrap_hue(h + config.hue),
            clamp(s + config.saturation, 0.0, 1.0),
            clamp(l + config.lightness, 0.0, 1.0),
        );
        px[0] = r;
        px[1] = g;
        px[2] = b;
    }
}

/// Replace each `block_size_x x block_size_y` tile with its mean color.
///
/// Tiles start at the top-left corner; tiles on the right and bottom edges
/// are clipped to the frame and averaged over their visible pixels.
pub fn apply_mosaic(frame: &mut FrameBuffer, config: &MosaicConfig) {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let bx = config.block_size_x.max(1) as usize;
    let by = config.block_size_y.max(1) as usize;

    for ty in (0..height).step_by(by) {
        let tile_h = by.min(height - ty);
        for tx in (0..width).step_by(bx) {
            let tile_w = bx.min(width - tx);

            let mut sum = [0u64; 3];
            for y in ty..ty + tile_h {
                for x in tx..tx + tile_w {
                    let i = (y * width + x) * BYTES_PER_PIXEL;
                    for c in 0..3 {
                        sum[c] += frame.pixels[i + c] as u64;
                    }
                }
            }

            let count = (tile_w * tile_h) as f64;
            let mean = sum.map(|s| to_level(s as f64 / count));
            for y in ty..ty + tile_h {
                for x in tx..tx + tile_w {
                    let i = (y * width + x) * BYTES_PER_PIXEL;
                    frame.pixels[i..i + 3].copy_from_slice(&mean);
                }
            }
        }
    }
}

/// Stretch each RGB channel independently so its maximum becomes 255.
/// Channels that are entirely zero stay zero.
pub fn normalize_channels(frame: &mut FrameBuffer) {
    let mut max = [0u8; 3];
    for px in frame.pixels.chunks_exact(BYTES_PER_PIXEL) {
        for c in 0..3 {
            max[c] = max[c].max(px[c]);
        }
    }

    let gain = max.map(|m| if m > 0 { 255.0 / m as f64 } else { 1.0 });
    if gain.iter().all(|g| *g == 1.0) {
        return;
    }

    for px in frame.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        for c in 0..3 {
            px[c] = to_level(px[c] as f64 * gain[c]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame_from(width: u32, height: u32, pixels: Vec<u8>) -> FrameBuffer {
        FrameBuffer::new(width, height, pixels).unwrap()
    }

    #[test]
    fn test_greyscale_uses_bt709() {
        let mut frame = FrameBuffer::filled(1, 1, [255, 0, 0, 200]);
        apply_greyscale(&mut frame);
        assert_eq!(frame.pixel(0, 0), [54, 54, 54, 200]);
    }

    #[test]
    fn test_hsl_zero_delta_is_near_identity() {
        let mut frame = frame_from(2, 1, vec![200, 40, 90, 255, 10, 250, 30, 7]);
        let original = frame.clone();
        apply_hue_sat_light(
            &mut frame,
            &HueSatLightConfig {
                hue: 0.0,
                saturation: 0.0,
                lightness: 0.0,
            },
        );
        for (a, b) in frame.pixels.iter().zip(&original.pixels) {
            assert!((*a as i16 - *b as i16).abs() <= 1);
        }
        assert_eq!(frame.pixels[7], 7);
    }

    #[test]
    fn test_hsl_desaturate_to_grey() {
        let mut frame = FrameBuffer::filled(1, 1, [255, 0, 0, 255]);
        apply_hue_sat_light(
            &mut frame,
            &HueSatLightConfig {
                hue: 0.0,
                saturation: -1.0,
                lightness: 0.0,
            },
        );
        assert_eq!(frame.pixel(0, 0), [128, 128, 128, 255]);
    }

    #[test]
    fn test_hue_rotation_wraps() {
        let mut frame = FrameBuffer::filled(1, 1, [0, 0, 255, 255]);
        apply_hue_sat_light(
            &mut frame,
            &HueSatLightConfig {
                hue: 1.0 / 3.0,
                saturation: 0.0,
                lightness: 0.0,
            },
        );
        assert_eq!(frame.pixel(0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_mosaic_averages_tiles() {
        #[rustfmt::skip]
        let mut frame = frame_from(3, 2, vec![
            0, 0, 0, 255,   10, 10, 10, 255,   100, 0, 0, 255,
            20, 20, 20, 255, 30, 30, 30, 255,  200, 0, 0, 255,
        ]);
        apply_mosaic(
            &mut frame,
            &MosaicConfig {
                block_size_x: 2,
                block_size_y: 2,
            },
        );
        assert_eq!(frame.pixel(0, 0), [15, 15, 15, 255]);
        assert_eq!(frame.pixel(1, 1), [15, 15, 15, 255]);
        // Right column is a clipped 1x2 tile.
        assert_eq!(frame.pixel(2, 0), [150, 0, 0, 255]);
        assert_eq!(frame.pixel(2, 1), [150, 0, 0, 255]);
    }

    #[test]
    fn test_mosaic_zero_block_is_treated_as_one() {
        let mut frame = frame_from(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let original = frame.clone();
        apply_mosaic(
            &mut frame,
            &MosaicConfig {
                block_size_x: 0,
                block_size_y: 0,
            },
        );
        assert_eq!(frame, original);
    }

    #[test]
    fn test_normalize_channels_per_channel() {
        let mut frame = frame_from(2, 1, vec![51, 0, 255, 255, 102, 0, 51, 255]);
        normalize_channels(&mut frame);
        assert_eq!(frame.pixel(0, 0), [128, 0, 255, 255]);
        assert_eq!(frame.pixel(1, 0), [255, 0, 51, 255]);
    }

    fn arb_frame() -> impl Strategy<Value = FrameBuffer> {
        (1u32..12, 1u32..12).prop_flat_map(|(w, h)| {
            proptest::collection::vec(any::<u8>(), (w * h * 4) as usize)
                .prop_map(move |pixels| FrameBuffer::new(w, h, pixels).unwrap())
        })
    }

    proptest! {
        #[test]
        fn greyscale_is_idempotent(frame in arb_frame()) {
            let mut once = frame.clone();
            apply_greyscale(&mut once);
            let mut twice = once.clone();
            apply_greyscale(&mut twice);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn mosaic_one_by_one_is_identity(frame in arb_frame()) {
            let mut out = frame.clone();
            apply_mosaic(&mut out, &MosaicConfig { block_size_x: 1, block_size_y: 1 });
            prop_assert_eq!(out, frame);
        }

        #[test]
        fn hue_shift_and_back_restores_frame(frame in arb_frame(), hue in -0.99f64..0.99) {
            let mut out = frame.clone();
            apply_hue_sat_light(&mut out, &HueSatLightConfig { hue, saturation: 0.0, lightness: 0.0 });
            apply_hue_sat_light(&mut out, &HueSatLightConfig { hue: -hue, saturation: 0.0, lightness: 0.0 });
            for (a, b) in out.pixels.chunks_exact(4).zip(frame.pixels.chunks_exact(4)) {
                for c in 0..3 {
                    prop_assert!((a[c] as i16 - b[c] as i16).abs() <= 1, "{:?} -> {:?}", b, a);
                }
                prop_assert_eq!(a[3], b[3]);
            }
        }

        #[test]
        fn filters_preserve_alpha(frame in arb_frame()) {
            let mut out = frame.clone();
            apply_greyscale(&mut out);
            apply_hue_sat_light(&mut out, &HueSatLightConfig::default());
            apply_mosaic(&mut out, &MosaicConfig::default());
            normalize_channels(&mut out);
            for (a, b) in out.pixels.chunks_exact(4).zip(frame.pixels.chunks_exact(4)) {
                prop_assert_eq!(a[3], b[3]);
            }
        }
    }
}
