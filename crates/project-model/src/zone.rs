//! Zone geometry for range-restricted filters.
//!
//! Rectangles are axis-aligned and expressed in preview pixel coordinates.
//! A rectangle covers `x ∈ [left, left + width)` and `y ∈ [top, top + height)`.

use serde::{Deserialize, Serialize};

/// Closed time interval in seconds. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: f64,
    pub end: f64,
}

impl TimeInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `t` falls inside the interval.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ZoneRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Map preview coordinates onto another resolution. Every component is
    /// multiplied and rounded independently.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            left: (self.left * factor).round(),
            top: (self.top * factor).round(),
            width: (self.width * factor).round(),
            height: (self.height * factor).round(),
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Pixel index bounds `(x0, y0, x1, y1)` (end-exclusive) of this rect
    /// clipped to a `width x height` frame. `None` when nothing is covered.
    pub fn pixel_bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clip = |v: f64, max: u32| -> u32 {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v.ceil() as u64).min(max as u64) as u32
            }
        };

        let x0 = clip(self.left, width);
        let y0 = clip(self.top, height);
        let x1 = clip(self.right(), width);
        let y1 = clip(self.bottom(), height);

        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1, y1))
    }

    /// Whether a pixel coordinate lies inside the rect.
    pub fn contains_pixel(&self, x: u32, y: u32) -> bool {
        let (x, y) = (x as f64, y as f64);
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }
}

/// A rectangle active during a time interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneRange {
    pub range: TimeInterval,
    pub zone: ZoneRect,
}

impl ZoneRange {
    pub fn new(range: TimeInterval, zone: ZoneRect) -> Self {
        Self { range, zone }
    }

    pub fn is_active(&self, t: f64) -> bool {
        self.range.contains(t)
    }
}

/// Configuration of a rectangle-restriction filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeConfig {
    #[serde(default)]
    pub range_list: Vec<ZoneRange>,
}

impl RangeConfig {
    /// Zones whose interval contains `t`, in list order.
    pub fn active_zones(&self, t: f64) -> impl Iterator<Item = &ZoneRange> + '_ {
        self.range_list.iter().filter(move |zone| zone.is_active(t))
    }

    /// Add the default zone for a new selection made at `t`: a rect covering
    /// the central half of the canvas, active for one second or until the
    /// end of the edit range, whichever comes first.
    pub fn add_zone_at(&mut self, t: f64, edit_end: f64, canvas_width: f64, canvas_height: f64) {
        let end = if edit_end > t + 1.0 { t + 1.0 } else { edit_end };
        self.range_list.push(ZoneRange {
            range: TimeInterval::new(t, end),
            zone: ZoneRect::new(
                canvas_width / 4.0,
                canvas_height / 4.0,
                canvas_width / 2.0,
                canvas_height / 2.0,
            ),
        });
    }

    /// Remove the zone at `index`, returning it.
    pub fn remove_zone(&mut self, index: usize) -> Option<ZoneRange> {
        if index < self.range_list.len() {
            Some(self.range_list.remove(index))
        } else {
            None
        }
    }
}
