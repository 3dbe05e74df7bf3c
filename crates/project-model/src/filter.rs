//! The filter catalog.
//!
//! Filters form a closed set. Each kind carries exactly one configuration
//! payload type, so the kind is always derived from the configuration and
//! the two can never disagree.

use serde::{Deserialize, Serialize};

use crate::project::ProjectError;
use crate::zone::RangeConfig;

/// Largest supported convolution kernel edge.
pub const MAX_KERNEL_SIZE: usize = 25;

/// Every filter kind the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Mosaic,
    Greyscale,
    HueSatLight,
    Gaussian,
    Laplacian,
    Edge,
    Glitch,
    RectRange,
    GlobalRange,
}

impl FilterKind {
    pub const ALL: [FilterKind; 9] = [
        FilterKind::Mosaic,
        FilterKind::Greyscale,
        FilterKind::HueSatLight,
        FilterKind::Gaussian,
        FilterKind::Laplacian,
        FilterKind::Edge,
        FilterKind::Glitch,
        FilterKind::RectRange,
        FilterKind::GlobalRange,
    ];

    /// Stable identifier used in filter ids and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Mosaic => "mosaic",
            FilterKind::Greyscale => "greyscale",
            FilterKind::HueSatLight => "hue_sat_light",
            FilterKind::Gaussian => "gaussian",
            FilterKind::Laplacian => "laplacian",
            FilterKind::Edge => "edge",
            FilterKind::Glitch => "glitch",
            FilterKind::RectRange => "rect_range",
            FilterKind::GlobalRange => "global_range",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            FilterKind::Mosaic => "Mosaic",
            FilterKind::Greyscale => "Greyscale",
            FilterKind::HueSatLight => "Hue / Saturation / Lightness",
            FilterKind::Gaussian => "Gaussian Blur",
            FilterKind::Laplacian => "Laplacian Sharpen",
            FilterKind::Edge => "Edge Detection",
            FilterKind::Glitch => "Glitch",
            FilterKind::RectRange => "Range: Rectangle",
            FilterKind::GlobalRange => "Range: Restore Global",
        }
    }

    /// Masking kinds only reshape the zone mask; they never touch pixels.
    pub fn is_masking(self) -> bool {
        matches!(self, FilterKind::RectRange | FilterKind::GlobalRange)
    }

    /// Kinds rendered by a GPU processor.
    pub fn uses_gpu(self) -> bool {
        matches!(
            self,
            FilterKind::Gaussian | FilterKind::Laplacian | FilterKind::Edge | FilterKind::Glitch
        )
    }

    pub fn default_config(self) -> FilterConfig {
        match self {
            FilterKind::Mosaic => FilterConfig::Mosaic(MosaicConfig::default()),
            FilterKind::Greyscale => FilterConfig::Greyscale,
            FilterKind::HueSatLight => FilterConfig::HueSatLight(HueSatLightConfig::default()),
            FilterKind::Gaussian => FilterConfig::Gaussian(GaussianConfig::default()),
            FilterKind::Laplacian => FilterConfig::Laplacian(LaplacianConfig::default()),
            FilterKind::Edge => FilterConfig::Edge,
            FilterKind::Glitch => FilterConfig::Glitch(GlitchConfig::default()),
            FilterKind::RectRange => FilterConfig::RectRange(RangeConfig::default()),
            FilterKind::GlobalRange => FilterConfig::GlobalRange,
        }
    }
}

impl std::str::FromStr for FilterKind {
    type Err = ProjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProjectError::ValidationError {
                message: format!("Unknown filter kind: {s}"),
            })
    }
}

/// Block-averaging mosaic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicConfig {
    pub block_size_x: u32,
    pub block_size_y: u32,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            block_size_x: 10,
            block_size_y: 10,
        }
    }
}

/// Additive HSL adjustment. Each delta is applied in `[0, 1]` HSL space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HueSatLightConfig {
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
}

impl Default for HueSatLightConfig {
    fn default() -> Self {
        Self {
            hue: 0.0,
            saturation: -0.1,
            lightness: -0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianConfig {
    pub kernel_size: u32,
    pub sigma: f64,
}

impl Default for GaussianConfig {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            sigma: 2.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaplacianConfig {
    pub kernel_size: u32,
}

impl Default for LaplacianConfig {
    fn default() -> Self {
        Self { kernel_size: 3 }
    }
}

/// Procedural glitch parameters. Intensities are expected in `[0, 1]`.
///
/// Compared by value: the glitch processor keeps the last applied copy and
/// re-uploads only when a field differs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlitchConfig {
    pub distortion_on: bool,
    pub distortion_intensity: f32,
    pub color_shift_on: bool,
    pub color_shift_intensity: f32,
    pub scanline_on: bool,
    /// Scanline travel in normalized heights per second.
    pub scanline_speed: f32,
    /// Scanline band height (normalized).
    pub scanline_height: f32,
}

impl Default for GlitchConfig {
    fn default() -> Self {
        Self {
            distortion_on: true,
            distortion_intensity: 0.3,
            color_shift_on: true,
            color_shift_intensity: 0.3,
            scanline_on: false,
            scanline_speed: 0.1,
            scanline_height: 0.02,
        }
    }
}

/// Per-kind configuration payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterConfig {
    Mosaic(MosaicConfig),
    Greyscale,
    HueSatLight(HueSatLightConfig),
    Gaussian(GaussianConfig),
    Laplacian(LaplacianConfig),
    Edge,
    Glitch(GlitchConfig),
    RectRange(RangeConfig),
    GlobalRange,
}

impl FilterConfig {
    pub fn kind(&self) -> FilterKind {
        match self {
            FilterConfig::Mosaic(_) => FilterKind::Mosaic,
            FilterConfig::Greyscale => FilterKind::Greyscale,
            FilterConfig::HueSatLight(_) => FilterKind::HueSatLight,
            FilterConfig::Gaussian(_) => FilterKind::Gaussian,
            FilterConfig::Laplacian(_) => FilterKind::Laplacian,
            FilterConfig::Edge => FilterKind::Edge,
            FilterConfig::Glitch(_) => FilterKind::Glitch,
            FilterConfig::RectRange(_) => FilterKind::RectRange,
            FilterConfig::GlobalRange => FilterKind::GlobalRange,
        }
    }

    /// Human-readable problems with this configuration. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = vec![];
        match self {
            FilterConfig::Mosaic(cfg) => {
                if cfg.block_size_x == 0 || cfg.block_size_y == 0 {
                    problems.push("mosaic block sizes must be at least 1".to_string());
                }
            }
            FilterConfig::HueSatLight(cfg) => {
                for (name, value) in [
                    ("hue", cfg.hue),
                    ("saturation", cfg.saturation),
                    ("lightness", cfg.lightness),
                ] {
                    if !(-1.0..=1.0).contains(&value) {
                        problems.push(format!("{name} delta {value} is outside [-1, 1]"));
                    }
                }
            }
            FilterConfig::Gaussian(cfg) => {
                let size = cfg.kernel_size as usize;
                if size == 0 || size % 2 == 0 || size > MAX_KERNEL_SIZE {
                    problems.push(format!(
                        "gaussian kernel size {size} must be odd and at most {MAX_KERNEL_SIZE}"
                    ));
                }
                if cfg.sigma <= 0.0 || !cfg.sigma.is_finite() {
                    problems.push(format!("gaussian sigma {} must be positive", cfg.sigma));
                }
            }
            FilterConfig::Laplacian(cfg) => {
                if cfg.kernel_size == 0 {
                    problems.push("laplacian kernel size must be at least 1".to_string());
                }
            }
            FilterConfig::Glitch(cfg) => {
                for (name, value) in [
                    ("distortion_intensity", cfg.distortion_intensity),
                    ("color_shift_intensity", cfg.color_shift_intensity),
                ] {
                    if !(0.0..=1.0).contains(&value) {
                        problems.push(format!("{name} {value} is outside [0, 1]"));
                    }
                }
                if cfg.scanline_height <= 0.0 {
                    problems.push("scanline_height must be positive".to_string());
                }
            }
            FilterConfig::RectRange(cfg) => {
                for (i, zone) in cfg.range_list.iter().enumerate() {
                    if zone.range.start > zone.range.end {
                        problems.push(format!(
                            "zone {i}: interval [{}, {}] is reversed",
                            zone.range.start, zone.range.end
                        ));
                    }
                    if zone.zone.width < 0.0 || zone.zone.height < 0.0 {
                        problems.push(format!("zone {i}: rect has negative size"));
                    }
                }
            }
            FilterConfig::Greyscale | FilterConfig::Edge | FilterConfig::GlobalRange => {}
        }
        problems
    }
}

/// A configured filter in the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub id: String,
    pub config: FilterConfig,
}

impl Filter {
    pub fn kind(&self) -> FilterKind {
        self.config.kind()
    }
}

/// Ordered filter list. Later filters composite on top of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterList {
    #[serde(default)]
    filters: Vec<Filter>,

    /// Currently selected filter, the only one whose config may change.
    #[serde(default)]
    active_index: Option<usize>,
}

impl FilterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter of `kind` with its default configuration.
    pub fn add(&mut self, kind: FilterKind) -> &Filter {
        self.push(kind.default_config())
    }

    /// Append a filter with an explicit configuration.
    pub fn push(&mut self, config: FilterConfig) -> &Filter {
        let id = format!("{}_filter_{}", config.kind().as_str(), self.filters.len());
        self.filters.push(Filter { id, config });
        let last = self.filters.len() - 1;
        &self.filters[last]
    }

    pub fn remove(&mut self, index: usize) -> Option<Filter> {
        if index >= self.filters.len() {
            return None;
        }
        let removed = self.filters.remove(index);
        self.active_index = match self.active_index {
            Some(active) if active == index => None,
            Some(active) if active > index => Some(active - 1),
            other => other,
        };
        Some(removed)
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Filter> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index.filter(|&i| i < self.filters.len())
    }

    pub fn set_active(&mut self, index: Option<usize>) {
        self.active_index = index.filter(|&i| i < self.filters.len());
    }

    pub fn active(&self) -> Option<&Filter> {
        self.active_index().map(|i| &self.filters[i])
    }

    /// Replace the configuration of the selected filter. The new config must
    /// be of the same kind: a filter's kind never changes after creation.
    pub fn update_active_config(&mut self, config: FilterConfig) -> Result<(), ProjectError> {
        let index = self
            .active_index()
            .ok_or_else(|| ProjectError::ValidationError {
                message: "No active filter selected".to_string(),
            })?;
        let filter = &mut self.filters[index];
        if filter.kind() != config.kind() {
            return Err(ProjectError::ValidationError {
                message: format!(
                    "Cannot change filter {} from {} to {}",
                    filter.id,
                    filter.kind().as_str(),
                    config.kind().as_str()
                ),
            });
        }
        filter.config = config;
        Ok(())
    }

    /// Zone configuration of the selected filter, if it is a range filter.
    pub fn active_range_config_mut(&mut self) -> Option<&mut RangeConfig> {
        let index = self.active_index()?;
        match &mut self.filters[index].config {
            FilterConfig::RectRange(cfg) => Some(cfg),
            _ => None,
        }
    }

    /// Validation problems across the list, prefixed by filter id.
    pub fn validate(&self) -> Vec<String> {
        self.filters
            .iter()
            .flat_map(|filter| {
                filter
                    .config
                    .validate()
                    .into_iter()
                    .map(move |problem| format!("{}: {problem}", filter.id))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a FilterList {
    type Item = &'a Filter;
    type IntoIter = std::slice::Iter<'a, Filter>;

    fn into_iter(self) -> Self::IntoIter {
        self.filters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::{TimeInterval, ZoneRange, ZoneRect};

    #[test]
    fn test_kind_derived_from_config() {
        for kind in FilterKind::ALL {
            assert_eq!(kind.default_config().kind(), kind);
        }
    }

    #[test]
    fn test_masking_kinds() {
        assert!(FilterKind::RectRange.is_masking());
        assert!(FilterKind::GlobalRange.is_masking());
        assert!(!FilterKind::Greyscale.is_masking());
        assert!(FilterKind::Glitch.uses_gpu());
        assert!(!FilterKind::Mosaic.uses_gpu());
    }

    #[test]
    fn test_add_assigns_positional_ids() {
        let mut list = FilterList::new();
        list.add(FilterKind::Greyscale);
        list.add(FilterKind::Mosaic);
        let ids: Vec<_> = list.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["greyscale_filter_0", "mosaic_filter_1"]);
    }

    #[test]
    fn test_update_active_config_rejects_kind_change() {
        let mut list = FilterList::new();
        list.add(FilterKind::Gaussian);
        list.set_active(Some(0));

        let err = list.update_active_config(FilterConfig::Greyscale);
        assert!(err.is_err());

        list.update_active_config(FilterConfig::Gaussian(GaussianConfig {
            kernel_size: 5,
            sigma: 1.0,
        }))
        .unwrap();
        assert_eq!(
            list.filters()[0].config,
            FilterConfig::Gaussian(GaussianConfig {
                kernel_size: 5,
                sigma: 1.0
            })
        );
    }

    #[test]
    fn test_update_without_selection_fails() {
        let mut list = FilterList::new();
        list.add(FilterKind::Mosaic);
        assert!(list
            .update_active_config(FilterConfig::Mosaic(MosaicConfig::default()))
            .is_err());
    }

    #[test]
    fn test_remove_shifts_active_index() {
        let mut list = FilterList::new();
        list.add(FilterKind::Greyscale);
        list.add(FilterKind::Mosaic);
        list.add(FilterKind::Edge);
        list.set_active(Some(2));
        list.remove(0);
        assert_eq!(list.active().map(|f| f.kind()), Some(FilterKind::Edge));
        list.remove(1);
        assert!(list.active().is_none());
    }

    #[test]
    fn test_active_range_config_mut() {
        let mut list = FilterList::new();
        list.add(FilterKind::RectRange);
        list.set_active(Some(0));
        list.active_range_config_mut()
            .unwrap()
            .add_zone_at(0.0, 10.0, 100.0, 100.0);

        match &list.filters()[0].config {
            FilterConfig::RectRange(cfg) => assert_eq!(cfg.range_list.len(), 1),
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn test_validate_reports_bad_configs() {
        let mut list = FilterList::new();
        list.push(FilterConfig::Gaussian(GaussianConfig {
            kernel_size: 4,
            sigma: 0.0,
        }));
        list.push(FilterConfig::RectRange(RangeConfig {
            range_list: vec![ZoneRange::new(
                TimeInterval::new(2.0, 1.0),
                ZoneRect::new(0.0, 0.0, 10.0, 10.0),
            )],
        }));
        list.add(FilterKind::Greyscale);

        let problems = list.validate();
        assert_eq!(problems.len(), 3);
        assert!(problems[0].starts_with("gaussian_filter_0"));
        assert!(problems[2].contains("reversed"));
    }

    #[test]
    fn test_filter_json_shape() {
        let mut list = FilterList::new();
        list.add(FilterKind::Mosaic);
        list.add(FilterKind::Greyscale);
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["filters"][0]["config"]["kind"], "mosaic");
        assert_eq!(json["filters"][0]["config"]["block_size_x"], 10);
        assert_eq!(json["filters"][1]["config"]["kind"], "greyscale");

        let parsed: FilterList = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, list);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            "hue_sat_light".parse::<FilterKind>().unwrap(),
            FilterKind::HueSatLight
        );
        assert!("sepia".parse::<FilterKind>().is_err());
    }
}
