//! Project file types.
//!
//! A project ties a source clip to an edit range, an ordered filter list and
//! the export settings. It is stored as a single pretty-printed JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::filter::FilterList;
use crate::zone::TimeInterval;

/// Current project schema version.
pub const PROJECT_VERSION: &str = "1.0";

/// Top-level project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipProject {
    /// Schema version.
    pub version: String,

    /// Human-readable project name.
    pub name: String,

    /// Unique project identifier (UUID).
    pub id: String,

    /// Creation timestamp (ISO 8601).
    pub created_at: String,

    /// Last modified timestamp (ISO 8601).
    pub modified_at: String,

    /// Source clip.
    pub source: SourceRef,

    /// Portion of the source that is exported, in seconds.
    pub edit_range: TimeInterval,

    /// Export configuration.
    #[serde(default)]
    pub export: ExportSettings,

    /// Ordered filter list.
    #[serde(default)]
    pub filters: FilterList,
}

/// Reference to the source clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Path to the media file. Relative paths resolve against the directory
    /// holding the project file.
    pub path: String,

    /// Size of the editor preview that zone rectangles were drawn on.
    pub preview_width: u32,
    pub preview_height: u32,

    /// Source duration in seconds, when known.
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// Export configuration stored with the project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Output width in pixels. `None` keeps the preview width.
    pub width: Option<u32>,

    /// Output frame rate.
    pub fps: u32,

    /// Whether to carry an audio track when the source has one.
    pub include_audio: bool,

    /// Output path relative to the project file. `None` derives one from the
    /// project name.
    pub output: Option<String>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            width: None,
            fps: 30,
            include_audio: true,
            output: None,
        }
    }
}

impl ClipProject {
    /// Create a new project with defaults and an empty filter list.
    pub fn new(
        name: impl Into<String>,
        source_path: impl Into<String>,
        preview_width: u32,
        preview_height: u32,
        duration_secs: f64,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: PROJECT_VERSION.to_string(),
            name: name.into(),
            id: uuid_v4(),
            created_at: now.clone(),
            modified_at: now,
            source: SourceRef {
                path: source_path.into(),
                preview_width,
                preview_height,
                duration_secs: Some(duration_secs),
            },
            edit_range: TimeInterval::new(0.0, duration_secs.max(0.0)),
            export: ExportSettings::default(),
            filters: FilterList::new(),
        }
    }

    /// Load a project file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write the project file, refreshing `modified_at`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        self.modified_at = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string_pretty(self).map_err(|e| ProjectError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Create a project file on disk. Fails if the file already exists.
    pub fn create(
        path: impl AsRef<Path>,
        name: impl Into<String>,
        source_path: impl Into<String>,
        preview_width: u32,
        preview_height: u32,
        duration_secs: f64,
    ) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ProjectError::ValidationError {
                message: format!("{} already exists", path.display()),
            });
        }
        let mut project = Self::new(
            name,
            source_path,
            preview_width,
            preview_height,
            duration_secs,
        );
        project.save(path)?;
        Ok(project)
    }

    /// Source media path resolved against the project file location.
    pub fn resolve_source(&self, project_path: impl AsRef<Path>) -> PathBuf {
        resolve_relative(project_path.as_ref(), &self.source.path)
    }

    /// Output path resolved against the project file location.
    pub fn resolve_output(&self, project_path: impl AsRef<Path>) -> PathBuf {
        let relative = match &self.export.output {
            Some(output) => output.clone(),
            None => format!("{}.mp4", sanitize_file_stem(&self.name)),
        };
        resolve_relative(project_path.as_ref(), &relative)
    }

    /// Export width in pixels.
    pub fn export_width(&self) -> u32 {
        self.export.width.unwrap_or(self.source.preview_width)
    }

    /// Export height, keeping the preview aspect ratio and an even value.
    pub fn export_height(&self) -> u32 {
        let width = self.export_width();
        if self.source.preview_width == 0 {
            return self.source.preview_height;
        }
        let height = (self.source.preview_height as u64 * width as u64
            / self.source.preview_width as u64) as u32;
        (height / 2 * 2).max(2)
    }

    /// Ratio between export and preview coordinates, applied to zone rects.
    pub fn scale_factor(&self) -> f64 {
        if self.source.preview_width == 0 {
            return 1.0;
        }
        self.export_width() as f64 / self.source.preview_width as f64
    }

    /// Human-readable problems with this project. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = vec![];

        if self.version != PROJECT_VERSION {
            problems.push(format!(
                "Unsupported project version {} (expected {PROJECT_VERSION})",
                self.version
            ));
        }
        if self.source.preview_width == 0 || self.source.preview_height == 0 {
            problems.push("Preview size must be non-zero".to_string());
        }
        if self.edit_range.start < 0.0 || self.edit_range.start > self.edit_range.end {
            problems.push(format!(
                "Edit range [{}, {}] is invalid",
                self.edit_range.start, self.edit_range.end
            ));
        }
        if let Some(duration) = self.source.duration_secs {
            if self.edit_range.end > duration + 1e-6 {
                problems.push(format!(
                    "Edit range ends at {} but the source is {duration}s long",
                    self.edit_range.end
                ));
            }
        }
        if self.export.fps == 0 {
            problems.push("Export fps must be at least 1".to_string());
        }
        if self.export.width == Some(0) {
            problems.push("Export width must be non-zero".to_string());
        }

        problems.extend(self.filters.validate());
        problems
    }
}

fn resolve_relative(project_path: &Path, relative: &str) -> PathBuf {
    let candidate = PathBuf::from(relative);
    if candidate.is_absolute() {
        return candidate;
    }
    project_path
        .parent()
        .map(|dir| dir.join(&candidate))
        .unwrap_or(candidate)
}

fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "export".to_string()
    } else {
        stem
    }
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid project: {message}")]
    ValidationError { message: String },
}

/// Generate a simple UUID v4 from the system clock.
fn uuid_v4() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        (seed & 0xFFFF_FFFF) as u32,
        ((seed >> 32) & 0xFFFF) as u16,
        ((seed >> 48) & 0x0FFF) as u16,
        (((seed >> 60) & 0x3F) | 0x80) as u16 | (((seed >> 66) & 0x3FF) as u16) << 6,
        (seed >> 76) & 0xFFFF_FFFF_FFFF,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterConfig, FilterKind, GaussianConfig};

    fn temp_project_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("clipfx_test_{tag}_{}", std::process::id()))
            .join("project.json")
    }

    #[test]
    fn test_project_creation_defaults() {
        let project = ClipProject::new("Test Clip", "clip.mp4", 640, 360, 12.5);
        assert_eq!(project.version, PROJECT_VERSION);
        assert_eq!(project.edit_range, TimeInterval::new(0.0, 12.5));
        assert_eq!(project.export.fps, 30);
        assert!(project.filters.is_empty());
        assert!(project.validate().is_empty());
    }

    #[test]
    fn test_project_json_round_trip() {
        let mut project = ClipProject::new("Round Trip", "clip.mp4", 640, 360, 5.0);
        project.filters.add(FilterKind::RectRange);
        project.filters.set_active(Some(0));
        project
            .filters
            .active_range_config_mut()
            .unwrap()
            .add_zone_at(0.5, 5.0, 640.0, 360.0);
        project.filters.add(FilterKind::Glitch);

        let json = serde_json::to_string_pretty(&project).unwrap();
        let parsed: ClipProject = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, project);
    }

    #[test]
    fn test_create_save_load() {
        let path = temp_project_path("create");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());

        let created = ClipProject::create(&path, "Disk", "../clip.mp4", 640, 360, 3.0).unwrap();
        assert!(ClipProject::create(&path, "Disk", "clip.mp4", 640, 360, 3.0).is_err());

        let loaded = ClipProject::load(&path).unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(
            loaded.resolve_source(&path),
            path.parent().unwrap().join("../clip.mp4")
        );

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ClipProject::load("/nonexistent/clipfx/project.json").unwrap_err();
        assert!(matches!(err, ProjectError::IoError { .. }));
    }

    #[test]
    fn test_scale_factor_and_export_size() {
        let mut project = ClipProject::new("Scale", "clip.mp4", 640, 360, 1.0);
        assert!((project.scale_factor() - 1.0).abs() < 1e-12);

        project.export.width = Some(1280);
        assert!((project.scale_factor() - 2.0).abs() < 1e-12);
        assert_eq!(project.export_height(), 720);
    }

    #[test]
    fn test_default_output_name_is_sanitized() {
        let project = ClipProject::new("My clip: v2", "clip.mp4", 640, 360, 1.0);
        let output = project.resolve_output("/work/project.json");
        assert_eq!(output, PathBuf::from("/work/My_clip__v2.mp4"));
    }

    #[test]
    fn test_validate_collects_filter_problems() {
        let mut project = ClipProject::new("Invalid", "clip.mp4", 640, 360, 2.0);
        project.edit_range = TimeInterval::new(1.0, 3.0);
        project.filters.push(FilterConfig::Gaussian(GaussianConfig {
            kernel_size: 27,
            sigma: 1.0,
        }));

        let problems = project.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("source is 2s long"));
        assert!(problems[1].starts_with("gaussian_filter_0"));
    }

    #[test]
    fn test_missing_optional_sections_use_defaults() {
        let json = r#"{
            "version": "1.0",
            "name": "Legacy",
            "id": "x",
            "created_at": "2024-01-01T00:00:00Z",
            "modified_at": "2024-01-01T00:00:00Z",
            "source": {"path": "clip.mp4", "preview_width": 320, "preview_height": 180},
            "edit_range": {"start": 0.0, "end": 1.0}
        }"#;
        let project: ClipProject = serde_json::from_str(json).unwrap();
        assert!(project.filters.is_empty());
        assert_eq!(project.export, ExportSettings::default());
        assert_eq!(project.source.duration_secs, None);
    }
}
