//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default export parameters.
    #[serde(default)]
    pub export: ExportDefaults,

    /// GPU surface selection.
    #[serde(default)]
    pub gpu: GpuConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Output frame rate.
    pub fps: u32,

    /// Constant video bitrate (bits per second) for a 1280x720 output.
    /// Larger outputs scale this by pixel count.
    pub video_bitrate_bps: u32,

    /// Audio bitrate (bits per second).
    pub audio_bitrate_bps: u32,

    /// Sample rate used when the source does not report one.
    pub fallback_sample_rate: u32,

    /// H.264 profile name passed to the encoder.
    pub video_profile: String,
}

/// Which render surface the GPU processors use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuBackend {
    /// Hardware adapter when available, software otherwise.
    #[default]
    Auto,
    /// Require a wgpu hardware adapter.
    Wgpu,
    /// CPU evaluation of the shader programs.
    Software,
}

/// GPU configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    pub backend: GpuBackend,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "clipfx=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            video_bitrate_bps: 3_429_000,
            audio_bitrate_bps: 128_000,
            fallback_sample_rate: 48_000,
            video_profile: "high".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("clipfx").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_defaults_match_shareable_profile() {
        let defaults = ExportDefaults::default();
        assert_eq!(defaults.fps, 30);
        assert_eq!(defaults.video_bitrate_bps, 3_429_000);
        assert_eq!(defaults.audio_bitrate_bps, 128_000);
        assert_eq!(defaults.fallback_sample_rate, 48_000);
    }

    #[test]
    fn partial_config_fills_missing_sections() {
        let config: AppConfig = serde_json::from_str(r#"{"gpu":{"backend":"software"}}"#).unwrap();
        assert_eq!(config.gpu.backend, GpuBackend::Software);
        assert_eq!(config.export.fps, 30);
        assert_eq!(config.logging.level, "info");
    }
}
