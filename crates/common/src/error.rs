//! Error types shared across ClipFX crates.

use std::path::PathBuf;

/// Top-level error type for ClipFX operations.
///
/// The first four variants form the effect/export taxonomy: configuration
/// and resource failures are fatal to the current session, capability and
/// bounds conditions degrade the export instead of aborting it.
#[derive(Debug, thiserror::Error)]
pub enum FxError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Capability unavailable: {message}")]
    CapabilityUnavailable { message: String },

    #[error("Bounds exceeded: {message}")]
    BoundsExceeded { message: String },

    #[error("Resource initialization failed: {message}")]
    ResourceInit { message: String },

    #[error("Encode error: {message}")]
    Encode { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FxError.
pub type FxResult<T> = Result<T, FxError>;

impl FxError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    pub fn capability(msg: impl Into<String>) -> Self {
        Self::CapabilityUnavailable {
            message: msg.into(),
        }
    }

    pub fn bounds(msg: impl Into<String>) -> Self {
        Self::BoundsExceeded {
            message: msg.into(),
        }
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::ResourceInit {
            message: msg.into(),
        }
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether the export can continue in a degraded form after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CapabilityUnavailable { .. } | Self::BoundsExceeded { .. }
        )
    }
}
