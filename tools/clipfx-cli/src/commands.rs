//! Subcommand implementations.

pub mod check;
pub mod export;
pub mod info;
pub mod init;
pub mod validate;

use std::path::Path;

use clipfx_project_model::ClipProject;

/// Load a project file, mapping failures to a CLI error.
pub(crate) fn load_project(path: &Path) -> anyhow::Result<ClipProject> {
    ClipProject::load(path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))
}
