//! Initialize a new ClipFX project.

use std::path::PathBuf;

use clipfx_project_model::ClipProject;
use clipfx_render_engine::probe_source;

pub fn run(name: String, source: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let project_path = output.unwrap_or_else(|| PathBuf::from(format!("{name}.clipfx.json")));
    println!(
        "Creating project '{}' at {}",
        name,
        project_path.display()
    );

    let info = probe_source(&source).map_err(|e| anyhow::anyhow!("Failed to probe source: {e}"))?;

    let source_ref = std::fs::canonicalize(&source).unwrap_or(source);
    let project = ClipProject::create(
        &project_path,
        &name,
        source_ref.to_string_lossy(),
        info.width,
        info.height,
        info.duration_secs,
    )
    .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;

    println!("Project created successfully:");
    println!("  Source: {}", project.source.path);
    println!("  Preview: {}x{} @ {:.2}fps", info.width, info.height, info.fps);
    println!("  Duration: {:.2}s", info.duration_secs);
    match info.audio {
        Some(track) => println!(
            "  Audio: {} channel(s) @ {} Hz",
            track.channels, track.sample_rate
        ),
        None => println!("  Audio: none"),
    }

    Ok(())
}
