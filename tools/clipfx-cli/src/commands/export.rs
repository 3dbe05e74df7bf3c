//! Export a project to video.

use std::io::Write;
use std::path::PathBuf;

use clipfx_common::config::AppConfig;
use clipfx_render_engine::{export_video, ExportJob, ExportProgress, ExportStage};

use super::load_project;

pub async fn run(
    path: PathBuf,
    output: Option<PathBuf>,
    width: Option<u32>,
    config: &AppConfig,
) -> anyhow::Result<()> {
    println!("Exporting project at: {}", path.display());

    let mut project = load_project(&path)?;
    if let Some(width) = width {
        project.export.width = Some(width);
    }

    let mut job = ExportJob::from_project(&path, project, config);
    if let Some(output) = output {
        job.output_path = output;
    }
    let output_path = job.output_path.clone();

    println!("  Output: {}", output_path.display());
    println!(
        "  Resolution: {}x{} @ {}fps",
        job.project.export_width(),
        job.project.export_height(),
        job.project.export.fps
    );
    println!("  Backend: {:?}", job.backend);
    println!("  Filters: {}", job.project.filters.len());

    let progress_cb: Box<dyn Fn(ExportProgress) + Send> = Box::new(|p| {
        if p.stage == ExportStage::Rendering {
            print!(
                "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
                p.progress * 100.0,
                p.frames_rendered,
                p.total_frames,
                p.eta_secs,
            );
            let _ = std::io::stdout().flush();
        }
    });

    match export_video(job, Some(progress_cb)).await {
        Ok(written) => {
            println!("\nExport complete: {}", written.display());
            Ok(())
        }
        Err(e) => {
            println!("\nExport failed: {e}");
            Err(anyhow::anyhow!("Export of {} failed", path.display()))
        }
    }
}
