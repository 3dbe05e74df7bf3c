//! Show project information.

use std::path::PathBuf;

use clipfx_project_model::FilterConfig;

use super::load_project;

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let p = load_project(&path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&p.filters)?);
        return Ok(());
    }

    println!("Project: {}", p.name);
    println!("  ID: {}", p.id);
    println!("  Created: {}", p.created_at);
    println!("  Modified: {}", p.modified_at);
    println!();

    println!("Source:");
    println!("  Path: {}", p.resolve_source(&path).display());
    println!(
        "  Preview: {}x{}",
        p.source.preview_width, p.source.preview_height
    );
    if let Some(duration) = p.source.duration_secs {
        println!("  Duration: {duration:.2}s");
    }
    println!(
        "  Edit range: {:.3}s - {:.3}s",
        p.edit_range.start, p.edit_range.end
    );
    println!();

    println!("Filters ({}):", p.filters.len());
    for (index, filter) in p.filters.iter().enumerate() {
        let active = if p.filters.active_index() == Some(index) {
            " (active)"
        } else {
            ""
        };
        let gpu = if filter.kind().uses_gpu() { " (gpu)" } else { "" };
        println!(
            "  {index}. {}{gpu}{active} [{}]",
            filter.kind().display_name(),
            filter.id
        );
        print_config(&filter.config);
    }
    println!();

    println!("Export config:");
    println!(
        "  Output: {}x{} @ {}fps (scale {:.3})",
        p.export_width(),
        p.export_height(),
        p.export.fps,
        p.scale_factor()
    );
    println!("  Audio: {}", if p.export.include_audio { "on" } else { "off" });
    println!("  File: {}", p.resolve_output(&path).display());

    Ok(())
}

fn print_config(config: &FilterConfig) {
    match config {
        FilterConfig::Mosaic(c) => {
            println!("       block {}x{}", c.block_size_x, c.block_size_y);
        }
        FilterConfig::HueSatLight(c) => println!(
            "       hue {:+.2} sat {:+.2} light {:+.2}",
            c.hue, c.saturation, c.lightness
        ),
        FilterConfig::Gaussian(c) => {
            println!("       kernel {} sigma {}", c.kernel_size, c.sigma);
        }
        FilterConfig::Laplacian(c) => println!("       kernel {}", c.kernel_size),
        FilterConfig::Glitch(c) => {
            let mut parts = vec![];
            if c.distortion_on {
                parts.push(format!("distortion {:.2}", c.distortion_intensity));
            }
            if c.color_shift_on {
                parts.push(format!("colour shift {:.2}", c.color_shift_intensity));
            }
            if c.scanline_on {
                parts.push(format!(
                    "scanline speed {:.2} height {:.3}",
                    c.scanline_speed, c.scanline_height
                ));
            }
            if parts.is_empty() {
                parts.push("no effects enabled".to_string());
            }
            println!("       {}", parts.join(", "));
        }
        FilterConfig::RectRange(range) => {
            if range.range_list.is_empty() {
                println!("       no zones (masks every pixel out)");
            }
            for zone in &range.range_list {
                println!(
                    "       {:.3}s - {:.3}s  rect ({:.0}, {:.0}) {:.0}x{:.0}",
                    zone.range.start,
                    zone.range.end,
                    zone.zone.left,
                    zone.zone.top,
                    zone.zone.width,
                    zone.zone.height
                );
            }
        }
        FilterConfig::Greyscale | FilterConfig::Edge | FilterConfig::GlobalRange => {}
    }
}
