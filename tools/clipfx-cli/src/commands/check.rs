//! Check system capabilities.

use clipfx_gpu_effects::WgpuSurface;
use clipfx_render_engine::command_exists;

pub fn run() -> anyhow::Result<()> {
    println!("ClipFX System Check");
    println!("{}", "=".repeat(50));

    let mut required_ok = true;
    for tool in ["ffmpeg", "ffprobe"] {
        if command_exists(tool) {
            println!("[OK] {tool} found in PATH");
        } else {
            println!("[MISSING] {tool} not found in PATH");
            required_ok = false;
        }
    }

    if WgpuSurface::is_available() {
        // A 1x1 surface is enough to learn the adapter name.
        match WgpuSurface::new(1, 1) {
            Ok(surface) => println!("[OK] GPU adapter: {}", surface.adapter_name()),
            Err(e) => println!("[WARN] GPU adapter found but device creation failed ({e})"),
        }
    } else {
        println!("[WARN] No GPU adapter found");
        println!("       Convolution and glitch filters will run on the software surface");
    }

    println!();
    if required_ok {
        println!("All required tools are available. ClipFX is ready.");
    } else {
        println!("Some required tools are missing. Install ffmpeg to export.");
    }

    Ok(())
}
