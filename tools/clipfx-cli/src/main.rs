//! ClipFX CLI: create, inspect and export filter projects.
//!
//! Usage:
//!   clipfx init <NAME> --source <VIDEO>   Create a project for a source clip
//!   clipfx validate <PROJECT>             Validate a project file
//!   clipfx info <PROJECT>                 Show the filter list and zones
//!   clipfx export <PROJECT>               Render the project to MP4
//!   clipfx check                          Check ffmpeg and GPU availability

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clipfx_common::config::GpuBackend;

mod commands;

#[derive(Parser)]
#[command(
    name = "clipfx",
    about = "Zone-masked video filters with GPU convolution and glitch effects",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a project to video
    Export {
        /// Path to the project file
        path: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Render surface for the GPU filters
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        /// Output width (height follows the preview aspect ratio)
        #[arg(long)]
        width: Option<u32>,
    },

    /// Validate a project file
    Validate {
        /// Path to the project file
        path: PathBuf,
    },

    /// Show project information
    Info {
        /// Path to the project file
        path: PathBuf,

        /// Print the filter list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new project for a source clip
    Init {
        /// Project name
        name: String,

        /// Source video
        #[arg(short, long)]
        source: PathBuf,

        /// Project file to write (defaults to <NAME>.clipfx.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check system capabilities
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    Wgpu,
    Software,
}

impl From<BackendArg> for GpuBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => GpuBackend::Auto,
            BackendArg::Wgpu => GpuBackend::Wgpu,
            BackendArg::Software => GpuBackend::Software,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = clipfx_common::config::AppConfig::load();

    // Initialize logging
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    clipfx_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Export {
            path,
            output,
            backend,
            width,
        } => {
            if let Some(backend) = backend {
                config.gpu.backend = backend.into();
            }
            commands::export::run(path, output, width, &config).await
        }
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Info { path, json } => commands::info::run(path, json),
        Commands::Init {
            name,
            source,
            output,
        } => commands::init::run(name, source, output),
        Commands::Check => commands::check::run(),
    }
}
