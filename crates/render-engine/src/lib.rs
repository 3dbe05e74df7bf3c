//! ClipFX Render Engine
//!
//! Applies a project's filter list to every frame of the source clip and
//! encodes the result into an MP4 container.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source.mp4 ──┬── ffmpeg decode (RGBA) ── FilterPipeline ── VideoEncoder ──┐
//!              │                           (masks, CPU/GPU)                 │
//!              └── ffmpeg decode (f32) ─── DownmixStage ──── AudioEncoder ──┤
//!                                          (own thread)                     ▼
//!                                                                     Muxer (MP4)
//! ```

pub mod audio;
pub mod encoder;
pub mod export;
pub mod pipeline;
mod process;
pub mod source;

pub use audio::{DownmixMessage, DownmixStage, MonoBlock, MultiChannelBlock};
pub use encoder::{EncoderFactory, FfmpegEncoderFactory, RecordingEncoderFactory};
pub use export::*;
pub use pipeline::{FilterPipeline, FrameStats};
pub use process::command_exists;
pub use source::{probe_source, AudioTrackInfo, SourceInfo};
