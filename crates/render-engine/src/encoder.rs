//! Encoder and muxer backends.
//!
//! An [`EncoderFactory`] hands out one video encoder, an optional audio
//! encoder and a muxer per export. The ffmpeg factory runs each as a child
//! process writing into a scratch directory; the recording factory keeps a
//! shared log of every call and produces no media.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clipfx_common::{ExportDefaults, FrameClock, FxError, FxResult};

use crate::process::{command_exists, ToolProcess};

/// H.264 High profile, level 4.0.
pub const VIDEO_CODEC: &str = "avc1.640028";

/// AAC-LC.
pub const AUDIO_CODEC: &str = "mp4a.40.2";

/// Pixel count the base video bitrate is tuned for (1280x720).
pub const REFERENCE_PIXELS: u64 = 1280 * 720;

/// Video encoder settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncoderConfig {
    pub codec: String,
    /// Encoder profile name, `high` for the default codec string.
    pub profile: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_bps: u64,
}

impl VideoEncoderConfig {
    /// Constant-bitrate settings for a `width`x`height` output. The base
    /// bitrate scales with pixel count above 1280x720 and never drops below
    /// the base.
    pub fn new(width: u32, height: u32, fps: u32, defaults: &ExportDefaults) -> Self {
        let base = defaults.video_bitrate_bps as u64;
        let pixels = width as u64 * height as u64;
        let scaled = base * pixels / REFERENCE_PIXELS;
        Self {
            codec: VIDEO_CODEC.to_string(),
            profile: defaults.video_profile.clone(),
            width,
            height,
            fps: fps.max(1),
            bitrate_bps: scaled.max(base),
        }
    }
}

/// Audio encoder settings. Output is always mono.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioEncoderConfig {
    pub codec: String,
    pub channels: u32,
    pub sample_rate: u32,
    pub bitrate_bps: u64,
}

impl AudioEncoderConfig {
    /// Settings at the source sample rate, or the fallback rate when the
    /// source does not report one.
    pub fn new(source_sample_rate: Option<u32>, defaults: &ExportDefaults) -> Self {
        let sample_rate = source_sample_rate
            .filter(|rate| *rate > 0)
            .unwrap_or(defaults.fallback_sample_rate);
        Self {
            codec: AUDIO_CODEC.to_string(),
            channels: 1,
            sample_rate,
            bitrate_bps: defaults.audio_bitrate_bps as u64,
        }
    }
}

/// One RGBA frame handed to the video encoder.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub timestamp_us: u64,
}

/// One block of mono samples handed to the audio encoder.
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub frame_count: usize,
    pub sample_rate: u32,
    pub timestamp_us: u64,
}

/// Track kind inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// A finished elementary stream ready for muxing.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedTrack {
    pub kind: TrackKind,
    pub codec: String,
    pub path: PathBuf,
    /// Frame rate for raw video streams that carry no timing of their own.
    pub frame_rate: Option<u32>,
}

pub trait VideoEncoder: Send {
    fn encode(&mut self, frame: VideoFrame) -> FxResult<()>;

    /// Finish the stream. No frames may follow.
    fn flush(&mut self) -> FxResult<EncodedTrack>;
}

pub trait AudioEncoder: Send {
    fn encode(&mut self, data: AudioData) -> FxResult<()>;

    /// Finish the stream. No data may follow.
    fn flush(&mut self) -> FxResult<EncodedTrack>;
}

pub trait Muxer: Send {
    fn add_track(&mut self, track: EncodedTrack) -> FxResult<()>;

    /// Write the container and return its bytes.
    fn finalize(&mut self) -> FxResult<Vec<u8>>;
}

/// Source of encoders and muxers for one export.
pub trait EncoderFactory: Send {
    /// Backend name.
    fn name(&self) -> &str;

    /// Check if this backend is usable on the system.
    fn is_available(&self) -> bool;

    /// Whether this backend can encode audio at all.
    fn supports_audio(&self) -> bool;

    fn video_encoder(&self, config: &VideoEncoderConfig) -> FxResult<Box<dyn VideoEncoder>>;

    fn audio_encoder(&self, config: &AudioEncoderConfig) -> FxResult<Box<dyn AudioEncoder>>;

    fn muxer(&self) -> FxResult<Box<dyn Muxer>>;

    /// Called by a draining session right after the audio stop signal, before
    /// any encoder is flushed. Sessions without audio still signal the stop.
    fn audio_stopped(&self) {}
}

// ---------------------------------------------------------------------------
// ffmpeg
// ---------------------------------------------------------------------------

/// Encoders backed by `ffmpeg` child processes.
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    scratch: Arc<tempfile::TempDir>,
}

impl FfmpegEncoderFactory {
    /// Create a factory with a fresh scratch directory.
    pub fn new() -> FxResult<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("clipfx-export-")
            .tempdir()
            .map_err(|e| FxError::resource(format!("Failed to create scratch directory: {e}")))?;
        tracing::debug!(path = %scratch.path().display(), "Created export scratch directory");
        Ok(Self {
            scratch: Arc::new(scratch),
        })
    }

    fn scratch_path(&self, name: &str) -> PathBuf {
        self.scratch.path().join(name)
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists("ffmpeg")
    }

    fn supports_audio(&self) -> bool {
        self.is_available()
    }

    fn video_encoder(&self, config: &VideoEncoderConfig) -> FxResult<Box<dyn VideoEncoder>> {
        let path = self.scratch_path("video.h264");
        let args = h264_args(config, &path);
        let process = ToolProcess::spawn("ffmpeg", "video encoder", &args, true, false)?;
        tracing::info!(
            codec = %config.codec,
            width = config.width,
            height = config.height,
            fps = config.fps,
            bitrate_bps = config.bitrate_bps,
            "Video encoder configured"
        );
        Ok(Box::new(FfmpegVideoEncoder {
            process,
            config: config.clone(),
            path,
            frames: 0,
        }))
    }

    fn audio_encoder(&self, config: &AudioEncoderConfig) -> FxResult<Box<dyn AudioEncoder>> {
        let path = self.scratch_path("audio.aac");
        let args = aac_args(config, &path);
        let process = ToolProcess::spawn("ffmpeg", "audio encoder", &args, true, false)?;
        tracing::info!(
            codec = %config.codec,
            sample_rate = config.sample_rate,
            bitrate_bps = config.bitrate_bps,
            "Audio encoder configured"
        );
        Ok(Box::new(FfmpegAudioEncoder {
            process,
            config: config.clone(),
            path,
            bytes: Vec::new(),
        }))
    }

    fn muxer(&self) -> FxResult<Box<dyn Muxer>> {
        Ok(Box::new(FfmpegMuxer {
            output: self.scratch_path("output.mp4"),
            tracks: Vec::new(),
            _scratch: Arc::clone(&self.scratch),
        }))
    }
}

fn h264_args(config: &VideoEncoderConfig, path: &std::path::Path) -> Vec<String> {
    let bitrate = config.bitrate_bps.to_string();
    let bufsize = (config.bitrate_bps * 2).to_string();
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", config.width, config.height),
        "-framerate".to_string(),
        config.fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-profile:v".to_string(),
        config.profile.clone(),
        "-level:v".to_string(),
        "4.0".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        bitrate.clone(),
        "-minrate".to_string(),
        bitrate.clone(),
        "-maxrate".to_string(),
        bitrate,
        "-bufsize".to_string(),
        bufsize,
        "-f".to_string(),
        "h264".to_string(),
        path.display().to_string(),
    ]
}

fn aac_args(config: &AudioEncoderConfig, path: &std::path::Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "f32le".to_string(),
        "-ar".to_string(),
        config.sample_rate.to_string(),
        "-ac".to_string(),
        config.channels.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-profile:a".to_string(),
        "aac_low".to_string(),
        "-b:a".to_string(),
        config.bitrate_bps.to_string(),
        "-f".to_string(),
        "adts".to_string(),
        path.display().to_string(),
    ]
}

/// Raw frames are written in arrival order with a constant rate, so each
/// frame must carry the timestamp of the next frame index.
struct FfmpegVideoEncoder {
    process: ToolProcess,
    config: VideoEncoderConfig,
    path: PathBuf,
    frames: u64,
}

impl VideoEncoder for FfmpegVideoEncoder {
    fn encode(&mut self, frame: VideoFrame) -> FxResult<()> {
        if (frame.width, frame.height) != (self.config.width, self.config.height) {
            return Err(FxError::encode(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width, frame.height, self.config.width, self.config.height
            )));
        }
        let expected_us = FrameClock::new(self.config.fps).timestamp_us(self.frames);
        if frame.timestamp_us != expected_us {
            return Err(FxError::invalid_state(format!(
                "frame at {} us is out of sequence, expected frame {} at {} us",
                frame.timestamp_us, self.frames, expected_us
            )));
        }
        let label = self.process.label();
        self.process
            .stdin()?
            .write_all(&frame.pixels)
            .map_err(|e| FxError::encode(format!("Failed writing to {label}: {e}")))?;
        self.frames += 1;
        tracing::trace!(timestamp_us = frame.timestamp_us, "Video frame queued");
        Ok(())
    }

    fn flush(&mut self) -> FxResult<EncodedTrack> {
        self.process.finish()?;
        tracing::debug!(frames = self.frames, path = %self.path.display(), "Video stream flushed");
        Ok(EncodedTrack {
            kind: TrackKind::Video,
            codec: self.config.codec.clone(),
            path: self.path.clone(),
            frame_rate: Some(self.config.fps),
        })
    }
}

struct FfmpegAudioEncoder {
    process: ToolProcess,
    config: AudioEncoderConfig,
    path: PathBuf,
    bytes: Vec<u8>,
}

impl AudioEncoder for FfmpegAudioEncoder {
    fn encode(&mut self, data: AudioData) -> FxResult<()> {
        self.bytes.clear();
        self.bytes.reserve(data.samples.len() * 4);
        for sample in &data.samples {
            self.bytes.extend_from_slice(&sample.to_le_bytes());
        }
        let label = self.process.label();
        self.process
            .stdin()?
            .write_all(&self.bytes)
            .map_err(|e| FxError::encode(format!("Failed writing to {label}: {e}")))?;
        tracing::trace!(
            timestamp_us = data.timestamp_us,
            frames = data.frame_count,
            "Audio block queued"
        );
        Ok(())
    }

    fn flush(&mut self) -> FxResult<EncodedTrack> {
        self.process.finish()?;
        tracing::debug!(path = %self.path.display(), "Audio stream flushed");
        Ok(EncodedTrack {
            kind: TrackKind::Audio,
            codec: self.config.codec.clone(),
            path: self.path.clone(),
            frame_rate: None,
        })
    }
}

struct FfmpegMuxer {
    output: PathBuf,
    tracks: Vec<EncodedTrack>,
    _scratch: Arc<tempfile::TempDir>,
}

impl FfmpegMuxer {
    fn args(&self) -> FxResult<Vec<String>> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
        ];

        let video = self
            .tracks
            .iter()
            .find(|t| t.kind == TrackKind::Video)
            .ok_or_else(|| FxError::encode("Cannot mux without a video track"))?;
        args.extend([
            "-framerate".to_string(),
            video.frame_rate.unwrap_or(30).to_string(),
            "-f".to_string(),
            "h264".to_string(),
            "-i".to_string(),
            video.path.display().to_string(),
        ]);

        let audio = self.tracks.iter().find(|t| t.kind == TrackKind::Audio);
        if let Some(audio) = audio {
            args.extend([
                "-f".to_string(),
                "aac".to_string(),
                "-i".to_string(),
                audio.path.display().to_string(),
            ]);
        }

        args.extend(["-map".to_string(), "0:v:0".to_string()]);
        if audio.is_some() {
            args.extend(["-map".to_string(), "1:a:0".to_string()]);
        }
        args.extend([
            "-c".to_string(),
            "copy".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            self.output.display().to_string(),
        ]);
        Ok(args)
    }
}

impl Muxer for FfmpegMuxer {
    fn add_track(&mut self, track: EncodedTrack) -> FxResult<()> {
        if self.tracks.iter().any(|t| t.kind == track.kind) {
            return Err(FxError::encode(format!(
                "Container already has a {:?} track",
                track.kind
            )));
        }
        self.tracks.push(track);
        Ok(())
    }

    fn finalize(&mut self) -> FxResult<Vec<u8>> {
        let args = self.args()?;
        let mut process = ToolProcess::spawn("ffmpeg", "muxer", &args, false, false)?;
        process.finish()?;
        let bytes = std::fs::read(&self.output)
            .map_err(|e| FxError::encode(format!("Failed to read muxed output: {e}")))?;
        tracing::info!(
            tracks = self.tracks.len(),
            bytes = bytes.len(),
            "Container finalized"
        );
        Ok(bytes)
    }
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// A call observed by the recording factory.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderEvent {
    VideoConfigured(VideoEncoderConfig),
    AudioConfigured(AudioEncoderConfig),
    VideoFrame { timestamp_us: u64 },
    AudioData { timestamp_us: u64, frame_count: usize },
    AudioStop,
    VideoFlush,
    AudioFlush,
    TrackAdded(TrackKind),
    MuxFinalize,
}

/// Encoders that only log what they are asked to do.
///
/// All encoders handed out by one factory share the same log, so the order
/// of calls across tracks can be inspected.
#[derive(Debug, Clone)]
pub struct RecordingEncoderFactory {
    events: Arc<Mutex<Vec<EncoderEvent>>>,
    audio_supported: bool,
}

impl RecordingEncoderFactory {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            audio_supported: true,
        }
    }

    /// A factory that reports no audio encoder.
    pub fn without_audio() -> Self {
        Self {
            audio_supported: false,
            ..Self::new()
        }
    }

    /// Snapshot of the shared log.
    pub fn events(&self) -> Vec<EncoderEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for RecordingEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn record(log: &Mutex<Vec<EncoderEvent>>, event: EncoderEvent) {
    match log.lock() {
        Ok(mut events) => events.push(event),
        Err(poisoned) => poisoned.into_inner().push(event),
    }
}

impl EncoderFactory for RecordingEncoderFactory {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn supports_audio(&self) -> bool {
        self.audio_supported
    }

    fn video_encoder(&self, config: &VideoEncoderConfig) -> FxResult<Box<dyn VideoEncoder>> {
        record(&self.events, EncoderEvent::VideoConfigured(config.clone()));
        Ok(Box::new(RecordingVideoEncoder {
            events: Arc::clone(&self.events),
            codec: config.codec.clone(),
            fps: config.fps,
        }))
    }

    fn audio_encoder(&self, config: &AudioEncoderConfig) -> FxResult<Box<dyn AudioEncoder>> {
        if !self.audio_supported {
            return Err(FxError::capability("Recording factory has audio disabled"));
        }
        record(&self.events, EncoderEvent::AudioConfigured(config.clone()));
        Ok(Box::new(RecordingAudioEncoder {
            events: Arc::clone(&self.events),
            codec: config.codec.clone(),
        }))
    }

    fn audio_stopped(&self) {
        record(&self.events, EncoderEvent::AudioStop);
    }

    fn muxer(&self) -> FxResult<Box<dyn Muxer>> {
        Ok(Box::new(RecordingMuxer {
            events: Arc::clone(&self.events),
            tracks: Vec::new(),
        }))
    }
}

struct RecordingVideoEncoder {
    events: Arc<Mutex<Vec<EncoderEvent>>>,
    codec: String,
    fps: u32,
}

impl VideoEncoder for RecordingVideoEncoder {
    fn encode(&mut self, frame: VideoFrame) -> FxResult<()> {
        record(
            &self.events,
            EncoderEvent::VideoFrame {
                timestamp_us: frame.timestamp_us,
            },
        );
        Ok(())
    }

    fn flush(&mut self) -> FxResult<EncodedTrack> {
        record(&self.events, EncoderEvent::VideoFlush);
        Ok(EncodedTrack {
            kind: TrackKind::Video,
            codec: self.codec.clone(),
            path: PathBuf::from("video.h264"),
            frame_rate: Some(self.fps),
        })
    }
}

struct RecordingAudioEncoder {
    events: Arc<Mutex<Vec<EncoderEvent>>>,
    codec: String,
}

impl AudioEncoder for RecordingAudioEncoder {
    fn encode(&mut self, data: AudioData) -> FxResult<()> {
        record(
            &self.events,
            EncoderEvent::AudioData {
                timestamp_us: data.timestamp_us,
                frame_count: data.frame_count,
            },
        );
        Ok(())
    }

    fn flush(&mut self) -> FxResult<EncodedTrack> {
        record(&self.events, EncoderEvent::AudioFlush);
        Ok(EncodedTrack {
            kind: TrackKind::Audio,
            codec: self.codec.clone(),
            path: PathBuf::from("audio.aac"),
            frame_rate: None,
        })
    }
}

struct RecordingMuxer {
    events: Arc<Mutex<Vec<EncoderEvent>>>,
    tracks: Vec<TrackKind>,
}

impl Muxer for RecordingMuxer {
    fn add_track(&mut self, track: EncodedTrack) -> FxResult<()> {
        record(&self.events, EncoderEvent::TrackAdded(track.kind));
        self.tracks.push(track.kind);
        Ok(())
    }

    fn finalize(&mut self) -> FxResult<Vec<u8>> {
        record(&self.events, EncoderEvent::MuxFinalize);
        let summary = serde_json::json!({
            "tracks": self.tracks.iter().map(|k| format!("{k:?}")).collect::<Vec<_>>(),
        });
        Ok(serde_json::to_vec(&summary)?)
    }
}
