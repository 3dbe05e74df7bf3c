//! Export sessions and job management.
//!
//! An [`EncodeSession`] owns the encoders for one export and moves through
//! `Idle → Configured → Encoding → Draining → Finalized`. Drain order is
//! fixed: audio stop, audio flush, video flush, mux finalize.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clipfx_common::{
    AppConfig, DriftMeasurement, ExportDefaults, FrameClock, FxError, FxResult, GpuBackend,
    SampleClock,
};
use clipfx_processing_core::FrameBuffer;
use clipfx_project_model::ClipProject;
use crossbeam_channel::Sender;

use crate::audio::{DownmixMessage, DownmixStage, MonoBlock, MultiChannelBlock};
use crate::encoder::{
    AudioData, AudioEncoder, AudioEncoderConfig, EncoderFactory, FfmpegEncoderFactory, Muxer,
    VideoEncoder, VideoEncoderConfig, VideoFrame,
};
use crate::pipeline::FilterPipeline;
use crate::source::{probe_source, AudioTrackInfo, FfmpegAudioReader, FfmpegFrameReader};

/// What the host can do with audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformSupport {
    /// An audio encoder exists on this platform.
    pub audio_encoder: bool,
    /// The export runs in a context allowed to use it.
    pub trusted_context: bool,
}

/// Outcome of the one-time audio check at session start.
#[derive(Debug)]
pub enum AudioCapability {
    Available(AudioTrackInfo),
    Unavailable(FxError),
}

impl AudioCapability {
    /// Audio is carried only when the platform has an encoder, the source
    /// has a track and the context is trusted.
    pub fn detect(source: Option<&AudioTrackInfo>, platform: &PlatformSupport) -> Self {
        if !platform.audio_encoder {
            return Self::Unavailable(FxError::capability("no audio encoder on this platform"));
        }
        let Some(track) = source else {
            return Self::Unavailable(FxError::capability("source has no audio track"));
        };
        if !platform.trusted_context {
            return Self::Unavailable(FxError::capability(
                "audio encoding requires a trusted execution context",
            ));
        }
        Self::Available(*track)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// Encoder session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configured,
    Encoding,
    Draining,
    Finalized,
}

/// Parameters fixed when a session is configured.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub fps: u32,
    pub defaults: ExportDefaults,
    /// Audio track of the source, if any.
    pub audio_source: Option<AudioTrackInfo>,
    pub trusted_context: bool,
    /// Audio is stopped once it would run past this point.
    pub source_duration_secs: Option<f64>,
    /// Capacity of the downmix channels, in blocks.
    pub downmix_capacity: usize,
}

impl SessionSettings {
    pub fn new(fps: u32, defaults: ExportDefaults) -> Self {
        Self {
            fps,
            defaults,
            audio_source: None,
            trusted_context: true,
            source_duration_secs: None,
            downmix_capacity: 64,
        }
    }
}

/// Track length difference above which finalize logs a warning.
const AV_DRIFT_WARN_MS: f64 = 100.0;

struct AudioPath {
    encoder: Box<dyn AudioEncoder>,
    downmix: DownmixStage,
    clock: SampleClock,
    halted: bool,
}

impl AudioPath {
    /// Encode mono blocks in order until the duration limit is reached.
    fn encode_blocks(&mut self, blocks: Vec<MonoBlock>, limit_secs: Option<f64>) -> FxResult<usize> {
        let mut encoded = 0;
        for block in blocks {
            if self.halted {
                break;
            }
            if let Some(limit) = limit_secs {
                let end = self.clock.secs_after(block.frame_count as u64);
                if end > limit {
                    let err = FxError::bounds(format!(
                        "audio would reach {end:.3}s, source ends at {limit:.3}s"
                    ));
                    tracing::warn!(
                        error = %err,
                        samples = self.clock.cumulative_samples(),
                        audio_secs = self.clock.elapsed_secs(),
                        "Stopping audio, video continues"
                    );
                    self.halted = true;
                    self.downmix.stop_and_drain()?;
                    break;
                }
            }

            self.encoder.encode(AudioData {
                frame_count: block.frame_count,
                samples: block.samples,
                sample_rate: self.clock.sample_rate(),
                timestamp_us: self.clock.timestamp_us(),
            })?;
            self.clock.advance(block.frame_count as u64);
            encoded += 1;
        }
        Ok(encoded)
    }
}

/// Encoders, muxer and counters for one export.
pub struct EncodeSession {
    factory: Box<dyn EncoderFactory>,
    state: SessionState,
    video: Option<Box<dyn VideoEncoder>>,
    audio: Option<AudioPath>,
    muxer: Option<Box<dyn Muxer>>,
    frame_clock: FrameClock,
    frames_encoded: u64,
    source_duration_secs: Option<f64>,
}

impl std::fmt::Debug for EncodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeSession")
            .field("backend", &self.factory.name())
            .field("state", &self.state)
            .field("has_audio", &self.audio.is_some())
            .field("frames_encoded", &self.frames_encoded)
            .finish()
    }
}

impl EncodeSession {
    pub fn new(factory: Box<dyn EncoderFactory>) -> Self {
        Self {
            factory,
            state: SessionState::Idle,
            video: None,
            audio: None,
            muxer: None,
            frame_clock: FrameClock::new(30),
            frames_encoded: 0,
            source_duration_secs: None,
        }
    }

    /// Configure the video encoder, the muxer and, when the capability check
    /// passes, the audio path.
    pub fn init_encoder(
        &mut self,
        width: u32,
        height: u32,
        settings: &SessionSettings,
    ) -> FxResult<()> {
        if self.state != SessionState::Idle {
            return Err(FxError::invalid_state(format!(
                "init_encoder called in state {:?}",
                self.state
            )));
        }
        if width == 0 || height == 0 {
            return Err(FxError::config(format!(
                "Cannot encode a {width}x{height} frame"
            )));
        }

        let video_config = VideoEncoderConfig::new(width, height, settings.fps, &settings.defaults);
        self.video = Some(self.factory.video_encoder(&video_config)?);
        self.muxer = Some(self.factory.muxer()?);
        self.frame_clock = FrameClock::new(settings.fps);
        self.source_duration_secs = settings.source_duration_secs;

        let platform = PlatformSupport {
            audio_encoder: self.factory.supports_audio(),
            trusted_context: settings.trusted_context,
        };
        match AudioCapability::detect(settings.audio_source.as_ref(), &platform) {
            AudioCapability::Available(track) => {
                let audio_config =
                    AudioEncoderConfig::new(Some(track.sample_rate), &settings.defaults);
                match self.factory.audio_encoder(&audio_config) {
                    Ok(encoder) => {
                        self.audio = Some(AudioPath {
                            encoder,
                            downmix: DownmixStage::spawn(settings.downmix_capacity)?,
                            clock: SampleClock::new(audio_config.sample_rate),
                            halted: false,
                        });
                        tracing::info!(
                            channels = track.channels,
                            sample_rate = audio_config.sample_rate,
                            "Audio track enabled"
                        );
                    }
                    Err(err) if err.is_recoverable() => {
                        tracing::warn!(error = %err, "Audio disabled, exporting video only");
                    }
                    Err(err) => return Err(err),
                }
            }
            AudioCapability::Unavailable(err) => {
                tracing::warn!(error = %err, "Audio disabled, exporting video only");
            }
        }

        self.state = SessionState::Configured;
        tracing::info!(
            backend = self.factory.name(),
            width,
            height,
            fps = settings.fps,
            audio = self.audio.is_some(),
            "Encode session configured"
        );
        Ok(())
    }

    /// Producer handle for multi-channel audio, when the session carries
    /// audio.
    pub fn audio_input(&self) -> Option<Sender<DownmixMessage>> {
        self.audio.as_ref().map(|audio| audio.downmix.input())
    }

    /// Sample rate the audio encoder runs at.
    pub fn audio_sample_rate(&self) -> Option<u32> {
        self.audio.as_ref().map(|audio| audio.clock.sample_rate())
    }

    /// Queue one multi-channel block from the calling thread and encode
    /// whatever mono output is ready. Ignored without an active audio path.
    pub fn push_audio(&mut self, block: MultiChannelBlock) -> FxResult<()> {
        self.ensure_accepting("push_audio")?;
        match &self.audio {
            Some(audio) if !audio.halted => {
                if audio.downmix.send(block).is_err() {
                    tracing::debug!("Downmix stage stopped, audio block dropped");
                }
            }
            _ => return Ok(()),
        }
        self.pump_audio().map(|_| ())
    }

    /// Encode a filtered frame. The frame's pixels move into the encoder.
    pub fn encode_frame(&mut self, frame: FrameBuffer, frame_index: u64) -> FxResult<()> {
        self.ensure_accepting("encode_frame")?;
        let video = self
            .video
            .as_mut()
            .ok_or_else(|| FxError::invalid_state("Video encoder missing"))?;

        let FrameBuffer {
            width,
            height,
            pixels,
        } = frame;
        video.encode(VideoFrame {
            width,
            height,
            pixels,
            timestamp_us: self.frame_clock.timestamp_us(frame_index),
        })?;
        self.frames_encoded += 1;
        self.state = SessionState::Encoding;

        self.pump_audio()?;
        Ok(())
    }

    /// Encode every mono block the downmix stage has ready. Returns how many
    /// were encoded.
    pub fn pump_audio(&mut self) -> FxResult<usize> {
        let limit = self.source_duration_secs;
        match self.audio.as_mut() {
            Some(audio) if !audio.halted => {
                let ready = audio.downmix.drain_ready();
                audio.encode_blocks(ready, limit)
            }
            _ => Ok(0),
        }
    }

    /// Drain and close every encoder and return the finished container.
    pub fn finalize_export(&mut self) -> FxResult<Vec<u8>> {
        self.ensure_accepting("finalize_export")?;
        self.state = SessionState::Draining;
        let result = self.drain(false);
        self.state = SessionState::Finalized;
        result
    }

    /// Stop audio without encoding what is still queued, then drain like
    /// [`finalize_export`](Self::finalize_export).
    pub fn cancel(&mut self) -> FxResult<Vec<u8>> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Finalized;
                return Ok(Vec::new());
            }
            SessionState::Configured | SessionState::Encoding => {}
            SessionState::Draining | SessionState::Finalized => {
                return Err(FxError::invalid_state("Session already finalized"));
            }
        }
        tracing::info!(frames = self.frames_encoded, "Cancelling encode session");
        self.state = SessionState::Draining;
        let result = self.drain(true);
        self.state = SessionState::Finalized;
        result
    }

    fn drain(&mut self, discard_pending_audio: bool) -> FxResult<Vec<u8>> {
        let limit = self.source_duration_secs;
        let muxer = self
            .muxer
            .as_mut()
            .ok_or_else(|| FxError::invalid_state("Muxer missing"))?;

        let pending = match self.audio.as_mut() {
            Some(audio) => audio.downmix.stop_and_drain()?,
            None => Vec::new(),
        };
        self.factory.audio_stopped();

        if let Some(audio) = self.audio.as_mut() {
            if !discard_pending_audio && !audio.halted {
                audio.encode_blocks(pending, limit)?;
            }
            muxer.add_track(audio.encoder.flush()?)?;

            let drift = DriftMeasurement {
                reference_us: self.frame_clock.timestamp_us(self.frames_encoded),
                measured_us: audio.clock.timestamp_us(),
            };
            if drift.exceeds_threshold_ms(AV_DRIFT_WARN_MS) && !audio.halted {
                tracing::warn!(drift_ms = drift.drift_ms(), "Audio and video track lengths differ");
            } else {
                tracing::debug!(drift_ms = drift.drift_ms(), "Track drift");
            }
        }

        let video = self
            .video
            .as_mut()
            .ok_or_else(|| FxError::invalid_state("Video encoder missing"))?;
        muxer.add_track(video.flush()?)?;

        let bytes = muxer.finalize()?;
        tracing::info!(
            frames = self.frames_encoded,
            audio_samples = self.audio_samples_encoded(),
            bytes = bytes.len(),
            "Encode session finalized"
        );
        Ok(bytes)
    }

    fn ensure_accepting(&self, operation: &str) -> FxResult<()> {
        match self.state {
            SessionState::Configured | SessionState::Encoding => Ok(()),
            SessionState::Idle => Err(FxError::invalid_state(format!(
                "{operation} before init_encoder"
            ))),
            SessionState::Draining | SessionState::Finalized => Err(FxError::invalid_state(
                format!("{operation} after finalize"),
            )),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// End of the audio track relative to the end of the video track, when
    /// the session carries audio.
    pub fn audio_drift(&self) -> Option<DriftMeasurement> {
        self.audio.as_ref().map(|audio| DriftMeasurement {
            reference_us: self.frame_clock.timestamp_us(self.frames_encoded),
            measured_us: audio.clock.timestamp_us(),
        })
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Whether audio was stopped at the duration limit.
    pub fn audio_halted(&self) -> bool {
        self.audio.as_ref().is_some_and(|audio| audio.halted)
    }

    pub fn audio_samples_encoded(&self) -> u64 {
        self.audio
            .as_ref()
            .map_or(0, |audio| audio.clock.cumulative_samples())
    }
}

// ---------------------------------------------------------------------------
// Export jobs
// ---------------------------------------------------------------------------

/// An export job ready to be rendered.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Path of the project file; relative media paths resolve against it.
    pub project_path: PathBuf,

    pub project: ClipProject,

    /// Output file path.
    pub output_path: PathBuf,

    /// Render surface for the GPU filters.
    pub backend: GpuBackend,

    /// Encoder defaults.
    pub defaults: ExportDefaults,
}

impl ExportJob {
    /// Job for `project` with the output path the project asks for.
    pub fn from_project(
        project_path: impl Into<PathBuf>,
        project: ClipProject,
        config: &AppConfig,
    ) -> Self {
        let project_path = project_path.into();
        let output_path = project.resolve_output(&project_path);
        Self {
            project_path,
            project,
            output_path,
            backend: config.gpu.backend,
            defaults: config.export.clone(),
        }
    }
}

/// Progress callback for export rendering.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone)]
pub struct ExportProgress {
    /// Current progress [0.0, 1.0].
    pub progress: f64,

    /// Frames rendered so far.
    pub frames_rendered: u64,

    /// Total frames to render.
    pub total_frames: u64,

    /// Estimated time remaining in seconds.
    pub eta_secs: f64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
    Failed,
}

struct ProgressReporter {
    callback: Option<ProgressCallback>,
    started: Instant,
    total_frames: u64,
}

impl ProgressReporter {
    fn report(&self, stage: ExportStage, frames_rendered: u64) {
        let Some(cb) = &self.callback else {
            return;
        };
        cb(progress_report(
            stage,
            frames_rendered,
            self.total_frames,
            self.started.elapsed().as_secs_f64(),
        ));
    }
}

fn progress_report(
    stage: ExportStage,
    frames_rendered: u64,
    total_frames: u64,
    elapsed_secs: f64,
) -> ExportProgress {
    let progress = match stage {
        ExportStage::Complete => 1.0,
        _ if total_frames == 0 => 0.0,
        _ => (frames_rendered as f64 / total_frames as f64).clamp(0.0, 1.0),
    };
    let eta_secs = if progress > 0.0 {
        (elapsed_secs / progress) - elapsed_secs
    } else {
        0.0
    }
    .max(0.0);

    ExportProgress {
        progress,
        frames_rendered,
        total_frames,
        eta_secs,
        stage,
    }
}

/// Export the project to a video file.
///
/// This is the main entry point for rendering. Nothing is written to the
/// output path unless the whole export succeeds.
pub async fn export_video(
    job: ExportJob,
    progress: Option<ProgressCallback>,
) -> FxResult<PathBuf> {
    tracing::info!(
        output = %job.output_path.display(),
        backend = ?job.backend,
        filters = job.project.filters.len(),
        "Starting export"
    );

    let problems = job.project.validate();
    if !problems.is_empty() {
        return Err(FxError::project(problems.join("; ")));
    }

    tokio::task::spawn_blocking(move || run_export(job, progress))
        .await
        .map_err(|e| FxError::Other(anyhow::anyhow!("Export task failed: {e}")))?
}

fn run_export(job: ExportJob, progress: Option<ProgressCallback>) -> FxResult<PathBuf> {
    let mut reporter = ProgressReporter {
        callback: progress,
        started: Instant::now(),
        total_frames: 0,
    };
    reporter.report(ExportStage::Preparing, 0);

    match render_job(&job, &mut reporter) {
        Ok(()) => {
            reporter.report(ExportStage::Complete, reporter.total_frames);
            tracing::info!(
                output = %job.output_path.display(),
                elapsed_secs = reporter.started.elapsed().as_secs_f64(),
                "Export finished"
            );
            Ok(job.output_path)
        }
        Err(err) => {
            reporter.report(ExportStage::Failed, 0);
            tracing::error!(error = %err, "Export failed");
            Err(err)
        }
    }
}

fn render_job(job: &ExportJob, reporter: &mut ProgressReporter) -> FxResult<()> {
    let factory = FfmpegEncoderFactory::new()?;
    if !factory.is_available() {
        return Err(FxError::unsupported(
            "No supported encoder backend found (expected ffmpeg in PATH)",
        ));
    }

    let project = &job.project;
    let source_path = project.resolve_source(&job.project_path);
    let source = probe_source(&source_path)?;

    let width = project.export_width();
    let height = project.export_height();
    let fps = project.export.fps.max(1);
    let scale = project.scale_factor();

    let start = project.edit_range.start.max(0.0);
    let end = if source.duration_secs > 0.0 {
        project.edit_range.end.min(source.duration_secs)
    } else {
        project.edit_range.end
    };
    let duration = end - start;
    if duration <= 0.0 {
        return Err(FxError::project(format!(
            "Edit range [{start:.3}, {end:.3}] is empty for this source"
        )));
    }

    let clock = FrameClock::new(fps);
    let total_frames = clock.frame_count(duration);
    reporter.total_frames = total_frames;
    tracing::info!(width, height, fps, scale, total_frames, "Export plan ready");

    let mut settings = SessionSettings::new(fps, job.defaults.clone());
    settings.audio_source = source.audio.filter(|_| project.export.include_audio);
    settings.source_duration_secs = Some(duration);

    let mut session = EncodeSession::new(Box::new(factory));
    session.init_encoder(width, height, &settings)?;

    let feeder = match (session.audio_input(), session.audio_sample_rate(), source.audio) {
        (Some(input), Some(sample_rate), Some(track)) => Some(spawn_audio_feeder(
            &source_path,
            start,
            duration,
            AudioTrackInfo {
                channels: track.channels,
                sample_rate,
            },
            input,
        )?),
        _ => None,
    };

    let mut pipeline = FilterPipeline::new(job.backend);
    let mut reader = FfmpegFrameReader::open(&source_path, start, duration, width, height, fps)?;
    reporter.report(ExportStage::Rendering, 0);

    for index in 0..total_frames {
        let Some(mut frame) = reader.next_frame()? else {
            tracing::warn!(
                decoded = index,
                expected = total_frames,
                "Source ended before the edit range"
            );
            break;
        };
        let t = start + clock.time_secs(index);
        pipeline.apply_filters(&mut frame, &project.filters, t, Some(scale))?;
        session.encode_frame(frame, index)?;
        reporter.report(ExportStage::Rendering, index + 1);
    }
    reader.finish()?;

    reporter.report(ExportStage::Finalizing, session.frames_encoded());
    if let Some(feeder) = feeder {
        while !feeder.is_finished() {
            if session.pump_audio()? == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        let blocks = feeder
            .join()
            .map_err(|_| FxError::invalid_state("Audio reader thread panicked"))??;
        tracing::debug!(blocks, "Audio reader finished");
    }

    let bytes = session.finalize_export()?;
    if let Some(parent) = job.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(&job.output_path, &bytes)?;
    tracing::info!(
        path = %job.output_path.display(),
        bytes = bytes.len(),
        audio = session.has_audio(),
        "Wrote export"
    );
    Ok(())
}

/// Decode source audio on its own thread and feed it to the downmix stage.
fn spawn_audio_feeder(
    path: &Path,
    start_secs: f64,
    duration_secs: f64,
    track: AudioTrackInfo,
    input: Sender<DownmixMessage>,
) -> FxResult<JoinHandle<FxResult<u64>>> {
    let mut reader = FfmpegAudioReader::open(path, start_secs, duration_secs, track)?;
    std::thread::Builder::new()
        .name("clipfx-audio-reader".to_string())
        .spawn(move || -> FxResult<u64> {
            let mut blocks = 0u64;
            while let Some(block) = reader.next_block()? {
                if input.send(DownmixMessage::AudioBlock(block)).is_err() {
                    tracing::debug!(blocks, "Downmix stopped, audio reader exiting");
                    return Ok(blocks);
                }
                blocks += 1;
            }
            reader.finish()?;
            Ok(blocks)
        })
        .map_err(|e| FxError::resource(format!("Failed to spawn audio reader thread: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncoderEvent, RecordingEncoderFactory};

    fn stereo_source() -> AudioTrackInfo {
        AudioTrackInfo {
            channels: 2,
            sample_rate: 48_000,
        }
    }

    fn session_with(factory: &RecordingEncoderFactory) -> EncodeSession {
        EncodeSession::new(Box::new(factory.clone()))
    }

    fn settings(audio: Option<AudioTrackInfo>) -> SessionSettings {
        let mut settings = SessionSettings::new(30, ExportDefaults::default());
        settings.audio_source = audio;
        settings
    }

    #[test]
    fn test_capability_requires_all_three_conditions() {
        let track = stereo_source();
        let full = PlatformSupport {
            audio_encoder: true,
            trusted_context: true,
        };
        assert!(AudioCapability::detect(Some(&track), &full).is_available());
        assert!(!AudioCapability::detect(None, &full).is_available());
        assert!(!AudioCapability::detect(
            Some(&track),
            &PlatformSupport {
                audio_encoder: false,
                ..full
            }
        )
        .is_available());

        match AudioCapability::detect(
            Some(&track),
            &PlatformSupport {
                trusted_context: false,
                ..full
            },
        ) {
            AudioCapability::Unavailable(err) => assert!(err.is_recoverable()),
            AudioCapability::Available(_) => panic!("untrusted context must not carry audio"),
        }
    }

    #[test]
    fn test_encode_before_init_is_invalid_state() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        let err = session
            .encode_frame(FrameBuffer::filled(2, 2, [0; 4]), 0)
            .unwrap_err();
        assert!(matches!(err, FxError::InvalidState { .. }));
    }

    #[test]
    fn test_frame_timestamps_follow_index() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        session.init_encoder(2, 2, &settings(None)).unwrap();
        assert_eq!(session.state(), SessionState::Configured);

        for index in [0u64, 1, 30, 45] {
            session
                .encode_frame(FrameBuffer::filled(2, 2, [0; 4]), index)
                .unwrap();
        }
        assert_eq!(session.state(), SessionState::Encoding);

        let stamps: Vec<u64> = factory
            .events()
            .into_iter()
            .filter_map(|e| match e {
                EncoderEvent::VideoFrame { timestamp_us } => Some(timestamp_us),
                _ => None,
            })
            .collect();
        assert_eq!(stamps, vec![0, 33_333, 1_000_000, 1_500_000]);
    }

    #[test]
    fn test_video_only_drain_order() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        session.init_encoder(4, 4, &settings(None)).unwrap();
        assert!(!session.has_audio());
        session
            .encode_frame(FrameBuffer::filled(4, 4, [0; 4]), 0)
            .unwrap();
        session.finalize_export().unwrap();

        let tail: Vec<_> = factory.events().into_iter().skip(1).collect();
        assert_eq!(
            tail,
            vec![
                EncoderEvent::VideoFrame { timestamp_us: 0 },
                EncoderEvent::AudioStop,
                EncoderEvent::VideoFlush,
                EncoderEvent::TrackAdded(crate::encoder::TrackKind::Video),
                EncoderEvent::MuxFinalize,
            ]
        );
    }

    #[test]
    fn test_audio_flush_precedes_video_flush() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        session
            .init_encoder(4, 4, &settings(Some(stereo_source())))
            .unwrap();
        assert!(session.has_audio());

        session
            .push_audio(MultiChannelBlock::new(vec![vec![0.1; 128]; 2], 48_000))
            .unwrap();
        session
            .encode_frame(FrameBuffer::filled(4, 4, [0; 4]), 0)
            .unwrap();
        session.finalize_export().unwrap();
        assert_eq!(session.audio_samples_encoded(), 128);

        let events = factory.events();
        let position = |wanted: &EncoderEvent| events.iter().position(|e| e == wanted).unwrap();
        let audio_stop = position(&EncoderEvent::AudioStop);
        let audio_flush = position(&EncoderEvent::AudioFlush);
        let video_flush = position(&EncoderEvent::VideoFlush);
        let finalize = position(&EncoderEvent::MuxFinalize);
        assert!(audio_stop < audio_flush);
        assert!(audio_flush < video_flush);
        assert!(video_flush < finalize);
        assert_eq!(events.last(), Some(&EncoderEvent::MuxFinalize));
    }

    #[test]
    fn test_audio_disabled_when_factory_has_no_encoder() {
        let factory = RecordingEncoderFactory::without_audio();
        let mut session = session_with(&factory);
        session
            .init_encoder(4, 4, &settings(Some(stereo_source())))
            .unwrap();
        assert!(!session.has_audio());
        assert!(session.audio_input().is_none());
        assert!(!factory
            .events()
            .iter()
            .any(|e| matches!(e, EncoderEvent::AudioConfigured(_))));
    }

    #[test]
    fn test_audio_drift_compares_track_ends() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        session
            .init_encoder(2, 2, &settings(Some(stereo_source())))
            .unwrap();
        for _ in 0..3 {
            session
                .push_audio(MultiChannelBlock::new(vec![vec![0.0; 480]; 2], 48_000))
                .unwrap();
        }
        session
            .encode_frame(FrameBuffer::filled(2, 2, [0; 4]), 0)
            .unwrap();
        session.finalize_export().unwrap();

        let drift = session.audio_drift().unwrap();
        assert_eq!(drift.reference_us, 33_333);
        assert_eq!(drift.measured_us, 30_000);
        assert_eq!(drift.drift_us(), -3_333);

        let video_only = session_with(&RecordingEncoderFactory::new());
        assert!(video_only.audio_drift().is_none());
    }

    #[test]
    fn test_audio_timestamps_follow_sample_count() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        session
            .init_encoder(2, 2, &settings(Some(stereo_source())))
            .unwrap();
        for _ in 0..3 {
            session
                .push_audio(MultiChannelBlock::new(vec![vec![0.0; 480]; 2], 48_000))
                .unwrap();
        }
        session.finalize_export().unwrap();

        let stamps: Vec<u64> = factory
            .events()
            .into_iter()
            .filter_map(|e| match e {
                EncoderEvent::AudioData { timestamp_us, .. } => Some(timestamp_us),
                _ => None,
            })
            .collect();
        assert_eq!(stamps, vec![0, 10_000, 20_000]);
    }

    #[test]
    fn test_audio_stops_at_source_duration() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        let mut settings = settings(Some(stereo_source()));
        // 0.025 s fits two 480-frame blocks (0.02 s) but not a third.
        settings.source_duration_secs = Some(0.025);
        session.init_encoder(2, 2, &settings).unwrap();

        for _ in 0..4 {
            session
                .push_audio(MultiChannelBlock::new(vec![vec![0.0; 480]; 2], 48_000))
                .unwrap();
        }
        session
            .encode_frame(FrameBuffer::filled(2, 2, [0; 4]), 0)
            .unwrap();
        session.finalize_export().unwrap();

        assert!(session.audio_halted());
        assert_eq!(session.audio_samples_encoded(), 960);
        let frames = factory
            .events()
            .iter()
            .filter(|e| matches!(e, EncoderEvent::VideoFrame { .. }))
            .count();
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_encode_after_finalize_is_invalid_state() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        session.init_encoder(2, 2, &settings(None)).unwrap();
        let bytes = session.finalize_export().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(session.state(), SessionState::Finalized);

        let err = session
            .encode_frame(FrameBuffer::filled(2, 2, [0; 4]), 0)
            .unwrap_err();
        assert!(matches!(err, FxError::InvalidState { .. }));
        assert!(session.finalize_export().is_err());
    }

    #[test]
    fn test_cancel_runs_the_same_drain() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        session
            .init_encoder(2, 2, &settings(Some(stereo_source())))
            .unwrap();
        session
            .encode_frame(FrameBuffer::filled(2, 2, [0; 4]), 0)
            .unwrap();
        session.cancel().unwrap();
        assert_eq!(session.state(), SessionState::Finalized);

        let events = factory.events();
        let n = events.len();
        assert_eq!(events[n - 1], EncoderEvent::MuxFinalize);
        assert!(events.contains(&EncoderEvent::AudioFlush));
        assert_eq!(
            events.iter().filter(|e| **e == EncoderEvent::AudioStop).count(),
            1
        );
        assert!(session.cancel().is_err());
    }

    #[test]
    fn test_zero_sized_output_rejected() {
        let factory = RecordingEncoderFactory::new();
        let mut session = session_with(&factory);
        let err = session.init_encoder(0, 4, &settings(None)).unwrap_err();
        assert!(matches!(err, FxError::Configuration { .. }));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_progress_report_eta() {
        let report = progress_report(ExportStage::Rendering, 25, 100, 5.0);
        assert_eq!(report.progress, 0.25);
        assert!((report.eta_secs - 15.0).abs() < 1e-9);

        let done = progress_report(ExportStage::Complete, 0, 0, 5.0);
        assert_eq!(done.progress, 1.0);
        assert_eq!(done.eta_secs, 0.0);
    }
}
