//! Source media probing and decoding through ffprobe/ffmpeg.

use std::io::Read;
use std::path::Path;

use clipfx_common::{FxError, FxResult};
use clipfx_processing_core::FrameBuffer;
use serde::Deserialize;

use crate::audio::MultiChannelBlock;
use crate::process::ToolProcess;

/// Frames per decoded audio block.
pub const AUDIO_BLOCK_FRAMES: usize = 128;

/// Audio track parameters of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrackInfo {
    pub channels: u32,
    pub sample_rate: u32,
}

/// Stream parameters of a source clip.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
    pub audio: Option<AudioTrackInfo>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe `path` with ffprobe.
pub fn probe_source(path: &Path) -> FxResult<SourceInfo> {
    if !path.exists() {
        return Err(FxError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "stream=codec_type,width,height,r_frame_rate,channels,sample_rate,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| FxError::resource(format!("Failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(FxError::decode(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let raw = String::from_utf8(output.stdout)
        .map_err(|e| FxError::decode(format!("ffprobe output is not UTF-8: {e}")))?;
    let info = parse_probe(&raw)?;
    tracing::info!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        fps = info.fps,
        duration_secs = info.duration_secs,
        audio = ?info.audio,
        "Probed source"
    );
    Ok(info)
}

fn parse_probe(raw: &str) -> FxResult<SourceInfo> {
    let probe: ProbeOutput = serde_json::from_str(raw)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FxError::decode("Source has no video stream"))?;
    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(FxError::decode("Video stream has no dimensions")),
    };
    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .unwrap_or(30.0);

    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .and_then(|s| {
            let channels = s.channels.filter(|c| *c > 0)?;
            let sample_rate = s
                .sample_rate
                .as_deref()
                .and_then(|r| r.parse::<u32>().ok())
                .unwrap_or(0);
            Some(AudioTrackInfo {
                channels,
                sample_rate,
            })
        });

    Ok(SourceInfo {
        width,
        height,
        fps,
        duration_secs,
        audio,
    })
}

/// Parse ffprobe rates such as `30000/1001`.
fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((num, den)) => (num.parse::<f64>().ok()?, den.parse::<f64>().ok()?),
        None => (value.parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// Fill `buf` from `reader`. Returns the number of bytes read, short only
/// at end of stream.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decodes RGBA frames at a fixed output size and rate.
#[derive(Debug)]
pub struct FfmpegFrameReader {
    process: ToolProcess,
    width: u32,
    height: u32,
    frames_read: u64,
    eof: bool,
}

impl FfmpegFrameReader {
    /// Start decoding `duration_secs` of `path` from `start_secs`, scaled to
    /// `width`x`height` at `fps`.
    pub fn open(
        path: &Path,
        start_secs: f64,
        duration_secs: f64,
        width: u32,
        height: u32,
        fps: u32,
    ) -> FxResult<Self> {
        let args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{start_secs:.6}"),
            "-t".to_string(),
            format!("{duration_secs:.6}"),
            "-i".to_string(),
            path.display().to_string(),
            "-an".to_string(),
            "-vf".to_string(),
            format!("scale={width}:{height},fps={fps}"),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "-".to_string(),
        ];
        let process = ToolProcess::spawn("ffmpeg", "frame reader", &args, false, true)?;
        Ok(Self {
            process,
            width,
            height,
            frames_read: 0,
            eof: false,
        })
    }

    /// Next decoded frame, `None` at end of stream.
    pub fn next_frame(&mut self) -> FxResult<Option<FrameBuffer>> {
        let mut pixels = vec![0u8; FrameBuffer::byte_len(self.width, self.height)];
        let read = read_full(self.process.stdout()?, &mut pixels)
            .map_err(|e| FxError::decode(format!("Failed reading decoded frame: {e}")))?;
        if read < pixels.len() {
            self.eof = true;
        }
        if read == 0 {
            return Ok(None);
        }
        if read < pixels.len() {
            tracing::warn!(
                frame = self.frames_read,
                bytes = read,
                expected = pixels.len(),
                "Truncated final frame dropped"
            );
            return Ok(None);
        }
        self.frames_read += 1;
        FrameBuffer::new(self.width, self.height, pixels).map(Some)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Wait for the decoder to exit and surface its failure, if any. A
    /// reader stopped before end of stream is killed instead.
    pub fn finish(mut self) -> FxResult<()> {
        if self.eof {
            self.process.finish()?;
        }
        Ok(())
    }
}

/// Decodes planar f32 blocks of [`AUDIO_BLOCK_FRAMES`] frames.
#[derive(Debug)]
pub struct FfmpegAudioReader {
    process: ToolProcess,
    track: AudioTrackInfo,
    interleaved: Vec<u8>,
    eof: bool,
}

impl FfmpegAudioReader {
    pub fn open(
        path: &Path,
        start_secs: f64,
        duration_secs: f64,
        track: AudioTrackInfo,
    ) -> FxResult<Self> {
        if track.channels == 0 || track.sample_rate == 0 {
            return Err(FxError::config(format!(
                "Cannot decode audio with {} channels at {} Hz",
                track.channels, track.sample_rate
            )));
        }
        let args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{start_secs:.6}"),
            "-t".to_string(),
            format!("{duration_secs:.6}"),
            "-i".to_string(),
            path.display().to_string(),
            "-vn".to_string(),
            "-ac".to_string(),
            track.channels.to_string(),
            "-ar".to_string(),
            track.sample_rate.to_string(),
            "-f".to_string(),
            "f32le".to_string(),
            "-".to_string(),
        ];
        let process = ToolProcess::spawn("ffmpeg", "audio reader", &args, false, true)?;
        let block_bytes = AUDIO_BLOCK_FRAMES * track.channels as usize * 4;
        Ok(Self {
            process,
            track,
            interleaved: vec![0u8; block_bytes],
            eof: false,
        })
    }

    /// Next planar block; the last one may be short. `None` at end of
    /// stream.
    pub fn next_block(&mut self) -> FxResult<Option<MultiChannelBlock>> {
        let read = read_full(self.process.stdout()?, &mut self.interleaved)
            .map_err(|e| FxError::decode(format!("Failed reading decoded audio: {e}")))?;
        if read < self.interleaved.len() {
            self.eof = true;
        }
        let channels = self.track.channels as usize;
        let frames = read / (channels * 4);
        if frames == 0 {
            return Ok(None);
        }
        Ok(Some(deinterleave(
            &self.interleaved[..frames * channels * 4],
            channels,
            self.track.sample_rate,
        )))
    }

    /// See [`FfmpegFrameReader::finish`].
    pub fn finish(mut self) -> FxResult<()> {
        if self.eof {
            self.process.finish()?;
        }
        Ok(())
    }
}

/// Split interleaved little-endian f32 samples into one vector per channel.
fn deinterleave(bytes: &[u8], channels: usize, sample_rate: u32) -> MultiChannelBlock {
    let frames = bytes.len() / (channels * 4);
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        let sample = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        planes[i % channels].push(sample);
    }
    MultiChannelBlock::new(planes, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "programs": [],
        "streams": [
            {"codec_type": "video", "width": 1920, "height": 1080, "r_frame_rate": "30000/1001"},
            {"codec_type": "audio", "channels": 6, "sample_rate": "44100", "r_frame_rate": "0/0"}
        ],
        "format": {"duration": "12.500000"}
    }"#;

    #[test]
    fn test_parse_probe_reads_video_and_audio() {
        let info = parse_probe(PROBE_JSON).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.duration_secs, 12.5);
        assert_eq!(
            info.audio,
            Some(AudioTrackInfo {
                channels: 6,
                sample_rate: 44_100
            })
        );
    }

    #[test]
    fn test_parse_probe_without_audio() {
        let raw = r#"{"streams": [{"codec_type": "video", "width": 640, "height": 480,
            "r_frame_rate": "25/1", "duration": "3.0"}]}"#;
        let info = parse_probe(raw).unwrap();
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.duration_secs, 3.0);
        assert!(info.audio.is_none());
    }

    #[test]
    fn test_parse_probe_requires_video() {
        let raw = r#"{"streams": [{"codec_type": "audio", "channels": 2}]}"#;
        assert!(matches!(
            parse_probe(raw).unwrap_err(),
            FxError::Decode { .. }
        ));
    }

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("24/1"), Some(24.0));
        assert_eq!(parse_rational("60"), Some(60.0));
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("abc"), None);
    }

    #[test]
    fn test_missing_source_is_file_not_found() {
        let err = probe_source(Path::new("/nonexistent/clip.mp4")).unwrap_err();
        assert!(matches!(err, FxError::FileNotFound { .. }));
    }

    #[test]
    fn test_deinterleave_stereo() {
        let samples = [0.1f32, -0.1, 0.2, -0.2, 0.3, -0.3];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let block = deinterleave(&bytes, 2, 48_000);
        assert_eq!(block.channels[0], vec![0.1, 0.2, 0.3]);
        assert_eq!(block.channels[1], vec![-0.1, -0.2, -0.3]);
        assert_eq!(block.frame_count(), 3);
    }

    #[test]
    fn test_read_full_reports_short_read() {
        let mut data: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut data, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }
}
