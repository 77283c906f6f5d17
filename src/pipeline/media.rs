//! Media collaborator: open a video, extract its audio track, grab frames.
//!
//! The orchestrator only talks to the [`MediaSource`] / [`MediaHandle`]
//! traits. [`FfmpegMedia`] is the shipped implementation and shells out to
//! `ffprobe` / `ffmpeg` via `tokio::process`.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Sample rate speech models expect.
pub const AUDIO_SAMPLE_RATE: u32 = 16_000;

/// Frames are never requested closer than this to the end of the video;
/// seeking exactly to the end yields no frame.
pub const END_GUARD_SECS: f64 = 0.1;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Media handle already closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// Opens videos for one job each.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn MediaHandle>, MediaError>;
}

/// An opened video. Owned by exactly one job.
#[async_trait]
pub trait MediaHandle: Send {
    /// Container duration in seconds as seen at open time (may be 0 if unknown).
    fn duration(&self) -> f64;

    /// Write a mono 16 kHz WAV to `dest`; returns the authoritative duration.
    async fn extract_audio(&mut self, dest: &Path) -> Result<f64, MediaError>;

    /// Write one JPEG frame taken at `at` seconds to `dest`.
    async fn capture_frame(&mut self, at: f64, dest: &Path) -> Result<(), MediaError>;

    /// Release the handle. Calling it again is a no-op.
    async fn close(&mut self);
}

/// Where a frame for cue `at` is actually taken: `min(at, duration - 0.1)`,
/// never negative.
pub fn capture_point(at: f64, duration: f64) -> f64 {
    at.min(duration - END_GUARD_SECS).max(0.0)
}

// ── ffprobe output ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: String,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// What `open` needs from a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub duration: f64,
    pub has_video: bool,
    pub has_audio: bool,
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe(json: &[u8]) -> Result<ProbeInfo, MediaError> {
    let probe: ProbeOutput = serde_json::from_slice(json)?;
    let has_video = probe.streams.iter().any(|s| s.codec_type == "video");
    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");
    let duration = probe
        .format
        .and_then(|f| f.duration)
        .or_else(|| probe.streams.iter().find_map(|s| s.duration.clone()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);
    Ok(ProbeInfo {
        duration,
        has_video,
        has_audio,
    })
}

// ── ffmpeg implementation ───────────────────────────────────────────────────

/// ffmpeg/ffprobe backed [`MediaSource`].
#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegMedia {
    /// Use the given binaries, or look them up on `PATH`.
    pub fn locate(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Result<Self, MediaError> {
        let ffmpeg = match ffmpeg {
            Some(p) => p,
            None => which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?,
        };
        let ffprobe = match ffprobe {
            Some(p) => p,
            None => which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?,
        };
        Ok(Self { ffmpeg, ffprobe })
    }

    async fn probe(&self, path: &Path) -> Result<ProbeInfo, MediaError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::FfprobeFailed {
                message: format!("ffprobe could not read {}", path.display()),
                stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
            });
        }
        parse_probe(&output.stdout)
    }
}

#[async_trait]
impl MediaSource for FfmpegMedia {
    async fn open(&self, path: &Path) -> Result<Box<dyn MediaHandle>, MediaError> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let info = self.probe(path).await?;
        if !info.has_video {
            return Err(MediaError::InvalidVideo("No video stream found".to_string()));
        }
        debug!(
            "Opened {} ({:.1}s, audio: {})",
            path.display(),
            info.duration,
            info.has_audio
        );
        Ok(Box::new(FfmpegHandle {
            tools: self.clone(),
            source: path.to_path_buf(),
            info,
            closed: false,
        }))
    }
}

struct FfmpegHandle {
    tools: FfmpegMedia,
    source: PathBuf,
    info: ProbeInfo,
    closed: bool,
}

impl FfmpegHandle {
    fn ensure_open(&self) -> Result<(), MediaError> {
        if self.closed {
            Err(MediaError::Closed)
        } else {
            Ok(())
        }
    }

    async fn run_ffmpeg(&self, args: Vec<String>, what: &str) -> Result<(), MediaError> {
        debug!("ffmpeg {}", args.join(" "));
        let output = Command::new(&self.tools.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(MediaError::FfmpegFailed {
                message: what.to_string(),
                stderr: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
                exit_code: output.status.code(),
            })
        }
    }
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

#[async_trait]
impl MediaHandle for FfmpegHandle {
    fn duration(&self) -> f64 {
        self.info.duration
    }

    async fn extract_audio(&mut self, dest: &Path) -> Result<f64, MediaError> {
        self.ensure_open()?;
        if !self.info.has_audio {
            return Err(MediaError::InvalidVideo("No audio track found".to_string()));
        }
        let args = vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            path_arg(&self.source),
            "-vn".into(),
            "-ac".into(),
            "1".into(),
            "-ar".into(),
            AUDIO_SAMPLE_RATE.to_string(),
            path_arg(dest),
        ];
        self.run_ffmpeg(args, "audio extraction failed").await?;

        if self.info.duration > 0.0 {
            return Ok(self.info.duration);
        }
        // Some containers carry no duration; the decoded audio always does.
        let audio = self.tools.probe(dest).await?;
        self.info.duration = audio.duration;
        Ok(audio.duration)
    }

    async fn capture_frame(&mut self, at: f64, dest: &Path) -> Result<(), MediaError> {
        self.ensure_open()?;
        let args = vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-ss".into(),
            format!("{at:.3}"),
            "-i".into(),
            path_arg(&self.source),
            "-frames:v".into(),
            "1".into(),
            "-q:v".into(),
            "3".into(),
            path_arg(dest),
        ];
        self.run_ffmpeg(args, "frame capture failed").await?;
        if tokio::fs::metadata(dest).await.is_err() {
            return Err(MediaError::FfmpegFailed {
                message: format!("no frame decoded at {at:.3}s"),
                stderr: None,
                exit_code: Some(0),
            });
        }
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!("Closed {}", self.source.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_point_clamps_to_end_and_zero() {
        assert_eq!(capture_point(5.0, 10.0), 5.0);
        assert!((capture_point(10.0, 10.0) - 9.9).abs() < 1e-9);
        assert_eq!(capture_point(0.02, 0.05), 0.0);
        assert_eq!(capture_point(-1.0, 10.0), 0.0);
    }

    #[test]
    fn probe_reads_format_duration_and_streams() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "duration": "12.000"},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "12.480000"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert!((info.duration - 12.48).abs() < 1e-9);
        assert!(info.has_video);
        assert!(info.has_audio);
    }

    #[test]
    fn probe_falls_back_to_stream_duration() {
        let json = br#"{"streams":[{"codec_type":"video","duration":"3.5"}],"format":{}}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.duration, 3.5);
        assert!(!info.has_audio);
    }

    #[test]
    fn probe_without_duration_is_zero() {
        let info = parse_probe(br#"{"streams":[]}"#).unwrap();
        assert_eq!(info.duration, 0.0);
        assert!(!info.has_video);
    }

    #[test]
    fn probe_rejects_garbage() {
        assert!(matches!(parse_probe(b"nope"), Err(MediaError::JsonParse(_))));
    }

    #[tokio::test]
    async fn open_missing_file_is_file_not_found() {
        let media = FfmpegMedia {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        };
        let err = media
            .open(Path::new("/nonexistent/clip.mp4"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
