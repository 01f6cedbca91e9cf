//! ffmpeg/ffprobe subprocess toolkit
//!
//! Supports:
//! - Remux/transcode to MPEG-TS for safe concatenation
//! - Duration probing via `ffprobe -show_format`
//! - Stream-copy concatenation through the concat demuxer
//! - Burning SRT captions into the picture

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::MediaToolkit;
use crate::error::{AssemblyError, Result};

/// Configuration for the ffmpeg toolkit
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Path to ffprobe binary
    pub ffprobe_path: String,
    /// Time limit for any single ffmpeg/ffprobe invocation
    pub timeout: Duration,
    /// Video codec used when burning subtitles (stream copy is impossible there)
    pub burn_video_codec: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: find_binary("ffmpeg"),
            ffprobe_path: find_binary("ffprobe"),
            timeout: Duration::from_secs(300),
            burn_video_codec: "libx264".to_string(),
        }
    }
}

impl FfmpegConfig {
    /// Specify custom ffmpeg binary path
    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: &str) -> Self {
        self.ffmpeg_path = path.to_string();
        self
    }

    /// Specify custom ffprobe binary path
    #[must_use]
    pub fn with_ffprobe_path(mut self, path: &str) -> Self {
        self.ffprobe_path = path.to_string();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Resolve a binary in PATH, falling back to the bare name.
fn find_binary(name: &str) -> String {
    which::which(name).map_or_else(|_| name.to_string(), |p| p.to_string_lossy().to_string())
}

/// `ffprobe -print_format json -show_format` output, the parts we read
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Extract `format.duration` (seconds) from ffprobe JSON.
fn parse_probe_duration(stdout: &[u8]) -> std::result::Result<f64, String> {
    let probe: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|e| format!("invalid ffprobe JSON: {e}"))?;

    let raw = probe
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| "no format.duration in ffprobe output".to_string())?;

    let duration: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("unparsable duration '{raw}'"))?;

    if !duration.is_finite() || duration < 0.0 {
        return Err(format!("invalid duration {duration}"));
    }
    Ok(duration)
}

/// Escape a path for use inside a quoted ffmpeg filter argument.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// ffmpeg-based media toolkit
pub struct FfmpegToolkit {
    config: FfmpegConfig,
}

impl FfmpegToolkit {
    /// Create a toolkit with default config
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: FfmpegConfig::default(),
        }
    }

    /// Create a toolkit with custom config
    #[must_use]
    pub fn with_config(config: FfmpegConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }

    /// Check if ffmpeg and ffprobe are available
    pub async fn check_available(&self) -> Vec<(String, bool)> {
        let mut results = Vec::new();
        for program in [&self.config.ffmpeg_path, &self.config.ffprobe_path] {
            let ok = Command::new(program)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .unwrap_or(false);
            results.push((program.clone(), ok));
        }
        results
    }

    fn transcode_args(input: &Path, output: &Path) -> Vec<String> {
        let mut args = quiet_args();
        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());
        args.extend(["-q", "0", "-y"].map(String::from));
        args.push(output.to_string_lossy().to_string());
        args
    }

    fn probe_args(input: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-v", "quiet", "-print_format", "json", "-show_format"]
            .map(String::from)
            .to_vec();
        args.push(input.to_string_lossy().to_string());
        args
    }

    fn concat_args(descriptor: &Path, output: &Path) -> Vec<String> {
        let mut args = quiet_args();
        // Descriptor lines hold quoted basenames, which the demuxer's safe
        // mode would reject.
        args.extend(["-f", "concat", "-safe", "0", "-i"].map(String::from));
        args.push(descriptor.to_string_lossy().to_string());
        args.extend(["-y", "-c", "copy"].map(String::from));
        args.push(output.to_string_lossy().to_string());
        args
    }

    fn burn_args(&self, video: &Path, subtitles: &Path, output: &Path) -> Vec<String> {
        let mut args = quiet_args();
        args.push("-i".to_string());
        args.push(video.to_string_lossy().to_string());
        args.push("-vf".to_string());
        args.push(format!("subtitles='{}'", escape_filter_path(subtitles)));
        args.push("-c:v".to_string());
        args.push(self.config.burn_video_codec.clone());
        args.extend(["-c:a", "copy", "-y"].map(String::from));
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Run a tool to completion under the configured time limit.
    ///
    /// Returns the reason string on spawn failure, timeout or non-zero exit.
    async fn run(&self, program: &str, args: &[String]) -> std::result::Result<Output, String> {
        debug!("{program} args: {:?}", args);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("cannot start {program}: {e}"))?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("{program} timed out after {}s", self.config.timeout.as_secs()))?
            .map_err(|e| format!("{program}: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{program} exited with status: {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        Ok(output)
    }
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::new()
    }
}

fn quiet_args() -> Vec<String> {
    ["-hide_banner", "-nostdin", "-loglevel", "error"]
        .map(String::from)
        .to_vec()
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let args = Self::transcode_args(input, output);
        self.run(&self.config.ffmpeg_path, &args)
            .await
            .map_err(|reason| AssemblyError::Transcode {
                path: input.to_path_buf(),
                reason,
            })?;
        Ok(())
    }

    async fn probe_duration(&self, input: &Path) -> Result<f64> {
        let probe_error = |reason: String| AssemblyError::Probe {
            path: input.to_path_buf(),
            reason,
        };

        let args = Self::probe_args(input);
        let output = self
            .run(&self.config.ffprobe_path, &args)
            .await
            .map_err(probe_error)?;

        let duration = parse_probe_duration(&output.stdout).map_err(probe_error)?;
        debug!("{} lasts {duration:.3}s", input.display());
        Ok(duration)
    }

    async fn concat(&self, descriptor: &Path, output: &Path) -> Result<()> {
        let args = Self::concat_args(descriptor, output);
        self.run(&self.config.ffmpeg_path, &args)
            .await
            .map_err(|reason| AssemblyError::Concatenation { reason })?;

        info!("Concatenated video to {}", output.display());
        Ok(())
    }

    async fn burn_subtitles(&self, video: &Path, subtitles: &Path, output: &Path) -> Result<()> {
        let args = self.burn_args(video, subtitles, output);
        self.run(&self.config.ffmpeg_path, &args)
            .await
            .map_err(|reason| AssemblyError::Concatenation {
                reason: format!("burning subtitles: {reason}"),
            })?;

        info!("Burned subtitles into {}", output.display());
        Ok(())
    }
}
