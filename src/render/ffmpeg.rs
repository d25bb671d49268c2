use std::path::Path;
use std::process::{Command, Output, Stdio};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ReelError, Result};

use super::{compose_args, concat_args, ComposeRequest, Muxer};

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    check_binary("ffmpeg")
}

/// Check if FFprobe is installed and accessible.
pub fn check_ffprobe() -> Result<()> {
    check_binary("ffprobe")
}

fn check_binary(program: &str) -> Result<()> {
    let output = Command::new(program).arg("-version").output().map_err(|e| {
        ReelError::InvalidInput(format!(
            "{program} not found. Install it with: brew install ffmpeg (macOS) or apt install ffmpeg (Linux). Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(ReelError::InvalidInput(format!("{program} check failed")));
    }

    debug!("{} is available", program);
    Ok(())
}

/// Last few hundred characters of a process's stderr.
fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let trimmed = stderr.trim();
    let skip = trimmed.chars().count().saturating_sub(500);
    trimmed.chars().skip(skip).collect()
}

/// Muxer that shells out to `ffmpeg` and `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl FfmpegMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use specific binaries instead of the ones on `PATH`.
    pub fn with_binaries(mut self, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    /// Run `program` to completion, killing it if `cancel` fires first.
    async fn run(&self, program: &str, args: &[String], cancel: &CancellationToken) -> Result<Output> {
        debug!("Running {} {}", program, args.join(" "));

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ReelError::MuxFailure(format!("Failed to run {program}: {e}")))?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Cancelling {}", program);
                Err(ReelError::Cancelled)
            }
            output = child.wait_with_output() => Ok(output?),
        }
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn concat_audio(&self, list: &Path, output: &Path, cancel: &CancellationToken) -> Result<()> {
        let result = self.run(&self.ffmpeg, &concat_args(list, output), cancel).await?;

        if !result.status.success() {
            return Err(ReelError::MuxFailure(format!(
                "FFmpeg concat failed: {}",
                stderr_tail(&result)
            )));
        }
        if !output.exists() {
            return Err(ReelError::MuxFailure(
                "Concat output was not created".to_string(),
            ));
        }

        Ok(())
    }

    async fn compose(&self, request: &ComposeRequest, cancel: &CancellationToken) -> Result<()> {
        info!(
            "Composing {} ({:.1}s, {} overlays)",
            request.output.display(),
            request.duration,
            request.overlays.len()
        );

        let result = self.run(&self.ffmpeg, &compose_args(request), cancel).await?;

        if !result.status.success() {
            return Err(ReelError::MuxFailure(format!(
                "FFmpeg compose failed: {}",
                stderr_tail(&result)
            )));
        }
        if !request.output.exists() {
            return Err(ReelError::MuxFailure(
                "Output video was not created".to_string(),
            ));
        }

        Ok(())
    }

    async fn probe_duration(&self, path: &Path, cancel: &CancellationToken) -> Result<f64> {
        let args: Vec<String> = [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(path.to_string_lossy().into_owned()))
        .collect();

        let output = self.run(&self.ffprobe, &args, cancel).await?;

        if !output.status.success() {
            return Err(ReelError::MuxFailure(format!(
                "FFprobe failed: {}",
                stderr_tail(&output)
            )));
        }

        let duration_str = String::from_utf8_lossy(&output.stdout);
        duration_str.trim().parse().map_err(|e| {
            ReelError::MuxFailure(format!(
                "Failed to parse duration '{}': {e}",
                duration_str.trim()
            ))
        })
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}
