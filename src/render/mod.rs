pub mod ffmpeg;

pub use ffmpeg::{check_ffmpeg, check_ffprobe, FfmpegMuxer};

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::visuals::ImageOverlay;

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Portrait 1080x1920, the default for short-form video.
    pub const VERTICAL: Resolution = Resolution {
        width: 1080,
        height: 1920,
    };

    /// Parse `"WxH"`. Zero or malformed dimensions yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().to_lowercase().split_once('x').map(|(w, h)| {
            (w.trim().parse::<u32>().ok(), h.trim().parse::<u32>().ok())
        })?;
        match (w?, h?) {
            (0, _) | (_, 0) => None,
            (width, height) => Some(Self { width, height }),
        }
    }

    /// Parse `"WxH"`, falling back to [`Resolution::VERTICAL`].
    pub fn parse_or_default(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::VERTICAL
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Everything needed to assemble the final video.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    /// Background clip, looped to cover `duration`.
    pub background: PathBuf,
    pub audio: PathBuf,
    pub overlays: Vec<ImageOverlay>,
    /// ASS file burned in last, if any.
    pub subtitles: Option<PathBuf>,
    /// Output length in seconds.
    pub duration: f64,
    pub resolution: Resolution,
    pub output: PathBuf,
}

/// Audio/video assembly backend.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Concatenate the files named in a concat-demuxer list into `output`.
    async fn concat_audio(&self, list: &Path, output: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Render the final video described by `request`.
    async fn compose(&self, request: &ComposeRequest, cancel: &CancellationToken) -> Result<()>;

    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path, cancel: &CancellationToken) -> Result<f64>;

    fn name(&self) -> &'static str;
}

/// Escape a path for use inside a quoted filtergraph argument.
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Build the `-filter_complex` graph for a compose request.
///
/// Input 0 is the background, input 1 the narration and inputs 2.. the
/// overlays in order. The background is scaled to cover the frame and
/// cropped; each overlay is fitted to its box, centred, and shown only
/// between its start and end; subtitles are burned in last. The result is
/// labelled `[vout]`.
pub fn build_filter_graph(request: &ComposeRequest) -> String {
    let Resolution { width, height } = request.resolution;
    let mut chains = vec![format!(
        "[0:v]scale={width}:{height}:force_original_aspect_ratio=increase,crop={width}:{height},setsar=1[bg]"
    )];
    let mut current = "bg".to_string();

    for (i, overlay) in request.overlays.iter().enumerate() {
        chains.push(format!(
            "[{}:v]scale={}:{}:force_original_aspect_ratio=decrease[img{i}]",
            i + 2,
            overlay.width,
            overlay.height
        ));
        let next = format!("v{i}");
        chains.push(format!(
            "[{current}][img{i}]overlay=(W-w)/2:(H-h)/2:enable='between(t,{:.3},{:.3})'[{next}]",
            overlay.start, overlay.end
        ));
        current = next;
    }

    match &request.subtitles {
        Some(path) => chains.push(format!(
            "[{current}]subtitles='{}'[vout]",
            escape_filter_path(path)
        )),
        None => chains.push(format!("[{current}]null[vout]")),
    }

    chains.join(";")
}

/// Full ffmpeg argument list for a compose request.
pub fn compose_args(request: &ComposeRequest) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-stream_loop".into(), "-1".into(), "-i".into()];
    args.push(request.background.to_string_lossy().into_owned());
    args.push("-i".into());
    args.push(request.audio.to_string_lossy().into_owned());

    for overlay in &request.overlays {
        if overlay.animated {
            args.extend(["-ignore_loop".into(), "0".into()]);
        } else {
            args.extend(["-loop".into(), "1".into()]);
        }
        args.push("-i".into());
        args.push(overlay.path.to_string_lossy().into_owned());
    }

    let graph = build_filter_graph(request);
    let duration = format!("{:.3}", request.duration);
    args.extend(
        [
            "-filter_complex",
            graph.as_str(),
            "-map",
            "[vout]",
            "-map",
            "1:a",
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-t",
            duration.as_str(),
            "-movflags",
            "+faststart",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(request.output.to_string_lossy().into_owned());

    args
}

/// Argument list for concatenating audio with the concat demuxer.
///
/// WAV output is re-encoded as 16-bit PCM, anything else as MP3, so mixed
/// inputs still join.
pub fn concat_args(list: &Path, output: &Path) -> Vec<String> {
    let codec: &[&str] = match output.extension().and_then(|e| e.to_str()) {
        Some("wav") => &["-c:a", "pcm_s16le"],
        _ => &["-c:a", "libmp3lame", "-b:a", "128k"],
    };

    let mut args: Vec<String> = ["-y", "-f", "concat", "-safe", "0", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(list.to_string_lossy().into_owned());
    args.extend(codec.iter().map(|s| s.to_string()));
    args.push(output.to_string_lossy().into_owned());
    args
}

/// File name of a finished video.
pub fn output_file_name(job_id: &str, unix_secs: i64) -> String {
    format!("video_{job_id}_{unix_secs}.mp4")
}
