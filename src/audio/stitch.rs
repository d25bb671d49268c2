use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ReelError, Result};
use crate::render::Muxer;
use crate::timing::{SpeechResult, WordTiming};

use super::AudioFormat;

/// Narration joined from one or more speech segments.
#[derive(Debug, Clone)]
pub struct StitchedAudio {
    pub audio: Vec<u8>,
    /// Word timings on the joined timeline.
    pub timings: Vec<WordTiming>,
    /// Sum of per-segment durations.
    pub duration: f64,
    pub format: AudioFormat,
}

/// Shift each segment's timings by the total duration of the segments
/// before it.
///
/// Returns the joined timings and the total duration. A segment without
/// timings contributes no time.
pub fn rebase_timings<'a, I>(segments: I) -> (Vec<WordTiming>, f64)
where
    I: IntoIterator<Item = &'a [WordTiming]>,
{
    let mut joined = Vec::new();
    let mut offset = 0.0;

    for timings in segments {
        joined.extend(timings.iter().map(|t| WordTiming {
            word: t.word.clone(),
            start: t.start + offset,
            end: t.end + offset,
            speaker: t.speaker.clone(),
        }));
        offset += timings.last().map(|t| t.end).unwrap_or(0.0);
    }

    (joined, offset)
}

/// Render an ffmpeg concat-demuxer list for the given files.
pub fn concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', "'\\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

/// Join speech segments into one audio blob with a single timeline.
///
/// A single segment is passed through untouched. Several segments are
/// written to a scratch directory under `work_dir` and concatenated by the
/// muxer; the scratch directory is removed however this returns.
pub async fn stitch_segments(
    segments: Vec<SpeechResult>,
    work_dir: &Path,
    muxer: &dyn Muxer,
    cancel: &CancellationToken,
) -> Result<StitchedAudio> {
    if segments.is_empty() {
        return Err(ReelError::EmptyInput(
            "no speech segments to stitch".to_string(),
        ));
    }

    let (timings, duration) = rebase_timings(segments.iter().map(|s| s.timings()));

    if segments.len() == 1 {
        let (audio, _) = segments
            .into_iter()
            .next()
            .map(SpeechResult::into_parts)
            .unwrap_or_default();
        let format = AudioFormat::sniff(&audio);
        debug!("Single segment, passing {} bytes through", audio.len());
        return Ok(StitchedAudio {
            audio,
            timings,
            duration,
            format,
        });
    }

    let scratch = tempfile::Builder::new()
        .prefix("stitch-")
        .tempdir_in(work_dir)?;
    let scratch_path = std::fs::canonicalize(scratch.path())?;

    let formats: Vec<AudioFormat> = segments
        .iter()
        .map(|s| AudioFormat::sniff(s.audio()))
        .collect();
    let paths: Vec<PathBuf> = formats
        .iter()
        .enumerate()
        .map(|(i, format)| scratch_path.join(format!("segment_{i}{}", format.extension())))
        .collect();

    try_join_all(
        segments
            .iter()
            .zip(&paths)
            .map(|(segment, path)| fs::write(path, segment.audio())),
    )
    .await?;

    let format = if formats.iter().all(|f| *f == AudioFormat::Wav) {
        AudioFormat::Wav
    } else {
        AudioFormat::Mp3
    };

    let list_path = scratch_path.join("concat.txt");
    fs::write(&list_path, concat_list(&paths)).await?;

    let output = scratch_path.join(format!("joined{}", format.extension()));
    info!(
        "Stitching {} segments ({:.2}s) with {}",
        segments.len(),
        duration,
        muxer.name()
    );
    muxer.concat_audio(&list_path, &output, cancel).await?;

    let audio = fs::read(&output).await?;

    Ok(StitchedAudio {
        audio,
        timings,
        duration,
        format,
    })
}
