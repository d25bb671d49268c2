use crate::audio::{stitch_segments, AudioFormat};
use crate::background::{ClipProvider, LocalClipProvider};
use crate::config::{Config, TimeoutConfig};
use crate::error::{ReelError, Result};
use crate::job::{Job, Stage};
use crate::llm::{CueWriter, OpenAiCueWriter, StaticCues};
use crate::render::{output_file_name, ComposeRequest, FfmpegMuxer, Muxer, Resolution};
use crate::script::{split_script, ScriptSegment};
use crate::search::{GiphySearch, SearxngImageSearch};
use crate::subtitle::{
    apply_offset, color_map, render, subtitles_from_text, subtitles_from_timings, SubtitleStyle,
};
use crate::timing::{estimate_duration_from_bytes, last_end, SpeechResult, VoiceConfig, WordTiming};
use crate::tts::{create_synthesizer, SpeechSynthesizer};
use crate::visuals::{ImageOverlay, VisualCue, VisualFetcher};
use chrono::Utc;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the video generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Output video resolution.
    pub resolution: Resolution,
    /// Subtitle look and timing offset.
    pub subtitle_style: SubtitleStyle,
    /// Speaker voices; empty means single-voice narration.
    pub voices: Vec<VoiceConfig>,
    /// Per-stage time limits.
    pub timeouts: TimeoutConfig,
    /// Show progress spinners.
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            subtitle_style: SubtitleStyle::default(),
            voices: Vec::new(),
            timeouts: TimeoutConfig::default(),
            show_progress: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            resolution: config.resolution(),
            subtitle_style: config.subtitles.clone(),
            voices: config.voices.clone(),
            timeouts: config.timeouts.clone(),
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn voice_for(&self, speaker: &str) -> Option<&VoiceConfig> {
        if speaker.is_empty() {
            return None;
        }
        self.voices
            .iter()
            .find(|v| v.speaker.eq_ignore_ascii_case(speaker))
    }

    fn stage_limit(&self, stage: Stage) -> u64 {
        let t = &self.timeouts;
        match stage {
            Stage::DraftScript => t.draft_stage_secs,
            Stage::Synthesize => t.synthesize_stage_secs,
            Stage::Stitch => t.stitch_stage_secs,
            Stage::FetchOverlays => t.overlay_stage_secs,
            Stage::RenderSubtitles => t.subtitle_stage_secs,
            Stage::Mux => t.mux_stage_secs,
            Stage::Pending | Stage::Done => 0,
        }
    }
}

/// Statistics from one video generation run.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Total time taken for the entire pipeline.
    pub total_time: Duration,
    /// Time spent synthesizing and stitching narration.
    pub synthesis_time: Duration,
    /// Time spent fetching overlay media.
    pub overlay_time: Duration,
    /// Time spent in the final mux.
    pub mux_time: Duration,
    /// Script segments synthesized.
    pub segments: usize,
    /// Words on the narration timeline.
    pub words: usize,
    /// Cues drafted for the script.
    pub cues_drafted: usize,
    /// Overlays that made it into the video.
    pub overlays_placed: usize,
    /// Subtitle events rendered.
    pub subtitle_events: usize,
    /// Narration length in seconds.
    pub audio_duration: f64,
    /// Speech backend used.
    pub synthesizer: String,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct PipelineResult {
    /// The finished video.
    pub output_path: PathBuf,
    /// Stitched narration kept next to the video.
    pub narration_path: PathBuf,
    /// Word timeline of the narration.
    pub timings: Vec<WordTiming>,
    /// Overlays composed into the video.
    pub overlays: Vec<ImageOverlay>,
    pub stats: PipelineStats,
}

/// Removes the job directory on drop unless the run succeeded.
struct WorkspaceGuard {
    path: PathBuf,
    keep: bool,
    cancel: CancellationToken,
}

impl WorkspaceGuard {
    fn new(path: PathBuf, cancel: CancellationToken) -> Self {
        Self {
            path,
            keep: false,
            cancel,
        }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if self.keep || !self.path.exists() {
            return;
        }
        if self.cancel.is_cancelled() {
            warn!("Pipeline cancelled, removing job directory: {:?}", self.path);
        } else {
            debug!("Removing job directory after failure: {:?}", self.path);
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!("Could not remove {:?}: {}", self.path, e);
        }
    }
}

/// Run `fut` as `stage` of `job`, bounded by `limit_secs` and `cancel`.
async fn run_stage<T, F>(
    job: &mut Job,
    stage: Stage,
    limit_secs: u64,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    job.enter_stage(stage)?;
    info!("Stage {}/{}: {}", stage.number(), Stage::PIPELINE.len(), stage);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReelError::Cancelled),
        result = tokio::time::timeout(Duration::from_secs(limit_secs), fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(ReelError::StageTimeout {
                stage: stage.to_string(),
                secs: limit_secs,
            }),
        },
    }
}

fn spinner(multi: Option<&MultiProgress>, message: &str) -> Option<ProgressBar> {
    multi.map(|mp| {
        let pb = mp.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    })
}

fn finish(pb: Option<ProgressBar>, message: String) {
    if let Some(pb) = pb {
        pb.finish_with_message(message);
    }
}

/// Turns a script into a finished vertical video.
pub struct Pipeline {
    config: PipelineConfig,
    cue_writer: Arc<dyn CueWriter>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    fetcher: VisualFetcher,
    clips: Arc<dyn ClipProvider>,
    muxer: Arc<dyn Muxer>,
}

impl Pipeline {
    /// A pipeline with no media searchers; see [`Pipeline::with_fetcher`].
    pub fn new(
        config: PipelineConfig,
        cue_writer: Arc<dyn CueWriter>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        clips: Arc<dyn ClipProvider>,
        muxer: Arc<dyn Muxer>,
    ) -> Self {
        Self {
            config,
            cue_writer,
            synthesizer,
            fetcher: VisualFetcher::new(Default::default()),
            clips,
            muxer,
        }
    }

    pub fn with_fetcher(mut self, fetcher: VisualFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Wire up the real backends named in `config`.
    pub fn from_config(config: &Config, show_progress: bool) -> Result<Self> {
        let synthesizer = create_synthesizer(config)?;

        let cue_writer: Arc<dyn CueWriter> = match (&config.llm.cues_file, &config.llm.api_key) {
            (Some(path), _) => Arc::new(StaticCues::from_file(path)?),
            (None, Some(key)) => Arc::new(
                OpenAiCueWriter::new(key.clone())
                    .with_base_url(config.llm.base_url.clone())
                    .with_model(config.llm.model.clone())
                    .with_max_cues(config.llm.max_cues)
                    .with_timeout(Duration::from_secs(config.timeouts.llm_secs)),
            ),
            (None, None) => {
                warn!("No OPENAI_API_KEY or cues file set, the video will have no overlays");
                Arc::new(StaticCues::default())
            }
        };

        let mut fetcher = VisualFetcher::new(config.visuals.clone());
        if let Some(url) = &config.search.searxng_url {
            fetcher = fetcher.with_image_searcher(Arc::new(
                SearxngImageSearch::new(url.clone())
                    .with_blocklist(&config.search.blocklist)
                    .with_timeouts(config.timeouts.search(), config.timeouts.download()),
            ));
        }
        if let Some(key) = &config.search.giphy_api_key {
            fetcher = fetcher.with_animated_searcher(Arc::new(
                GiphySearch::new(key.clone())
                    .with_timeouts(config.timeouts.search(), config.timeouts.download()),
            ));
        }

        let clip_dir = config.background.clip_dir.clone().ok_or_else(|| {
            ReelError::InvalidInput("background clip directory not set".to_string())
        })?;

        Ok(Self::new(
            PipelineConfig::from_config(config).with_progress(show_progress),
            cue_writer,
            synthesizer,
            Arc::new(LocalClipProvider::new(clip_dir)),
            Arc::new(FfmpegMuxer::new()),
        )
        .with_fetcher(fetcher))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Generate a video for `script` and record the outcome on `job`.
    ///
    /// The job moves to processing, through each stage, and ends completed
    /// or failed. On failure or cancellation the job directory is removed.
    pub async fn run(
        &self,
        job: &mut Job,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        job.start()?;
        info!("Job {} started in {:?}", job.id, job.output_dir);

        match self.run_stages(job, script, cancel).await {
            Ok(result) => {
                job.complete(result.output_path.clone())?;
                Ok(result)
            }
            Err(e) => {
                warn!("Job {} failed at {}: {}", job.id, job.stage(), e);
                job.fail(e.to_string())?;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &mut Job,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        let start_time = Instant::now();

        if cancel.is_cancelled() {
            return Err(ReelError::Cancelled);
        }

        let job_dir = job.output_dir.clone();
        std::fs::create_dir_all(&job_dir)?;
        let mut workspace = WorkspaceGuard::new(job_dir.clone(), cancel.clone());

        // Subtitle file and other intermediates; removed however the run ends.
        let scratch = tempfile::Builder::new()
            .prefix("scratch-")
            .tempdir_in(&job_dir)?;
        debug!("Using scratch directory: {:?}", scratch.path());

        let multi_progress = if self.config.show_progress {
            Some(MultiProgress::new())
        } else {
            None
        };

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 1: Script split and cue drafting
        // ═══════════════════════════════════════════════════════════════════════
        let speakers: Vec<String> = self.config.voices.iter().map(|v| v.speaker.clone()).collect();
        let segments = split_script(script, &speakers)?;
        let full_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let draft_pb = spinner(multi_progress.as_ref(), "Drafting visual cues...");
        let limit = self.config.stage_limit(Stage::DraftScript);
        let cues: Vec<VisualCue> = run_stage(job, Stage::DraftScript, limit, cancel, async {
            self.cue_writer.draft_cues(&full_text).await
        })
        .await?;
        debug!("{} drafted {} cues", self.cue_writer.name(), cues.len());
        finish(draft_pb, format!("✓ {} segments, {} visual cues", segments.len(), cues.len()));

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 2: Speech synthesis
        // ═══════════════════════════════════════════════════════════════════════
        let synthesis_start = Instant::now();
        let tts_pb = spinner(
            multi_progress.as_ref(),
            &format!("Synthesizing {} segments with {}...", segments.len(), self.synthesizer.name()),
        );
        let limit = self.config.stage_limit(Stage::Synthesize);
        let speech = run_stage(job, Stage::Synthesize, limit, cancel, self.synthesize_all(&segments)).await?;
        finish(tts_pb, format!("✓ Synthesized {} segments", speech.len()));

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 3: Stitch narration
        // ═══════════════════════════════════════════════════════════════════════
        let limit = self.config.stage_limit(Stage::Stitch);
        let (stitched, narration_path, audio_duration) = run_stage(job, Stage::Stitch, limit, cancel, async {
            let stitched = stitch_segments(speech, &job_dir, self.muxer.as_ref(), cancel).await?;

            let ext = match stitched.format {
                AudioFormat::Wav => ".wav",
                AudioFormat::Mp3 | AudioFormat::Unknown => ".mp3",
            };
            let narration_path = job_dir.join(format!("narration{ext}"));
            tokio::fs::write(&narration_path, &stitched.audio).await?;

            let duration = self
                .resolve_duration(&stitched.timings, &narration_path, &stitched.audio, cancel)
                .await?;
            Ok((stitched, narration_path, duration))
        })
        .await?;
        let synthesis_time = synthesis_start.elapsed();
        info!(
            "Narration ready: {} words, {:.1}s in {:.2}s",
            stitched.timings.len(),
            audio_duration,
            synthesis_time.as_secs_f64()
        );

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 4: Overlay media
        // ═══════════════════════════════════════════════════════════════════════
        let overlay_start = Instant::now();
        let overlay_pb = spinner(
            multi_progress.as_ref(),
            &format!("Fetching media for {} cues...", cues.len()),
        );
        let limit = self.config.stage_limit(Stage::FetchOverlays);
        let overlays = run_stage(job, Stage::FetchOverlays, limit, cancel, async {
            self.fetcher.fetch(&cues, &stitched.timings, &job_dir, cancel).await
        })
        .await?;
        let overlay_time = overlay_start.elapsed();
        finish(overlay_pb, format!("✓ Placed {} of {} overlays", overlays.len(), cues.len()));

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 5: Subtitles
        // ═══════════════════════════════════════════════════════════════════════
        let subtitle_path = scratch.path().join("subtitles.ass");
        let limit = self.config.stage_limit(Stage::RenderSubtitles);
        let subtitle_events = run_stage(job, Stage::RenderSubtitles, limit, cancel, async {
            let mut subtitles = if stitched.timings.is_empty() {
                subtitles_from_text(&full_text, audio_duration)
            } else if self.config.voices.is_empty() {
                subtitles_from_timings(&stitched.timings, None)
            } else {
                let colors = color_map(&self.config.voices);
                subtitles_from_timings(&stitched.timings, Some(&colors))
            };
            apply_offset(&mut subtitles, self.config.subtitle_style.offset);

            let document = render(&subtitles, &self.config.subtitle_style);
            tokio::fs::write(&subtitle_path, document).await?;
            Ok(subtitles.len())
        })
        .await?;
        debug!("Wrote {} subtitle events to {:?}", subtitle_events, subtitle_path);

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 6: Mux
        // ═══════════════════════════════════════════════════════════════════════
        let mux_start = Instant::now();
        let mux_pb = spinner(multi_progress.as_ref(), "Rendering video...");
        let output_path = job_dir.join(output_file_name(&job.id, Utc::now().timestamp()));
        let request_overlays = overlays.clone();
        let limit = self.config.stage_limit(Stage::Mux);
        run_stage(job, Stage::Mux, limit, cancel, async {
            let background = self.clips.pick_random_clip().await?;
            let request = ComposeRequest {
                background,
                audio: narration_path.clone(),
                overlays: request_overlays,
                subtitles: Some(subtitle_path.clone()),
                duration: audio_duration,
                resolution: self.config.resolution,
                output: output_path.clone(),
            };
            self.muxer.compose(&request, cancel).await
        })
        .await?;
        let mux_time = mux_start.elapsed();
        finish(mux_pb, format!("✓ Rendered {}", output_path.display()));

        if let Err(e) = tokio::fs::remove_file(&subtitle_path).await {
            debug!("Could not remove {:?}: {}", subtitle_path, e);
        }

        workspace.keep();

        let stats = PipelineStats {
            total_time: start_time.elapsed(),
            synthesis_time,
            overlay_time,
            mux_time,
            segments: segments.len(),
            words: stitched.timings.len(),
            cues_drafted: cues.len(),
            overlays_placed: overlays.len(),
            subtitle_events,
            audio_duration,
            synthesizer: self.synthesizer.name().to_string(),
        };

        Ok(PipelineResult {
            output_path,
            narration_path,
            timings: stitched.timings,
            overlays,
            stats,
        })
    }

    /// Synthesize every segment in order, labelling timings with the speaker.
    async fn synthesize_all(&self, segments: &[ScriptSegment]) -> Result<Vec<SpeechResult>> {
        let mut results = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            debug!(
                "Segment {}/{} ({}): {} chars",
                i + 1,
                segments.len(),
                if segment.speaker.is_empty() { "narrator" } else { &segment.speaker },
                segment.text.len()
            );
            let speech = match self.config.voice_for(&segment.speaker) {
                Some(voice) => {
                    self.synthesizer
                        .synthesize_with_voice(&segment.text, voice)
                        .await?
                }
                None => self.synthesizer.synthesize_with_timings(&segment.text).await?,
            };
            results.push(speech.with_speaker(&segment.speaker));
        }
        Ok(results)
    }

    /// Narration length: last word end, then a probe, then a byte estimate.
    ///
    /// Only cancellation is an error; a failed probe falls through to the
    /// estimate.
    async fn resolve_duration(
        &self,
        timings: &[WordTiming],
        path: &Path,
        audio: &[u8],
        cancel: &CancellationToken,
    ) -> Result<f64> {
        let from_timings = last_end(timings);
        if from_timings > 0.0 {
            return Ok(from_timings);
        }
        match self.muxer.probe_duration(path, cancel).await {
            Ok(secs) if secs > 0.0 => Ok(secs),
            Err(ReelError::Cancelled) => Err(ReelError::Cancelled),
            Ok(_) | Err(_) => {
                let estimate = estimate_duration_from_bytes(audio);
                debug!("Falling back to byte-length duration estimate: {:.1}s", estimate);
                Ok(estimate)
            }
        }
    }
}

/// Print a summary of the pipeline results.
pub fn print_summary(result: &PipelineResult) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Video Generation Complete                 ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", result.output_path.display());
    println!("  Narration:  {}", result.narration_path.display());
    println!("  Voice:      {}", result.stats.synthesizer);
    println!(
        "  Duration:   {:.1}s ({} words, {} segments)",
        result.stats.audio_duration, result.stats.words, result.stats.segments
    );
    println!(
        "  Overlays:   {} of {} cues",
        result.stats.overlays_placed, result.stats.cues_drafted
    );
    println!("  Subtitles:  {} events", result.stats.subtitle_events);
    println!();
    println!("  Timing:");
    println!(
        "    Narration:   {:.2}s",
        result.stats.synthesis_time.as_secs_f64()
    );
    println!(
        "    Overlays:    {:.2}s",
        result.stats.overlay_time.as_secs_f64()
    );
    println!("    Render:      {:.2}s", result.stats.mux_time.as_secs_f64());
    println!(
        "    Total:       {:.2}s",
        result.stats.total_time.as_secs_f64()
    );
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use crate::render::testing::FakeMuxer;
    use crate::tts::StubSynthesizer;
    use crate::visuals::MediaKind;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Fixture {
        _clips: TempDir,
        out: TempDir,
        clip_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let clips = tempfile::tempdir().unwrap();
        std::fs::write(clips.path().join("bg.mp4"), b"clip").unwrap();
        let clip_dir = clips.path().to_path_buf();
        Fixture {
            _clips: clips,
            out: tempfile::tempdir().unwrap(),
            clip_dir,
        }
    }

    fn pipeline(fx: &Fixture, config: PipelineConfig, muxer: Arc<FakeMuxer>) -> Pipeline {
        Pipeline::new(
            config.with_progress(false),
            Arc::new(StaticCues::new(vec![VisualCue::new("cat", "a cat", MediaKind::Image)])),
            Arc::new(StubSynthesizer::default()),
            Arc::new(LocalClipProvider::new(&fx.clip_dir)),
            muxer,
        )
    }

    #[tokio::test]
    async fn test_run_single_voice() {
        let fx = fixture();
        let muxer = Arc::new(FakeMuxer::default());
        let pipeline = pipeline(&fx, PipelineConfig::default(), muxer.clone());
        let mut job = Job::with_id("one", fx.out.path());

        let result = pipeline
            .run(&mut job, "My cat likes boxes", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.stage(), Stage::Done);
        assert_eq!(job.output_path(), Some(result.output_path.as_path()));
        assert!(result.output_path.exists());
        assert!(result.narration_path.ends_with("narration.wav"));
        assert_eq!(result.stats.words, 4);
        assert_eq!(result.stats.subtitle_events, 4);
        // No searchers configured, so the cue cannot be placed.
        assert_eq!(result.stats.cues_drafted, 1);
        assert!(result.overlays.is_empty());

        let composed = muxer.composed();
        assert_eq!(composed.len(), 1);
        assert!((composed[0].duration - 1.6).abs() < 1e-9);
        assert!(composed[0].background.ends_with("bg.mp4"));
        // Subtitle file is gone after the mux.
        assert!(!composed[0].subtitles.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn test_run_two_speakers() {
        let fx = fixture();
        let muxer = Arc::new(FakeMuxer::default());
        let config = PipelineConfig {
            voices: vec![
                VoiceConfig::new("Alice", "v1", "#FF0000"),
                VoiceConfig::new("Bob", "v2", "#0000FF"),
            ],
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(&fx, config, muxer.clone());
        let mut job = Job::with_id("two", fx.out.path());

        let result = pipeline
            .run(&mut job, "Alice: hi there\nBob: hello", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.stats.segments, 2);
        assert_eq!(muxer.concat_calls(), 1);
        let speakers: Vec<&str> = result.timings.iter().map(|t| t.speaker.as_str()).collect();
        assert_eq!(speakers, vec!["Alice", "Alice", "Bob"]);
        // Bob's word starts where Alice's segment ended.
        assert!((result.timings[2].start - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mux_failure_marks_job_failed_and_cleans_up() {
        let fx = fixture();
        let pipeline = pipeline(&fx, PipelineConfig::default(), Arc::new(FakeMuxer::failing()));
        let mut job = Job::with_id("bad", fx.out.path());

        let err = pipeline
            .run(&mut job, "one two three", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ReelError::MuxFailure(_)));
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.stage(), Stage::Mux);
        assert!(job.error().unwrap().contains("fake compose failure"));
        assert!(!job.output_dir.exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = fixture();
        let pipeline = pipeline(&fx, PipelineConfig::default(), Arc::new(FakeMuxer::default()));
        let mut job = Job::with_id("stop", fx.out.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline.run(&mut job, "hello", &cancel).await.unwrap_err();
        assert!(matches!(err, ReelError::Cancelled));
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(!job.output_dir.exists());
    }

    #[tokio::test]
    async fn test_empty_script_fails_job() {
        let fx = fixture();
        let pipeline = pipeline(&fx, PipelineConfig::default(), Arc::new(FakeMuxer::default()));
        let mut job = Job::with_id("empty", fx.out.path());

        let err = pipeline
            .run(&mut job, "   ", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::InvalidInput(_)));
        assert_eq!(job.status(), JobStatus::Failed);
    }

    struct FailingCues;

    #[async_trait]
    impl CueWriter for FailingCues {
        async fn draft_cues(&self, _script: &str) -> Result<Vec<VisualCue>> {
            Err(ReelError::UpstreamUnavailable("llm down".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_cue_failure_fails_job() {
        let fx = fixture();
        let pipeline = Pipeline::new(
            PipelineConfig::default().with_progress(false),
            Arc::new(FailingCues),
            Arc::new(StubSynthesizer::default()),
            Arc::new(LocalClipProvider::new(&fx.clip_dir)),
            Arc::new(FakeMuxer::default()),
        );
        let mut job = Job::with_id("nocues", fx.out.path());

        let err = pipeline
            .run(&mut job, "never drafted", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::UpstreamUnavailable(_)));
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.stage(), Stage::DraftScript);
        assert!(!job.output_dir.exists());
    }

    struct SlowSynth;

    #[async_trait]
    impl SpeechSynthesizer for SlowSynth {
        async fn synthesize_with_timings(&self, _text: &str) -> Result<SpeechResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(ReelError::UpstreamUnavailable("unreachable".into()))
        }

        async fn synthesize_with_voice(&self, text: &str, _voice: &VoiceConfig) -> Result<SpeechResult> {
            self.synthesize_with_timings(text).await
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let fx = fixture();
        let mut config = PipelineConfig::default().with_progress(false);
        config.timeouts.synthesize_stage_secs = 1;
        let pipeline = Pipeline::new(
            config,
            Arc::new(StaticCues::default()),
            Arc::new(SlowSynth),
            Arc::new(LocalClipProvider::new(&fx.clip_dir)),
            Arc::new(FakeMuxer::default()),
        );
        let mut job = Job::with_id("slow", fx.out.path());

        let err = pipeline
            .run(&mut job, "hello", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::StageTimeout { ref stage, secs: 1 } if stage == "synthesize"));
        assert_eq!(job.stage(), Stage::Synthesize);
    }

    /// Returns audio with no word timings, so the duration must be probed.
    struct UntimedSynth;

    #[async_trait]
    impl SpeechSynthesizer for UntimedSynth {
        async fn synthesize_with_timings(&self, _text: &str) -> Result<SpeechResult> {
            Ok(SpeechResult::new(vec![0u8; 16_000], Vec::new()))
        }

        async fn synthesize_with_voice(&self, text: &str, _voice: &VoiceConfig) -> Result<SpeechResult> {
            self.synthesize_with_timings(text).await
        }

        fn name(&self) -> &'static str {
            "untimed"
        }
    }

    /// Cancels the run from inside the probe, then never answers.
    struct HangingProbe;

    #[async_trait]
    impl Muxer for HangingProbe {
        async fn concat_audio(&self, _list: &Path, _output: &Path, _cancel: &CancellationToken) -> Result<()> {
            Err(ReelError::MuxFailure("not expected".into()))
        }

        async fn compose(&self, _request: &ComposeRequest, _cancel: &CancellationToken) -> Result<()> {
            Err(ReelError::MuxFailure("not expected".into()))
        }

        async fn probe_duration(&self, _path: &Path, cancel: &CancellationToken) -> Result<f64> {
            cancel.cancel();
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1.0)
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_cancel_during_duration_probe() {
        let fx = fixture();
        let pipeline = Pipeline::new(
            PipelineConfig::default().with_progress(false),
            Arc::new(StaticCues::default()),
            Arc::new(UntimedSynth),
            Arc::new(LocalClipProvider::new(&fx.clip_dir)),
            Arc::new(HangingProbe),
        );
        let mut job = Job::with_id("probe", fx.out.path());
        let cancel = CancellationToken::new();

        let err = tokio::time::timeout(Duration::from_secs(5), pipeline.run(&mut job, "hello there", &cancel))
            .await
            .expect("run should stop once cancelled")
            .unwrap_err();

        assert!(matches!(err, ReelError::Cancelled));
        assert_eq!(job.stage(), Stage::Stitch);
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(!job.output_dir.exists());
    }

    #[tokio::test]
    async fn test_untimed_audio_falls_back_to_byte_estimate() {
        let fx = fixture();
        let pipeline = Pipeline::new(
            PipelineConfig::default().with_progress(false),
            Arc::new(StaticCues::default()),
            Arc::new(UntimedSynth),
            Arc::new(LocalClipProvider::new(&fx.clip_dir)),
            Arc::new(FakeMuxer::default()),
        );
        let mut job = Job::with_id("estimate", fx.out.path());

        let result = pipeline
            .run(&mut job, "hello there", &CancellationToken::new())
            .await
            .unwrap();

        // FakeMuxer cannot probe, so the 128 kbps byte estimate applies.
        assert!((result.stats.audio_duration - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.resolution, Resolution::VERTICAL);
        assert!(config.voices.is_empty());
        assert!(config.show_progress);
        assert_eq!(config.stage_limit(Stage::Mux), config.timeouts.mux_stage_secs);
    }

    #[test]
    fn test_voice_lookup_is_case_insensitive() {
        let config = PipelineConfig {
            voices: vec![VoiceConfig::new("Alice", "v1", "#FF0000")],
            ..PipelineConfig::default()
        };
        assert_eq!(config.voice_for("alice").map(|v| v.voice_id.as_str()), Some("v1"));
        assert!(config.voice_for("").is_none());
        assert!(config.voice_for("Carol").is_none());
    }
}
