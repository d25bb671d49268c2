//! Integration tests for reelsmith
//!
//! These tests drive the public API end to end without API keys, network
//! access or ffmpeg.

use async_trait::async_trait;
use reelsmith::audio::{rebase_timings, stitch_segments};
use reelsmith::background::LocalClipProvider;
use reelsmith::config::{Config, TtsProvider};
use reelsmith::error::{ReelError, Result};
use reelsmith::llm::StaticCues;
use reelsmith::render::{build_filter_graph, ComposeRequest, Muxer, Resolution};
use reelsmith::search::{MediaSearcher, SearchResult};
use reelsmith::subtitle::{color_map, render, subtitles_from_timings, SubtitleStyle};
use reelsmith::timing::{extract_word_timings, CharacterAlignment};
use reelsmith::tts::StubSynthesizer;
use reelsmith::visuals::fetcher::display_window;
use reelsmith::visuals::{enforce_constraints, locate_keyword, VisualsConfig};
use reelsmith::{
    ImageOverlay, Job, JobStatus, MediaKind, Pipeline, PipelineConfig, SpeechResult, Stage,
    VisualCue, VoiceConfig, WordTiming,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

fn overlay(name: &str, start: f64, end: f64) -> ImageOverlay {
    ImageOverlay {
        path: PathBuf::from(name),
        start,
        end,
        width: 800,
        height: 800,
        animated: false,
    }
}

fn spans(timings: &[WordTiming]) -> Vec<(&str, f64, f64)> {
    timings
        .iter()
        .map(|t| (t.word.as_str(), t.start, t.end))
        .collect()
}

/// Muxer that copies bytes around instead of running ffmpeg.
#[derive(Default)]
struct CopyMuxer {
    composed: Mutex<Vec<ComposeRequest>>,
}

#[async_trait]
impl Muxer for CopyMuxer {
    async fn concat_audio(&self, list: &Path, output: &Path, _cancel: &CancellationToken) -> Result<()> {
        let list = std::fs::read_to_string(list)?;
        let mut joined = Vec::new();
        for line in list.lines() {
            if let Some(path) = line.strip_prefix("file '").and_then(|l| l.strip_suffix('\'')) {
                joined.extend(std::fs::read(path)?);
            }
        }
        std::fs::write(output, joined)?;
        Ok(())
    }

    async fn compose(&self, request: &ComposeRequest, _cancel: &CancellationToken) -> Result<()> {
        std::fs::write(&request.output, b"video")?;
        self.composed.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn probe_duration(&self, _path: &Path, _cancel: &CancellationToken) -> Result<f64> {
        Err(ReelError::MuxFailure("no probe".into()))
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

mod scenario_tests {
    use super::*;

    #[test]
    fn test_simple_narration_alignment() {
        let chars = ["H", "e", "l", "l", "o", " ", "w", "o", "r", "l", "d"];
        let alignment = CharacterAlignment {
            characters: chars.iter().map(|c| c.to_string()).collect(),
            character_start_times_seconds: (0..11).map(|i| i as f64 * 0.05).collect(),
            character_end_times_seconds: (1..12).map(|i| i as f64 * 0.05).collect(),
        };

        let timings = extract_word_timings("Hello world", Some(&alignment), 0.0);

        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].word, "Hello");
        assert!((timings[0].start - 0.0).abs() < 1e-9);
        assert!((timings[0].end - 0.25).abs() < 1e-9);
        assert_eq!(timings[1].word, "world");
        assert!((timings[1].start - 0.30).abs() < 1e-9);
        assert!((timings[1].end - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_stitch_two_segments_timeline() {
        let a = vec![
            WordTiming::new("First", 0.0, 0.5),
            WordTiming::new("part", 0.5, 1.0),
        ];
        let b = vec![
            WordTiming::new("second", 0.0, 0.5),
            WordTiming::new("part", 0.5, 1.0),
        ];

        let (joined, duration) = rebase_timings([a.as_slice(), b.as_slice()]);

        assert_eq!(
            spans(&joined),
            vec![
                ("First", 0.0, 0.5),
                ("part", 0.5, 1.0),
                ("second", 1.0, 1.5),
                ("part", 1.5, 2.0),
            ]
        );
        assert_eq!(duration, 2.0);
    }

    #[test]
    fn test_keyword_anchoring_with_punctuation() {
        let timings = vec![
            WordTiming::new("Look,", 0.0, 0.3),
            WordTiming::new("a", 0.3, 0.4),
            WordTiming::new("cat!", 0.4, 0.7),
        ];

        let anchor = locate_keyword(&timings, "cat", 0);
        assert_eq!(anchor, Some(2));

        let (start, end) = display_window(&timings, 2, 0.5);
        assert!((start - 0.4).abs() < 1e-9);
        assert!((end - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_overlap_truncation() {
        let mut overlays = vec![overlay("img1", 0.0, 5.0), overlay("img2", 3.0, 8.0)];
        enforce_constraints(&mut overlays, 1.0);

        assert_eq!(overlays[0].path, PathBuf::from("img1"));
        assert_eq!((overlays[0].start, overlays[0].end), (0.0, 2.0));
        assert_eq!((overlays[1].start, overlays[1].end), (3.0, 8.0));
    }

    #[test]
    fn test_floor_breach() {
        let mut overlays = vec![overlay("img1", 0.0, 10.0), overlay("img2", 0.3, 5.0)];
        enforce_constraints(&mut overlays, 1.0);

        assert_eq!((overlays[0].start, overlays[0].end), (0.0, 0.5));
        assert_eq!((overlays[1].start, overlays[1].end), (0.3, 5.0));
    }

    #[test]
    fn test_coloured_conversational_subtitles() {
        let voices = vec![
            VoiceConfig::new("Adam", "adam-voice", "#00BFFF"),
            VoiceConfig::new("Bella", "bella-voice", "#FF69B4"),
        ];
        let timings = vec![
            WordTiming::new("Hi", 0.0, 0.3).with_speaker("Adam"),
            WordTiming::new("Bella", 0.3, 0.8).with_speaker("Adam"),
            WordTiming::new("Hey", 0.8, 1.1).with_speaker("Bella"),
        ];

        let colors = color_map(&voices);
        let subtitles = subtitles_from_timings(&timings, Some(&colors));

        assert_eq!(subtitles.len(), 3);
        assert_eq!(subtitles[0].color.as_deref(), Some("#00BFFF"));
        assert_eq!(subtitles[1].color.as_deref(), Some("#00BFFF"));
        assert_eq!(subtitles[2].color.as_deref(), Some("#FF69B4"));

        let document = render(&subtitles, &SubtitleStyle::default());
        assert!(document.contains("{\\c&H00FFBF00&}Hi"));
        assert!(document.contains("{\\c&H00B469FF&}Hey"));
    }
}

// ============================================================================
// Component Boundary Tests
// ============================================================================

mod boundary_tests {
    use super::*;

    #[test]
    fn test_empty_subtitle_document() {
        let document = render(&[], &SubtitleStyle::default());
        assert!(document.contains("[Script Info]"));
        assert!(document.contains("[V4+ Styles]"));
        assert!(!document.contains("Dialogue:"));
    }

    #[test]
    fn test_filter_graph_without_overlays_keeps_subtitles() {
        let request = ComposeRequest {
            background: PathBuf::from("bg.mp4"),
            audio: PathBuf::from("narration.mp3"),
            overlays: Vec::new(),
            subtitles: Some(PathBuf::from("/tmp/subs.ass")),
            duration: 3.0,
            resolution: Resolution::VERTICAL,
            output: PathBuf::from("out.mp4"),
        };

        let graph = build_filter_graph(&request);
        assert!(!graph.contains("overlay="));
        assert!(graph.contains("subtitles="));
        assert!(graph.ends_with("[vout]"));
    }

    #[tokio::test]
    async fn test_single_segment_stitch_skips_muxer() {
        let dir = tempfile::tempdir().unwrap();
        let muxer = CopyMuxer::default();
        let audio = b"ID3 original bytes".to_vec();
        let segment = SpeechResult::new(audio.clone(), vec![WordTiming::new("hi", 0.0, 0.4)]);

        let stitched = stitch_segments(vec![segment], dir.path(), &muxer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stitched.audio, audio);
        assert_eq!(stitched.duration, 0.4);
    }

    #[test]
    fn test_config_from_toml() {
        let config = Config::from_toml(
            r##"
resolution = "720x1280"

[tts]
provider = "stub"

[[voices]]
speaker = "Adam"
voice_id = "v1"
color = "#00BFFF"

[visuals]
max_display_time = 3.0
image_width = 700
image_height = 700
min_gap = 0.5
"##,
        )
        .unwrap();

        assert_eq!(config.tts.provider, TtsProvider::Stub);
        assert_eq!(config.resolution(), Resolution { width: 720, height: 1280 });
        assert_eq!(config.speakers(), vec!["Adam".to_string()]);
        assert_eq!(config.visuals.min_gap, 0.5);
    }
}

// ============================================================================
// Full Pipeline Tests
// ============================================================================

mod pipeline_tests {
    use super::*;
    use reelsmith::visuals::VisualFetcher;

    /// Serves one fake PNG for every query.
    struct OnePngSearcher;

    #[async_trait]
    impl MediaSearcher for OnePngSearcher {
        async fn search(&self, query: &str, _count: usize) -> Result<Vec<SearchResult>> {
            Ok(vec![SearchResult {
                title: query.to_string(),
                url: format!("https://img.example/{}.png", query.replace(' ', "_")),
                thumb_url: String::new(),
                width: 800,
                height: 600,
            }])
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            let mut bytes = vec![0x89, b'P', b'N', b'G'];
            bytes.resize(20_000, 0);
            Ok(bytes)
        }

        fn name(&self) -> &'static str {
            "png"
        }
    }

    #[tokio::test]
    async fn test_full_run_with_stub_voice() {
        let clips = tempfile::tempdir().unwrap();
        std::fs::write(clips.path().join("city.mp4"), b"clip").unwrap();
        let out = tempfile::tempdir().unwrap();

        let voices = vec![
            VoiceConfig::new("Adam", "v1", "#00BFFF"),
            VoiceConfig::new("Bella", "v2", "#FF69B4"),
        ];
        let config = PipelineConfig {
            voices,
            ..PipelineConfig::default()
        }
        .with_progress(false);

        let cues = vec![
            VisualCue::new("cat", "cute cat", MediaKind::Image),
            VisualCue::new("moose", "moose", MediaKind::Image),
            VisualCue::new("dog", "happy dog", MediaKind::Image),
        ];
        let muxer = Arc::new(CopyMuxer::default());
        let fetcher = VisualFetcher::new(VisualsConfig::default())
            .with_image_searcher(Arc::new(OnePngSearcher));

        let pipeline = Pipeline::new(
            config,
            Arc::new(StaticCues::new(cues)),
            Arc::new(StubSynthesizer::default()),
            Arc::new(LocalClipProvider::new(clips.path())),
            muxer.clone(),
        )
        .with_fetcher(fetcher);

        let mut job = Job::new(out.path());
        let script = "Adam: I saw a cat today.\nBella: Was it with a dog?";
        let result = pipeline
            .run(&mut job, script, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.stage(), Stage::Done);
        assert!(result.output_path.starts_with(&job.output_dir));
        assert!(result.output_path.exists());
        assert!(result.narration_path.exists());

        // "moose" is never spoken.
        assert_eq!(result.stats.cues_drafted, 3);
        assert_eq!(result.overlays.len(), 2);
        assert!(result.overlays[0].start < result.overlays[1].start);
        assert!(result.overlays.iter().all(|o| o.path.exists()));

        assert_eq!(result.stats.words, 10);
        assert_eq!(result.stats.subtitle_events, 10);
        let speakers: Vec<&str> = result.timings.iter().map(|t| t.speaker.as_str()).collect();
        assert_eq!(speakers[0], "Adam");
        assert_eq!(speakers[9], "Bella");

        let composed = muxer.composed.lock().unwrap();
        assert_eq!(composed.len(), 1);
        assert_eq!(composed[0].overlays, result.overlays);
        assert!((composed[0].duration - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancelled_run_removes_job_directory() {
        let clips = tempfile::tempdir().unwrap();
        std::fs::write(clips.path().join("city.mp4"), b"clip").unwrap();
        let out = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(
            PipelineConfig::default().with_progress(false),
            Arc::new(StaticCues::default()),
            Arc::new(StubSynthesizer::default()),
            Arc::new(LocalClipProvider::new(clips.path())),
            Arc::new(CopyMuxer::default()),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut job = Job::new(out.path());
        let err = pipeline.run(&mut job, "never rendered", &cancel).await.unwrap_err();

        assert!(matches!(err, ReelError::Cancelled));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(!job.output_dir.exists());
    }

    #[tokio::test]
    async fn test_missing_clips_fail_at_mux() {
        let clips = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let pipeline = Pipeline::new(
            PipelineConfig::default().with_progress(false),
            Arc::new(StaticCues::default()),
            Arc::new(StubSynthesizer::default()),
            Arc::new(LocalClipProvider::new(clips.path())),
            Arc::new(CopyMuxer::default()),
        );

        let mut job = Job::new(out.path());
        let err = pipeline
            .run(&mut job, "no background", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ReelError::InvalidInput(_)));
        assert_eq!(job.stage(), Stage::Mux);
        assert!(job.error().is_some());
    }
}
