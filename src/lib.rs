pub mod audio;
pub mod background;
pub mod config;
pub mod error;
pub mod job;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod script;
pub mod search;
pub mod subtitle;
pub mod timing;
pub mod tts;
pub mod visuals;

pub use config::Config;
pub use error::{ReelError, Result};
pub use job::{Job, JobStatus, Stage};
pub use pipeline::{print_summary, Pipeline, PipelineConfig, PipelineResult, PipelineStats};
pub use timing::{SpeechResult, VoiceConfig, WordTiming};
pub use visuals::{ImageOverlay, MediaKind, VisualCue};
