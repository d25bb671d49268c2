use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ReelError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Uploaded,
}

impl JobStatus {
    fn can_become(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Pending, Failed)
                | (Processing, Failed)
                | (Completed, Uploaded)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Uploaded => write!(f, "uploaded"),
        }
    }
}

/// Pipeline step a job is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Pending,
    DraftScript,
    Synthesize,
    Stitch,
    FetchOverlays,
    RenderSubtitles,
    Mux,
    Done,
}

impl Stage {
    /// The working stages in execution order.
    pub const PIPELINE: [Stage; 6] = [
        Stage::DraftScript,
        Stage::Synthesize,
        Stage::Stitch,
        Stage::FetchOverlays,
        Stage::RenderSubtitles,
        Stage::Mux,
    ];

    /// 1-based position among the working stages, 0 otherwise.
    pub fn number(&self) -> usize {
        Self::PIPELINE
            .iter()
            .position(|s| s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::DraftScript => "draft_script",
            Stage::Synthesize => "synthesize",
            Stage::Stitch => "stitch",
            Stage::FetchOverlays => "fetch_overlays",
            Stage::RenderSubtitles => "render_subtitles",
            Stage::Mux => "mux",
            Stage::Done => "done",
        };
        write!(f, "{name}")
    }
}

/// Record of one video generation run.
///
/// Only the pipeline moves a job between states; illegal moves are errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    status: JobStatus,
    stage: Stage,
    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// `{output_root}/job_{id}`; every artifact of the job lives here.
    pub output_dir: PathBuf,
    output_path: Option<PathBuf>,
    error: Option<String>,
}

impl Job {
    /// A new pending job with a random id under `output_root`.
    pub fn new(output_root: &Path) -> Self {
        Self::with_id(Uuid::new_v4().simple().to_string(), output_root)
    }

    pub fn with_id(id: impl Into<String>, output_root: &Path) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            output_dir: output_root.join(format!("job_{id}")),
            id,
            status: JobStatus::Pending,
            stage: Stage::Pending,
            created_at: now,
            updated_at: now,
            output_path: None,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Uploaded
        )
    }

    fn transition(&mut self, to: JobStatus) -> Result<()> {
        if !self.status.can_become(to) {
            return Err(ReelError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        debug!("Job {}: {} -> {}", self.id, self.status, to);
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Pending -> Processing.
    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Processing)
    }

    /// Record the stage now running. Only valid while processing.
    pub fn enter_stage(&mut self, stage: Stage) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(ReelError::InvalidTransition {
                from: self.status.to_string(),
                to: stage.to_string(),
            });
        }
        self.stage = stage;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Processing -> Completed with the finished video.
    pub fn complete(&mut self, output_path: PathBuf) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.stage = Stage::Done;
        self.output_path = Some(output_path);
        Ok(())
    }

    /// Pending/Processing -> Failed, keeping the stage that failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Completed -> Uploaded, once an external step has published the video.
    pub fn mark_uploaded(&mut self) -> Result<()> {
        self.transition(JobStatus::Uploaded)
    }
}
