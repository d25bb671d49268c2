use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream rejected request: {0}")]
    UpstreamRejected(String),

    #[error("Media validation failed: {0}")]
    MediaValidation(String),

    #[error("Keyword not found in narration: {0}")]
    KeywordMiss(String),

    #[error("Muxing failed: {0}")]
    MuxFailure(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Stage {stage} timed out after {secs}s")]
    StageTimeout { stage: String, secs: u64 },

    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl ReelError {
    /// Process exit code for the CLI: 1 user/config, 2 upstream, 3 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReelError::InvalidInput(_)
            | ReelError::EmptyInput(_)
            | ReelError::KeywordMiss(_)
            | ReelError::InvalidTransition { .. }
            | ReelError::Json(_) => 1,
            ReelError::Cancelled => 3,
            ReelError::UpstreamUnavailable(_)
            | ReelError::UpstreamRejected(_)
            | ReelError::MediaValidation(_)
            | ReelError::MuxFailure(_)
            | ReelError::StageTimeout { .. }
            | ReelError::Io(_)
            | ReelError::Http(_)
            | ReelError::Wav(_) => 2,
        }
    }

    /// Classify a non-success HTTP status from a vendor.
    ///
    /// Quota exhaustion, rate limits and server errors are transient; other
    /// client errors (bad credentials, unknown voice) are permanent.
    pub fn from_status(vendor: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{vendor} returned {status}: {}", truncate(body, 300));
        if status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || body.to_lowercase().contains("quota")
        {
            ReelError::UpstreamUnavailable(message)
        } else {
            ReelError::UpstreamRejected(message)
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub type Result<T> = std::result::Result<T, ReelError>;
