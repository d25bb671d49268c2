use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReelError, Result};
use crate::llm::{parse_cues, CueWriter};
use crate::visuals::VisualCue;

/// OpenAI API base.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Maximum retries for API calls.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

const SYSTEM_PROMPT: &str = r#"You pick visuals for a short vertical video.
Given the narration script, choose moments where an image or GIF would help.
Respond with a JSON object of the form:
{"visuals": [{"keyword": "...", "search_query": "...", "type": "image" | "gif"}]}
Rules:
- "keyword" must be a word or short phrase copied exactly from the script.
- "search_query" is what to search for to find a fitting picture.
- Use "gif" only for actions or reactions; otherwise "image".
- List visuals in the order their keywords are spoken."#;

/// Drafts visual cues with an OpenAI-compatible chat completions API.
pub struct OpenAiCueWriter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_cues: usize,
    timeout: Duration,
}

impl OpenAiCueWriter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_API_URL.to_string(),
            model: "gpt-4o-mini".to_string(),
            max_cues: 8,
            timeout: Duration::from_secs(60),
        }
    }

    /// Point at a different OpenAI-compatible host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Upper bound on cues requested per script.
    pub fn with_max_cues(mut self, max_cues: usize) -> Self {
        self.max_cues = max_cues.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request(&self, script: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Choose at most {} visuals for this script:\n\n{}",
                        self.max_cues, script
                    ),
                },
            ],
            response_format: ResponseFormat {
                r#type: "json_object",
            },
            temperature: 0.7,
        }
    }

    async fn call_api(&self, request: &ChatRequest<'_>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("Retry attempt {} after {}ms delay", attempt, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request)
                .timeout(self.timeout)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("Attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(ReelError::from(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let parsed: ChatResponse = response.json().await?;
                return parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| ReelError::UpstreamRejected("LLM returned no content".into()));
            }

            let body = response.text().await.unwrap_or_default();
            let error = ReelError::from_status("OpenAI", status, &body);
            // Don't retry on client errors
            if matches!(error, ReelError::UpstreamRejected(_)) {
                return Err(error);
            }
            warn!("Attempt {} failed: {}", attempt + 1, error);
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| ReelError::UpstreamUnavailable("OpenAI: unknown error".into())))
    }
}

#[async_trait]
impl CueWriter for OpenAiCueWriter {
    async fn draft_cues(&self, script: &str) -> Result<Vec<VisualCue>> {
        let request = self.build_request(script);
        let content = self.call_api(&request).await?;
        debug!(
            "LLM response: {}",
            content.chars().take(500).collect::<String>()
        );

        let mut cues = parse_cues(&content).map_err(|e| {
            ReelError::UpstreamRejected(format!("OpenAI returned unusable cue JSON: {e}"))
        })?;
        cues.truncate(self.max_cues);
        Ok(cues)
    }

    fn name(&self) -> &'static str {
        "OpenAI"
    }
}

// API request/response types

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ChatResponseMessage {
    content: Option<String>,
}
