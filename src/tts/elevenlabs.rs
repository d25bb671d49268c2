use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ReelError, Result};
use crate::timing::{
    add_pauses, estimate_duration_from_bytes, extract_word_timings, CharacterAlignment,
    SpeechResult, VoiceConfig, WordTiming,
};
use crate::tts::{KeyRing, SpeechSynthesizer};

/// ElevenLabs API host.
const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io";

/// Default model.
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

/// Default voice ("Rachel").
const DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";

/// Maximum retries on server errors.
const MAX_RETRIES: usize = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

/// ElevenLabs text-to-speech client using the timestamps endpoint.
pub struct ElevenLabsClient {
    client: reqwest::Client,
    keys: KeyRing,
    base_url: String,
    model_id: String,
    default_voice_id: String,
    add_pauses: bool,
    timeout: Duration,
}

impl ElevenLabsClient {
    /// Create a client rotating over `api_keys`.
    pub fn new(api_keys: Vec<String>) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            keys: KeyRing::new(api_keys)?,
            base_url: ELEVENLABS_API_URL.to_string(),
            model_id: DEFAULT_MODEL.to_string(),
            default_voice_id: DEFAULT_VOICE.to_string(),
            add_pauses: false,
            timeout: Duration::from_secs(120),
        })
    }

    /// Point at a different host (used for testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_default_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.default_voice_id = voice_id.into();
        self
    }

    /// Lengthen sentence breaks in the text sent for synthesis.
    pub fn with_pauses(mut self, add_pauses: bool) -> Self {
        self.add_pauses = add_pauses;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// POST the text, rotating keys on auth/rate-limit failures and
    /// backing off on server errors.
    async fn call_api(&self, text: &str, voice_id: &str) -> Result<TimestampsResponse> {
        let url = format!(
            "{}/v1/text-to-speech/{}/with-timestamps",
            self.base_url, voice_id
        );
        let request = TimestampsRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings::default(),
        };

        let attempts = self.keys.len().max(MAX_RETRIES);
        let mut backoffs = 0;
        let mut rejected_keys = 0;
        let mut last_error = None;

        for attempt in 0..attempts {
            let key = self.keys.next_key();

            let response = match self
                .client
                .post(&url)
                .header("xi-api-key", key)
                .json(&request)
                .timeout(self.timeout)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("ElevenLabs attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(ReelError::from(e));
                    continue;
                }
            };

            let status = response.status();
            debug!("ElevenLabs response status: {}", status);

            if status.is_success() {
                return Ok(response.json().await?);
            }

            let body = response.text().await.unwrap_or_default();
            let error = ReelError::from_status("ElevenLabs", status, &body);

            match status {
                StatusCode::UNAUTHORIZED => {
                    rejected_keys += 1;
                    if rejected_keys >= self.keys.len() {
                        warn!("Every ElevenLabs key was rejected");
                        return Err(error);
                    }
                    warn!("ElevenLabs key rejected ({}), rotating", status);
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    warn!("ElevenLabs key rejected ({}), rotating", status);
                }
                s if s.is_server_error() => {
                    let delay = BASE_DELAY_MS * 2u64.pow(backoffs);
                    backoffs += 1;
                    debug!("Retry after {}ms delay", delay);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                _ => return Err(error),
            }
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| ReelError::UpstreamUnavailable("ElevenLabs: no attempts made".into())))
    }

    async fn speak(&self, text: &str, voice_id: &str) -> Result<SpeechResult> {
        if text.trim().is_empty() {
            return Err(ReelError::EmptyInput("nothing to synthesize".to_string()));
        }

        let spoken = if self.add_pauses {
            add_pauses(text)
        } else {
            text.to_string()
        };

        let response = self.call_api(&spoken, voice_id).await?;
        let audio = BASE64
            .decode(response.audio_base64.as_bytes())
            .map_err(|e| ReelError::UpstreamRejected(format!("ElevenLabs audio not base64: {e}")))?;

        let alignment = response.alignment.or(response.normalized_alignment);
        let timings = extract_word_timings(
            &spoken,
            alignment.as_ref(),
            estimate_duration_from_bytes(&audio),
        );
        let timings = restore_words(timings, text);

        debug!(
            "Synthesized {} bytes, {} word timings",
            audio.len(),
            timings.len()
        );
        Ok(SpeechResult::new(audio, timings))
    }
}

/// Put the script's own words back after synthesis of a paused variant.
///
/// Pause insertion never changes the token count, so tokens line up.
fn restore_words(mut timings: Vec<WordTiming>, original: &str) -> Vec<WordTiming> {
    for (timing, word) in timings.iter_mut().zip(original.split_whitespace()) {
        if timing.word != word {
            timing.word = word.to_string();
        }
    }
    timings
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize_with_timings(&self, text: &str) -> Result<SpeechResult> {
        self.speak(text, &self.default_voice_id).await
    }

    async fn synthesize_with_voice(&self, text: &str, voice: &VoiceConfig) -> Result<SpeechResult> {
        let voice_id = if voice.voice_id.is_empty() {
            &self.default_voice_id
        } else {
            &voice.voice_id
        };
        Ok(self.speak(text, voice_id).await?.with_speaker(&voice.speaker))
    }

    fn name(&self) -> &'static str {
        "ElevenLabs"
    }
}

// API request/response types

#[derive(Debug, Serialize)]
struct TimestampsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TimestampsResponse {
    audio_base64: String,
    #[serde(default)]
    alignment: Option<CharacterAlignment>,
    #[serde(default)]
    normalized_alignment: Option<CharacterAlignment>,
}
