pub mod elevenlabs;
pub mod stub;

pub use elevenlabs::ElevenLabsClient;
pub use stub::StubSynthesizer;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, TtsProvider};
use crate::error::{ReelError, Result};
use crate::timing::{SpeechResult, VoiceConfig};

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Audio only, in the default voice.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let (audio, _) = self.synthesize_with_timings(text).await?.into_parts();
        Ok(audio)
    }

    /// Audio and word timings in the default voice.
    async fn synthesize_with_timings(&self, text: &str) -> Result<SpeechResult>;

    /// Audio and word timings in `voice`, labelled with its speaker.
    async fn synthesize_with_voice(&self, text: &str, voice: &VoiceConfig) -> Result<SpeechResult>;

    fn name(&self) -> &'static str;
}

/// Round-robin over API keys. Safe to share between tasks.
#[derive(Debug)]
pub struct KeyRing {
    keys: Vec<String>,
    next: AtomicUsize,
}

impl KeyRing {
    pub fn new(keys: Vec<String>) -> Result<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(ReelError::InvalidInput("no API keys configured".to_string()));
        }
        Ok(Self {
            keys,
            next: AtomicUsize::new(0),
        })
    }

    /// The next key in rotation.
    pub fn next_key(&self) -> &str {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        &self.keys[idx]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Build the synthesizer selected in the `[tts]` section.
pub fn create_synthesizer(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>> {
    match config.tts.provider {
        TtsProvider::ElevenLabs => {
            let client = ElevenLabsClient::new(config.tts.api_keys.clone())?
                .with_base_url(config.tts.base_url.clone())
                .with_model(config.tts.model_id.clone())
                .with_default_voice(config.tts.default_voice_id.clone())
                .with_pauses(config.tts.add_pauses)
                .with_timeout(Duration::from_secs(config.timeouts.tts_secs));
            Ok(Arc::new(client))
        }
        TtsProvider::Stub => Ok(Arc::new(StubSynthesizer::default())),
    }
}
